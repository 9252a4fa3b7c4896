//! Book model, its form, and its wire representation

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::empty_as_none;
use crate::{error::FieldErrors, sanitize};

/// Maximum number of rows a search returns
pub const SEARCH_RESULT_LIMIT: i64 = 50;

pub const SEARCH_MIN_CHARS: usize = 2;
pub const SEARCH_MAX_CHARS: usize = 100;

/// Stored book
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publication_year: i32,
    pub is_available: bool,
    pub isbn: Option<String>,
}

/// Serialized form of a [`Book`].
///
/// The field list is explicit: adding a column to `Book` does not expose it
/// until it is added here and to [`BOOK_FIELDS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publication_year: i32,
    pub is_available: bool,
    pub isbn: Option<String>,
}

/// Field names exposed by [`BookRecord`], in order
pub const BOOK_FIELDS: [&str; 6] = ["id", "title", "author", "publication_year", "is_available", "isbn"];

impl From<&Book> for BookRecord {
    fn from(book: &Book) -> Self {
        BookRecord {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            publication_year: book.publication_year,
            is_available: book.is_available,
            isbn: book.isbn.clone(),
        }
    }
}

impl From<Book> for BookRecord {
    fn from(book: Book) -> Self {
        BookRecord {
            id: book.id,
            title: book.title,
            author: book.author,
            publication_year: book.publication_year,
            is_available: book.is_available,
            isbn: book.isbn,
        }
    }
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        Book {
            id: record.id,
            title: record.title,
            author: record.author,
            publication_year: record.publication_year,
            is_available: record.is_available,
            isbn: record.isbn,
        }
    }
}

/// Insert payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub publication_year: i32,
    pub is_available: bool,
    pub isbn: Option<String>,
}

/// Fields overwritten by an edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookChanges {
    pub title: String,
    pub author: String,
    pub publication_year: i32,
}

/// Cleaned book form data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookInput {
    pub title: String,
    pub author: String,
    pub publication_year: i32,
    pub isbn: Option<String>,
}

impl BookInput {
    pub fn into_new_book(self) -> NewBook {
        NewBook {
            title: self.title,
            author: self.author,
            publication_year: self.publication_year,
            is_available: true,
            isbn: self.isbn,
        }
    }

    pub fn changes(&self) -> BookChanges {
        BookChanges {
            title: self.title.clone(),
            author: self.author.clone(),
            publication_year: self.publication_year,
        }
    }
}

/// Raw create/edit form as posted by the browser
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BookForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Ensure the title has between 1 and 200 characters."))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Ensure the author has between 1 and 100 characters."))]
    pub author: String,
    #[serde(default)]
    pub publication_year: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(max = 13, message = "Ensure the ISBN has at most 13 characters."))]
    pub isbn: Option<String>,
}

impl BookForm {
    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            publication_year: book.publication_year.to_string(),
            isbn: book.isbn.clone(),
        }
    }

    /// Validate, then strip markup from the free-text fields
    pub fn clean(&self) -> Result<BookInput, FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        let publication_year = match self.publication_year.trim().parse::<i32>() {
            Ok(year) => Some(year),
            Err(_) => {
                errors.add("publication_year", "Enter a whole number.");
                None
            }
        };

        let title = sanitize::strip_markup(&self.title);
        if title.is_empty() && !errors.contains("title") {
            errors.add("title", "This field is required.");
        }
        let author = sanitize::strip_markup(&self.author);
        if author.is_empty() && !errors.contains("author") {
            errors.add("author", "This field is required.");
        }

        match publication_year {
            Some(publication_year) if errors.is_empty() => Ok(BookInput {
                title,
                author,
                publication_year,
                isbn: self.isbn.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// Search query parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct SearchForm {
    pub query: Option<String>,
}

impl SearchForm {
    /// Length check on the raw input, then the full sanitization pipeline
    pub fn clean(raw: &str) -> Result<String, FieldErrors> {
        let length = raw.chars().count();
        if length < SEARCH_MIN_CHARS {
            return Err(FieldErrors::single("query", "Search must be at least 2 characters."));
        }
        if length > SEARCH_MAX_CHARS {
            return Err(FieldErrors::single("query", "Search cannot exceed 100 characters."));
        }
        Ok(sanitize::sanitize(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dune() -> Book {
        Book {
            id: 7,
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            publication_year: 1965,
            is_available: true,
            isbn: Some("9780441013593".to_string()),
        }
    }

    #[test]
    fn record_exposes_exactly_the_declared_fields() {
        let value = serde_json::to_value(BookRecord::from(&dune())).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), BOOK_FIELDS.len());
        for field in BOOK_FIELDS {
            assert!(object.contains_key(field), "missing {}", field);
        }
    }

    #[test]
    fn record_round_trip_is_field_wise_identical() {
        let first = serde_json::to_value(BookRecord::from(&dune())).unwrap();
        let parsed: BookRecord = serde_json::from_value(first.clone()).unwrap();
        let second = serde_json::to_value(BookRecord::from(&Book::from(parsed))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn form_clean_parses_year_and_strips_markup() {
        let form = BookForm {
            title: "<b>Dune</b>".to_string(),
            author: " Herbert ".to_string(),
            publication_year: "1965".to_string(),
            isbn: None,
        };
        let input = form.clean().unwrap();
        assert_eq!(input.title, "Dune");
        assert_eq!(input.author, "Herbert");
        assert_eq!(input.publication_year, 1965);
        assert!(input.into_new_book().is_available);
    }

    #[test]
    fn form_clean_reports_every_bad_field() {
        let form = BookForm {
            title: String::new(),
            author: "<i></i>".to_string(),
            publication_year: "nineteen".to_string(),
            isbn: Some("12345678901234".to_string()),
        };
        let errors = form.clean().unwrap_err();
        assert!(errors.contains("title"));
        assert!(errors.contains("author"));
        assert!(errors.contains("publication_year"));
        assert!(errors.contains("isbn"));
    }

    #[test]
    fn search_query_length_bounds() {
        assert!(SearchForm::clean("a").unwrap_err().contains("query"));
        assert!(SearchForm::clean(&"x".repeat(101)).is_err());
        assert_eq!(SearchForm::clean("DROP TABLE books").unwrap(), "TABLE books");
    }
}

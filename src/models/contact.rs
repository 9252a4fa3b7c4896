//! Contact form

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{error::FieldErrors, sanitize};

/// Selectable categories as (value, label)
pub const CONTACT_CATEGORIES: [(&str, &str); 3] = [
    ("general", "General Inquiry"),
    ("support", "Technical Support"),
    ("feedback", "Feedback"),
];

fn validate_category(category: &str) -> Result<(), ValidationError> {
    if CONTACT_CATEGORIES.iter().any(|(value, _)| *value == category) {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid_choice");
        error.message = Some("Select a valid choice.".into());
        Err(error)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ContactForm {
    #[serde(default)]
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters."))]
    pub name: String,
    #[serde(default)]
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 150, message = "Email cannot exceed 150 characters.")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 10, max = 1000, message = "Message must be between 10 and 1000 characters."))]
    pub message: String,
    #[serde(default)]
    #[validate(custom(function = "validate_category"))]
    pub category: String,
}

/// Sanitized contact submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
    pub category: String,
}

impl ContactForm {
    /// Bounds are checked on the raw input; name and message are then stripped of markup
    pub fn clean(&self) -> Result<ContactMessage, FieldErrors> {
        self.validate().map_err(FieldErrors::from)?;

        let name = sanitize::strip_markup(&self.name);
        let message = sanitize::strip_markup(&self.message);
        let mut errors = FieldErrors::new();
        if name.is_empty() {
            errors.add("name", "This field is required.");
        }
        if message.is_empty() {
            errors.add("message", "This field is required.");
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ContactMessage {
            name,
            email: self.email.trim().to_string(),
            message,
            category: self.category.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ContactForm {
        ContactForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            message: "Please stock more Herbert.".to_string(),
            category: "feedback".to_string(),
        }
    }

    #[test]
    fn clean_accepts_valid_submission() {
        let message = valid().clean().unwrap();
        assert_eq!(message.category, "feedback");
        assert_eq!(message.name, "Ada");
    }

    #[test]
    fn clean_strips_markup_from_name_and_message() {
        let form = ContactForm {
            name: "<b>Ada</b>".to_string(),
            message: "<script>alert(1)</script> hello there".to_string(),
            ..valid()
        };
        let message = form.clean().unwrap();
        assert_eq!(message.name, "Ada");
        assert_eq!(message.message, "alert(1) hello there");
    }

    #[test]
    fn clean_rejects_unknown_category_and_bad_email() {
        let form = ContactForm {
            email: "nope".to_string(),
            category: "billing".to_string(),
            ..valid()
        };
        let errors = form.clean().unwrap_err();
        assert!(errors.contains("email"));
        assert!(errors.contains("category"));
    }

    #[test]
    fn clean_rejects_short_message() {
        let form = ContactForm {
            message: "hi".to_string(),
            ..valid()
        };
        assert!(form.clean().unwrap_err().contains("message"));
    }
}

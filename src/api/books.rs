//! Book pages: list, detail, create, edit, delete and search

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Form,
};

use super::{
    render::{Page, PageResult},
    LoginRequired,
};
use crate::{
    error::{AppError, FieldErrors},
    models::{
        book::{BookForm, BookRecord, SearchForm},
        permission::Capability,
    },
    AppState,
};

fn book_form_page(
    state: &AppState,
    page: Page,
    status: StatusCode,
    action: &str,
    form: &BookForm,
    errors: &FieldErrors,
    book_id: Option<i64>,
) -> PageResult {
    let mut context = page.context();
    context.insert("action", action);
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("book_id", &book_id);
    page.render(state, status, "book_form.html", context)
}

/// Duplicate ISBNs surface on the form rather than as a 409 page
fn isbn_conflict(error: AppError) -> Result<FieldErrors, AppError> {
    match error {
        AppError::Conflict(msg) => Ok(FieldErrors::single("isbn", msg)),
        other => Err(other),
    }
}

pub async fn list_books(State(state): State<AppState>, page: Page) -> PageResult {
    let books = state.services.books.list(&page.claims()).await?;
    let records: Vec<BookRecord> = books.into_iter().map(BookRecord::from).collect();

    let mut context = page.context();
    context.insert("books", &records);
    page.render(&state, StatusCode::OK, "book_list.html", context)
}

pub async fn book_detail(State(state): State<AppState>, page: Page, Path(id): Path<i64>) -> PageResult {
    let book = state.services.books.get(&page.claims(), id).await?;

    let mut context = page.context();
    context.insert("book", &BookRecord::from(book));
    page.render(&state, StatusCode::OK, "book_detail.html", context)
}

pub async fn create_form(State(state): State<AppState>, LoginRequired(user): LoginRequired, page: Page) -> PageResult {
    user.require(Capability::CanCreate)?;
    book_form_page(
        &state,
        page,
        StatusCode::OK,
        "Create",
        &BookForm::default(),
        &FieldErrors::new(),
        None,
    )
}

pub async fn create_book(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    page: Page,
    Form(form): Form<BookForm>,
) -> PageResult {
    user.require(Capability::CanCreate)?;

    let errors = match form.clean() {
        Ok(input) => match state.services.books.create(&user, input).await {
            Ok(_) => return Ok(page.redirect_with_message("/books/", "Book created successfully!")),
            Err(e) => isbn_conflict(e)?,
        },
        Err(errors) => errors,
    };
    book_form_page(&state, page, StatusCode::BAD_REQUEST, "Create", &form, &errors, None)
}

pub async fn edit_form(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    page: Page,
    Path(id): Path<i64>,
) -> PageResult {
    let book = state.services.books.get_for_edit(&user, id).await?;
    book_form_page(
        &state,
        page,
        StatusCode::OK,
        "Edit",
        &BookForm::from_book(&book),
        &FieldErrors::new(),
        Some(book.id),
    )
}

pub async fn edit_book(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    page: Page,
    Path(id): Path<i64>,
    Form(form): Form<BookForm>,
) -> PageResult {
    // Capability and existence first, so a bad form never hides a 403/404
    state.services.books.get_for_edit(&user, id).await?;

    match form.clean() {
        Ok(input) => {
            state.services.books.update(&user, id, &input).await?;
            Ok(page.redirect_with_message("/books/", "Book updated successfully!"))
        }
        Err(errors) => book_form_page(&state, page, StatusCode::BAD_REQUEST, "Edit", &form, &errors, Some(id)),
    }
}

pub async fn confirm_delete(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    page: Page,
    Path(id): Path<i64>,
) -> PageResult {
    let book = state.services.books.get_for_delete(&user, id).await?;

    let mut context = page.context();
    context.insert("book", &BookRecord::from(book));
    page.render(&state, StatusCode::OK, "book_confirm_delete.html", context)
}

pub async fn delete_book(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    page: Page,
    Path(id): Path<i64>,
) -> PageResult {
    state.services.books.delete(&user, id).await?;
    Ok(page.redirect_with_message("/books/", "Book deleted successfully!"))
}

/// Public search; without a query only the form is shown
pub async fn search(State(state): State<AppState>, page: Page, Query(params): Query<SearchForm>) -> PageResult {
    let mut context = page.context();
    context.insert("query", &params.query);

    let Some(raw) = params.query.as_deref() else {
        context.insert("searched", &false);
        context.insert("books", &Vec::<BookRecord>::new());
        context.insert("errors", &FieldErrors::new());
        return page.render(&state, StatusCode::OK, "search.html", context);
    };

    match state.services.books.search(raw).await {
        Ok(books) => {
            let records: Vec<BookRecord> = books.into_iter().map(BookRecord::from).collect();
            context.insert("searched", &true);
            context.insert("books", &records);
            context.insert("errors", &FieldErrors::new());
            page.render(&state, StatusCode::OK, "search.html", context)
        }
        Err(AppError::Validation(errors)) => {
            context.insert("searched", &false);
            context.insert("books", &Vec::<BookRecord>::new());
            context.insert("errors", &errors);
            page.render(&state, StatusCode::BAD_REQUEST, "search.html", context)
        }
        Err(e) => Err(e.into()),
    }
}

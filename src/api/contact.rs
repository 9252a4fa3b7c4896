//! Public contact form

use axum::{extract::State, http::StatusCode, Form};

use super::render::{Page, PageResult};
use crate::{
    error::{AppError, FieldErrors},
    models::contact::{ContactForm, CONTACT_CATEGORIES},
    AppState,
};

fn contact_page(state: &AppState, page: Page, status: StatusCode, form: &ContactForm, errors: &FieldErrors) -> PageResult {
    let mut context = page.context();
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("categories", &CONTACT_CATEGORIES);
    context.insert("submitted", &false);
    page.render(state, status, "contact.html", context)
}

pub async fn contact_form(State(state): State<AppState>, page: Page) -> PageResult {
    let form = ContactForm {
        category: "general".to_string(),
        ..ContactForm::default()
    };
    contact_page(&state, page, StatusCode::OK, &form, &FieldErrors::new())
}

pub async fn submit_contact(State(state): State<AppState>, page: Page, Form(form): Form<ContactForm>) -> PageResult {
    match state.services.contact.submit(&form) {
        Ok(message) => {
            let mut context = page.context();
            context.insert("submitted", &true);
            context.insert("contact", &message);
            page.render(&state, StatusCode::OK, "contact.html", context)
        }
        Err(AppError::Validation(errors)) => contact_page(&state, page, StatusCode::BAD_REQUEST, &form, &errors),
        Err(e) => Err(e.into()),
    }
}

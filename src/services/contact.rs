//! Contact form handling. Submissions are logged, never stored.

use crate::{
    error::{AppError, AppResult},
    models::contact::{ContactForm, ContactMessage},
};

#[derive(Clone, Default)]
pub struct ContactService;

impl ContactService {
    pub fn new() -> Self {
        Self
    }

    pub fn submit(&self, form: &ContactForm) -> AppResult<ContactMessage> {
        let message = form.clean().map_err(AppError::Validation)?;
        tracing::info!(
            name = %message.name,
            email = %message.email,
            category = %message.category,
            length = message.message.chars().count(),
            "Contact form submitted"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_returns_cleaned_message() {
        let form = ContactForm {
            name: "<b>Ada</b>".to_string(),
            email: "ada@example.com".to_string(),
            message: "Hello there, <script>x</script>friends".to_string(),
            category: "feedback".to_string(),
        };
        let message = ContactService::new().submit(&form).unwrap();
        assert_eq!(message.name, "Ada");
        assert_eq!(message.message, "Hello there, xfriends");
    }

    #[test]
    fn submit_rejects_unknown_category() {
        let form = ContactForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            message: "A long enough message".to_string(),
            category: "sales".to_string(),
        };
        match ContactService::new().submit(&form) {
            Err(AppError::Validation(errors)) => assert!(errors.contains("category")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}

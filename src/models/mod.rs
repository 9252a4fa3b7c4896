//! Data models for Bookshelf

pub mod book;
pub mod catalog;
pub mod contact;
pub mod permission;
pub mod user;

use serde::{Deserialize, Deserializer};

// Re-export commonly used types
pub use book::{Book, BookRecord};
pub use catalog::{Author, Librarian, Library, LibraryDetail};
pub use permission::{Bundle, Capability, CapabilitySet};
pub use user::{Role, User, UserClaims, UserProfile};

/// Deserializes blank form inputs as `None`
pub fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

//! Business logic services

pub mod books;
pub mod catalog;
pub mod contact;
pub mod permissions;
pub mod users;

use crate::{config::AuthConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub catalog: catalog::CatalogService,
    pub contact: contact::ContactService,
    pub permissions: permissions::PermissionsService,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig) -> Self {
        let permissions = permissions::PermissionsService::new(repository.clone());
        Self {
            books: books::BooksService::new(repository.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            contact: contact::ContactService::new(),
            users: users::UsersService::new(repository, auth_config, permissions.clone()),
            permissions,
        }
    }
}

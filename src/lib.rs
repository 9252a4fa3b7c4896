//! Bookshelf catalog server
//!
//! A small library catalog: capability-gated book pages, a sanitizing
//! search and contact form, role dashboards, and a JSON API for authors
//! and libraries.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod sanitize;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub templates: Arc<api::render::Templates>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: repository::Repository) -> Result<Self, tera::Error> {
        let services = services::Services::new(repository, config.auth.clone());
        Ok(Self {
            config: Arc::new(config),
            services: Arc::new(services),
            templates: Arc::new(api::render::Templates::new()?),
        })
    }
}

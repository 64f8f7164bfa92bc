//! HTTP handlers, one module per resource, plus the shared extractors and
//! response envelope they use.

pub mod auth;
pub mod auth_handlers;
pub mod contact_handlers;
pub mod extract;
pub mod health_handlers;
pub mod homepage_handlers;
pub mod media_handlers;
pub mod product_handlers;
pub mod project_handlers;
pub mod response;
pub mod settings_handlers;
pub mod translation_handlers;
pub mod upload;
pub mod user_handlers;

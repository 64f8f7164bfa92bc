//! Core documents of the showcase catalog.
//!
//! Catalog entities (products, projects, messages) are JSON documents with
//! nested multilingual fields; settings are singleton documents; users are
//! plain rows mapped with `sqlx::FromRow`. All of them serialize as
//! camelCase JSON for the HTTP surface.

pub mod localized;
pub mod media;
pub mod message;
pub mod product;
pub mod project;
pub mod settings;
pub mod user;

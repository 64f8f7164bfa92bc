//! Defines every route of the API.
//!
//! ## Structure
//! - `/api/health`, `/api/ready`: liveness and readiness
//! - `/api/auth`, `/api/admin-users`: sessions and back-office accounts
//! - `/api/settings`, `/api/homepage-settings`: singleton documents
//! - `/api/products`, `/api/projects`: catalog, with gallery and PDF media
//! - `/api/contact`: public form and admin inbox
//! - `/api/translations`: on-demand translation
//! - `/media/{resourceType}/{*publicId}`: locally stored media
//!
//! Static segments (`/featured`, `/admin/all`, `/prune`) take precedence over
//! the `{id}` captures next to them.

use crate::{
    AppState,
    handlers::{
        auth_handlers, contact_handlers,
        health_handlers::{health, ready},
        homepage_handlers,
        media_handlers::serve_media,
        product_handlers, project_handlers, settings_handlers, translation_handlers,
        user_handlers,
    },
};
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth_handlers::login))
        .route("/me", get(auth_handlers::me))
        .route("/logout", post(auth_handlers::logout))
        .route("/refresh", post(auth_handlers::refresh))
}

fn user_routes() -> Router<AppState> {
    use user_handlers::*;
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/{id}/toggle-status", patch(toggle_status))
        .route("/{id}/change-password", patch(change_password))
}

fn settings_routes() -> Router<AppState> {
    use settings_handlers::*;
    Router::new()
        .route("/", get(get_public).put(update_general))
        .route("/admin", get(get_admin))
        .route("/contact", put(update_contact))
        .route("/email", put(update_email))
        .route("/reset", post(reset))
}

fn homepage_routes() -> Router<AppState> {
    use homepage_handlers::*;
    Router::new()
        .route(
            "/featured-products",
            get(featured_products).put(set_featured).delete(clear_featured),
        )
        .route("/featured-products/prune", post(prune_featured))
        .route(
            "/featured-products/{product_id}",
            post(add_featured).delete(remove_featured),
        )
        .route("/admin", get(admin_view))
}

fn product_routes() -> Router<AppState> {
    use product_handlers::*;
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/featured", get(latest_products))
        .route("/categories", get(categories))
        .route("/colors", get(colors))
        .route("/sizes", get(sizes))
        .route("/search", get(search))
        .route("/category", get(by_category))
        .route("/admin/all", get(admin_list))
        .route("/fix-pdf-urls", post(fix_pdf_urls))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/{id}/catalog", post(upload_catalog).delete(delete_catalog))
        .route("/{id}/catalog/download", get(download_catalog))
        .route("/{id}/hide", patch(hide_product))
        .route("/{id}/show", patch(show_product))
        .route("/{id}/images/by-color", get(images_by_color))
        .route("/{id}/images/associate-color", patch(associate_color))
        .route("/{id}/images/associate-category", patch(associate_category))
        .route("/{id}/images/reorder", patch(reorder_images))
        .route("/{id}/images/{index}", delete(delete_image))
}

fn project_routes() -> Router<AppState> {
    use project_handlers::*;
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/featured", get(featured_projects))
        .route("/categories", get(categories))
        .route("/years", get(years))
        .route("/search", get(search))
        .route("/category", get(by_category))
        .route(
            "/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/{id}/reorder-images", put(reorder_images))
        .route("/{id}/images/{index}", delete(delete_image))
}

fn contact_routes() -> Router<AppState> {
    use contact_handlers::*;
    Router::new()
        .route("/submit", post(submit))
        .route("/messages", get(list_messages))
        .route("/messages/stats", get(stats))
        .route("/messages/{id}", get(get_message).delete(delete_message))
        .route("/messages/{id}/status", patch(update_status))
        .route("/messages/{id}/reply", post(reply))
}

fn translation_routes() -> Router<AppState> {
    use translation_handlers::*;
    Router::new()
        .route("/product/{id}", post(translate_product))
        .route("/project/{id}", post(translate_project))
        .route("/products/all", post(translate_all_products))
        .route("/projects/all", post(translate_all_projects))
}

/// Build the router for every API route. State is supplied by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ready", get(ready))
        .nest("/api/auth", auth_routes())
        .nest("/api/admin-users", user_routes())
        .nest("/api/settings", settings_routes())
        .nest("/api/homepage-settings", homepage_routes())
        .nest("/api/products", product_routes())
        .nest("/api/projects", project_routes())
        .nest("/api/contact", contact_routes())
        .nest("/api/translations", translation_routes())
        .route("/media/{resource_type}/{*public_id}", get(serve_media))
}

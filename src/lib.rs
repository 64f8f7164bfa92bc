//! Catalog and content API for the showcase site.
//!
//! `routes` maps HTTP paths to `handlers`, which validate input and call
//! the domain `services`. Everything a handler needs lives in [`AppState`].

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
};
use models::settings::{HomepageSettings, SiteSettings};
use secrecy::SecretString;
use services::{
    auth_service::AuthService,
    curator::Curator,
    mail_service::Mailer,
    media::{MAX_FILE_BYTES, MediaStore},
    message_service::MessageService,
    product_service::ProductService,
    project_service::ProjectService,
    settings_service::SettingsStore,
    translation_service::{CompletionClient, Translator},
    user_service::UserService,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

/// Largest request accepted: a full project gallery plus the JSON part.
const MAX_REQUEST_BYTES: usize = 26 * MAX_FILE_BYTES;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub media: Arc<dyn MediaStore>,
    pub products: ProductService,
    pub projects: ProjectService,
    pub curator: Curator,
    pub site_settings: SettingsStore<SiteSettings>,
    pub messages: MessageService,
    pub users: UserService,
    pub auth: AuthService,
    pub translator: Translator,
}

impl AppState {
    pub fn new(
        db: Arc<SqlitePool>,
        media: Arc<dyn MediaStore>,
        mailer: Option<Arc<dyn Mailer>>,
        completion: Option<Arc<dyn CompletionClient>>,
        public_url: &str,
        jwt_secret: &SecretString,
        jwt_ttl: chrono::Duration,
    ) -> Self {
        let products = ProductService::new(db.clone(), media.clone(), public_url);
        let projects = ProjectService::new(db.clone(), media.clone());
        let site_settings = SettingsStore::<SiteSettings>::new(db.clone());
        let curator = Curator::new(SettingsStore::<HomepageSettings>::new(db.clone()), products.clone());
        let messages = MessageService::new(db.clone(), media.clone(), mailer, site_settings.clone());
        let users = UserService::new(db.clone());
        let auth = AuthService::new(users.clone(), jwt_secret, jwt_ttl);
        let translator = Translator::new(completion, products.clone(), projects.clone());
        Self {
            db,
            media,
            products,
            projects,
            curator,
            site_settings,
            messages,
            users,
            auth,
            translator,
        }
    }
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Full application router with middleware applied.
pub fn build_app(state: AppState, cors_origins: &[String]) -> Router {
    routes::routes::routes()
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(cors(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use crate::services::{
    mail_service::SmtpConfig,
    media::cloudinary::{CloudinaryConfig, DEFAULT_API_BASE, DEFAULT_DELIVERY_BASE},
    translation_service::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, OpenAiConfig},
};
use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub media_dir: String,
    /// Origin this server is reachable at, used for disk media URLs and
    /// catalog download links.
    pub public_url: String,
    pub cors_origins: Vec<String>,
    pub jwt_secret: Option<SecretString>,
    pub jwt_ttl_hours: i64,
    pub cloudinary: Option<CloudinaryConfig>,
    pub smtp: Option<SmtpConfig>,
    pub openai: Option<OpenAiConfig>,
}

/// What the binary was asked to do.
#[derive(Debug, Clone)]
pub enum Mode {
    Serve,
    Migrate,
    CreateAdmin {
        name: String,
        email: String,
        password: SecretString,
    },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Catalog and content API for the showcase site")]
pub struct Args {
    /// Host to bind to (overrides SHOWCASE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SHOWCASE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides SHOWCASE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for locally stored media (overrides SHOWCASE_MEDIA_DIR)
    #[arg(long)]
    pub media_dir: Option<String>,

    /// Public origin of this server (overrides SHOWCASE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Create an administrator account and exit
    #[arg(long, requires_all = ["admin_email", "admin_password"])]
    pub create_admin: bool,

    #[arg(long)]
    pub admin_email: Option<String>,

    #[arg(long, default_value = "Administrator")]
    pub admin_name: String,

    #[arg(long)]
    pub admin_password: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        // A missing .env is fine.
        dotenvy::dotenv().ok();
        let args = Args::parse();

        let public_url = args
            .public_url
            .clone()
            .unwrap_or_else(|| env_or("SHOWCASE_PUBLIC_URL", "http://localhost:5000"));

        let cfg = Self {
            host: args.host.clone().unwrap_or_else(|| env_or("SHOWCASE_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => env_parse("SHOWCASE_PORT", 5000)?,
            },
            database_url: args
                .database_url
                .clone()
                .unwrap_or_else(|| env_or("SHOWCASE_DATABASE_URL", "sqlite://./data/showcase.db")),
            media_dir: args
                .media_dir
                .clone()
                .unwrap_or_else(|| env_or("SHOWCASE_MEDIA_DIR", "./data/media")),
            public_url: public_url.trim_end_matches('/').to_string(),
            cors_origins: split_list(&env_or("SHOWCASE_CORS_ORIGINS", "http://localhost:3000")),
            jwt_secret: env_opt("SHOWCASE_JWT_SECRET").map(SecretString::from),
            jwt_ttl_hours: env_parse("SHOWCASE_JWT_TTL_HOURS", 720)?,
            cloudinary: cloudinary_from_env(),
            smtp: smtp_from_env()?,
            openai: openai_from_env(),
        };

        let mode = if args.create_admin {
            Mode::CreateAdmin {
                name: args.admin_name,
                email: args.admin_email.unwrap_or_default(),
                password: SecretString::from(args.admin_password.unwrap_or_default()),
            }
        } else if args.migrate {
            Mode::Migrate
        } else {
            Mode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Cloudinary is used only when all three credentials are present.
fn cloudinary_from_env() -> Option<CloudinaryConfig> {
    let cloud_name = env_opt("CLOUDINARY_CLOUD_NAME")?;
    let api_key = env_opt("CLOUDINARY_API_KEY")?;
    let api_secret = env_opt("CLOUDINARY_API_SECRET")?;
    Some(CloudinaryConfig {
        cloud_name,
        api_key,
        api_secret: SecretString::from(api_secret),
        api_base: DEFAULT_API_BASE.into(),
        delivery_base: DEFAULT_DELIVERY_BASE.into(),
    })
}

fn smtp_from_env() -> Result<Option<SmtpConfig>> {
    let (Some(host), Some(from)) = (env_opt("SMTP_HOST"), env_opt("SMTP_FROM")) else {
        return Ok(None);
    };
    Ok(Some(SmtpConfig {
        host,
        port: env_parse("SMTP_PORT", 587)?,
        username: env_opt("SMTP_USERNAME"),
        password: env_opt("SMTP_PASSWORD").map(SecretString::from),
        from,
        from_name: env_or("SMTP_FROM_NAME", "Nissal"),
    }))
}

fn openai_from_env() -> Option<OpenAiConfig> {
    let api_key = env_opt("OPENAI_API_KEY")?;
    Some(OpenAiConfig {
        api_key: SecretString::from(api_key),
        model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
        base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" http://a.rs , ,http://b.rs"),
            vec!["http://a.rs".to_string(), "http://b.rs".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}

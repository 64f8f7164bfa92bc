use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use showcase_api::{
    AppState, build_app,
    config::{AppConfig, Mode},
    services::{
        db,
        mail_service::{Mailer, SmtpMailer},
        media::{MediaStore, cloudinary::CloudinaryMediaStore, disk::DiskMediaStore},
        translation_service::{CompletionClient, OpenAiClient},
        user_service::UserService,
    },
};
use std::{fs, io::ErrorKind, net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        database_url = %cfg.database_url,
        media_dir = %cfg.media_dir,
        cloudinary = cfg.cloudinary.is_some(),
        smtp = cfg.smtp.is_some(),
        openai = cfg.openai.is_some(),
        "starting showcase-api"
    );

    // --- Ensure the SQLite directory exists ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = Arc::new(
        db::connect(&cfg.database_url, 5)
            .await
            .with_context(|| format!("connecting to {}", cfg.database_url))?,
    );
    db::run_migrations(&db).await?;

    match mode {
        Mode::Migrate => {
            tracing::info!("Database migration complete.");
            return Ok(());
        }
        Mode::CreateAdmin {
            name,
            email,
            password,
        } => {
            let admin = UserService::new(db.clone())
                .bootstrap_admin(&name, &email, password.expose_secret())
                .await?;
            tracing::info!(id = %admin.id, email = %admin.email, "administrator created");
            return Ok(());
        }
        Mode::Serve => {}
    }

    let jwt_secret = cfg
        .jwt_secret
        .clone()
        .context("SHOWCASE_JWT_SECRET must be set to serve requests")?;

    // --- Collaborators ---
    let media: Arc<dyn MediaStore> = match &cfg.cloudinary {
        Some(cloudinary) => Arc::new(CloudinaryMediaStore::new(cloudinary.clone())?),
        None => {
            if !Path::new(&cfg.media_dir).exists() {
                fs::create_dir_all(&cfg.media_dir)?;
                tracing::info!("Created media directory at {}", cfg.media_dir);
            }
            Arc::new(DiskMediaStore::new(&cfg.media_dir, &cfg.public_url))
        }
    };
    let mailer: Option<Arc<dyn Mailer>> = match &cfg.smtp {
        Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp)?)),
        None => {
            tracing::warn!("SMTP is not configured; notification mail is disabled");
            None
        }
    };
    let completion: Option<Arc<dyn CompletionClient>> = match &cfg.openai {
        Some(openai) => Some(Arc::new(OpenAiClient::new(openai.clone())?)),
        None => None,
    };

    let state = AppState::new(
        db,
        media,
        mailer,
        completion,
        &cfg.public_url,
        &jwt_secret,
        chrono::Duration::hours(cfg.jwt_ttl_hours),
    );
    let app = build_app(state, &cfg.cors_origins);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

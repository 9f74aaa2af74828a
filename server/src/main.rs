use clap::Parser;
use miette::{IntoDiagnostic, Result};
use oidc_gate::{
    AuthServer, Authenticator, CookieSettings, CookieStore, HttpProviderClient, MemoryStore,
    ProviderClient, RedisStore, SessionStore, cookie_key,
};
use settings::{Flags, Settings, StoreKind};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

mod admin;
mod cors;
mod logging;
mod settings;

async fn session_store(settings: &Settings) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match settings.session.store {
        StoreKind::Cookie => Arc::new(CookieStore::new()),
        StoreKind::Memory => {
            tracing::warn!("sessions are kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Redis => {
            let config = settings.redis_config().into_diagnostic()?;
            Arc::new(RedisStore::connect(config).await.into_diagnostic()?)
        }
    };
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let flags = Flags::parse();

    let debug_env = std::env::var("DEBUG")
        .ok()
        .and_then(|v| settings::truthy(&v))
        .unwrap_or(false);
    let level = if flags.debug || debug_env {
        "debug"
    } else {
        flags.log_level.as_str()
    };
    let log = logging::init(level, flags.log_output).into_diagnostic()?;

    let settings = Settings::load(&flags).into_diagnostic()?;
    if settings.server.debug && log.level() != tracing::Level::DEBUG {
        log.set_level("debug").into_diagnostic()?;
    }
    tracing::info!(config = %flags.config, store = ?settings.session.store, "configuration loaded");

    let auth_config = settings.auth_config().into_diagnostic()?;
    let provider = HttpProviderClient::discover(auth_config.clone())
        .await
        .into_diagnostic()?;
    tracing::info!(issuer = %provider.metadata().issuer, "provider discovered");

    let server = AuthServer::builder()
        .authenticator(Authenticator::new(auth_config, Arc::new(provider)))
        .session_store(session_store(&settings).await?)
        .cookie_key(cookie_key(&settings.session.secret))
        .cookie_settings(CookieSettings {
            max_age_seconds: i64::try_from(settings.session.max_age).unwrap_or(i64::MAX),
            http_only: settings.session.http_only,
            secure: settings.session.secure,
            ..Default::default()
        })
        .build()
        .into_diagnostic()?;

    let admin = admin::AdminState::new(admin::AdminCredentials::from_env(), log);

    let app = server
        .router()
        .merge(admin::router(admin))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors::layer(&settings.cors).into_diagnostic()?);

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .into_diagnostic()?;
    tracing::info!(address = %address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;
    Ok(())
}

mod config;
mod scheduler;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bookspark_api::auth::{AppState, AppStateInner};
use bookspark_crypto::LinkSigner;
use bookspark_db::Database;
use bookspark_services::analyzer::OpenAiAnalyzer;
use bookspark_services::digest::DigestGenerator;
use bookspark_services::email::EmailService;
use bookspark_services::mailer::ResendMailer;
use bookspark_services::processor::ContentProcessor;
use bookspark_services::sync::BookmarkSync;
use bookspark_services::twitter::TwitterClient;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bookspark=debug,bookspark_api=debug,bookspark_services=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    let db = Arc::new(Database::open(&config.db_path)?);

    // External clients
    let mut source = TwitterClient::new();
    if let Some(base) = &config.twitter_api_base {
        source = source.with_base_url(base.clone());
    }
    let mut analyzer = OpenAiAnalyzer::new(config.openai_api_key.clone());
    if let Some(model) = &config.openai_model {
        analyzer = analyzer.with_model(model.clone());
    }
    let mailer = ResendMailer::new(config.resend_api_key.clone());

    let links = LinkSigner::new(&config.link_secret, chrono::Duration::days(config.link_ttl_days));
    let mut email = EmailService::new(Arc::new(mailer), links.clone(), config.base_url.clone());
    if let Some(from) = &config.mail_from {
        email = email.with_from(from.clone());
    }
    let email = Arc::new(email);

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        bridge_secret: config.bridge_secret.clone(),
        links,
        email: email.clone(),
        sync: BookmarkSync::new(db.clone(), Arc::new(source)),
        processor: ContentProcessor::new(db.clone(), Arc::new(analyzer)),
        digest: DigestGenerator::new(db, email),
    });

    if config.digest_interval_secs > 0 {
        tokio::spawn(scheduler::run_digest_loop(state.clone(), config.digest_interval_secs));
        info!("Digest scheduler running every {}s", config.digest_interval_secs);
    } else {
        info!("Digest scheduler disabled");
    }

    let app = bookspark_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("BookSpark server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

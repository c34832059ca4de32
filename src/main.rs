use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interview_capture::audio::OpenAiSpeech;
use interview_capture::{
    create_router, AppState, Config, EventPublisher, FsObjectStore, MemoryCounterStore, MemoryStore,
    NatsClient, NoopPublisher, SystemClock,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "interview-capture")]
#[command(about = "Interview session continuity and chunked media capture service")]
struct Args {
    /// Config file, without extension
    #[arg(short, long, env = "INTERVIEW_CONFIG", default_value = "config/interview-capture")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Load the configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config).with_context(|| format!("Failed to load config {}", args.config))?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::CheckConfig => {
            check_config(&cfg);
            Ok(())
        }
    }
}

fn check_config(cfg: &Config) {
    info!("Service: {}", cfg.service.name);
    info!("HTTP: {}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("Media root: {}", cfg.storage.root_path().display());
    info!(
        "Sessions: auto-pause after {}m, expire after {}d",
        cfg.session.staleness_minutes, cfg.session.max_pause_days
    );
    info!(
        "Capture: {}s chunks, {}s max, {} attempts",
        cfg.capture.chunk_interval_secs, cfg.capture.max_duration_secs, cfg.capture.upload_attempts
    );
    info!("Speech configured: {}", cfg.speech.api_key.is_some());
    info!("NATS: {}", cfg.events.nats_url.as_deref().unwrap_or("disabled"));
    info!("Researcher tokens: {}", cfg.auth.researcher_tokens.len());
}

async fn serve(cfg: Config) -> Result<()> {
    info!("Interview Capture v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = cfg.storage.studies_path() {
        let count = store
            .load_studies(&path)
            .await
            .with_context(|| format!("Failed to load studies from {}", path.display()))?;
        info!("Loaded {} studies from {}", count, path.display());
    }

    let objects = Arc::new(FsObjectStore::new(cfg.storage.root_path()).await?);
    info!("Media stored under {}", objects.root().display());
    let media_dir = objects.root().to_path_buf();

    let events: Arc<dyn EventPublisher> = match &cfg.events.nats_url {
        Some(url) => match NatsClient::connect(url).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!("Lifecycle events disabled: {}", e);
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    let mut state = AppState::new(
        &cfg,
        store,
        objects,
        Arc::new(MemoryCounterStore::new()),
        events,
        Arc::new(SystemClock),
    );

    match OpenAiSpeech::new(&cfg.speech) {
        Ok(speech) => {
            let speech = Arc::new(speech);
            state = state.with_speech(speech.clone(), speech);
        }
        Err(e) => warn!("Speech endpoints disabled: {}", e),
    }

    if cfg.storage.serve_media {
        info!("Serving media at /media");
        state = state.with_media_dir(media_dir);
    }

    // Expired rate limit counters and abandoned uploads
    let limiter = state.limiter.clone();
    let uploads = state.uploads.clone();
    let upload_ttl = cfg.storage.upload_ttl();
    let sweep_every = Duration::from_secs(cfg.limits.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            match limiter.sweep().await {
                Ok(0) => {}
                Ok(n) => info!("Swept {} expired rate limit entries", n),
                Err(e) => warn!("Rate limit sweep failed: {}", e),
            }
            match uploads.sweep(upload_ttl).await {
                Ok(0) => {}
                Ok(n) => info!("Swept {} upload sessions", n),
                Err(e) => warn!("Upload sweep failed: {}", e),
            }
        }
    });

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await?;

    Ok(())
}

use clap::{CommandFactory, FromArgMatches, Parser};
use midword_core::config::Config;
use midword_hive::collab::{HttpEmbedder, StoreIndex};
use midword_hive::state::AppState;
use midword_hive::store::Store;
use midword_hive::{db, routes, scheduler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "midword-hive", about = "Midword game server")]
struct Args {
    #[arg(long, default_value = "sqlite://midword.db")]
    db: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Base URL of the embedding service.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    embedder_url: String,

    #[arg(long, default_value_t = 10)]
    embedder_timeout_secs: u64,

    /// JSON config file; explicit flags win over its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "MIDWORD_SECRET")]
    secret: Option<String>,

    #[command(flatten)]
    game: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches)?;

    info!("🐝 Midword Hive is initializing...");

    let config = match &args.config {
        Some(path) => {
            info!("📄 Loading config from {:?}", path);
            let mut cfg = Config::load_from_file(path)?;
            cfg.merge_from_cli(&args.game, &matches);
            cfg
        }
        None => args.game.clone(),
    };
    config.validate()?;

    if args.secret.is_none() {
        warn!("⚠️ MIDWORD_SECRET not set, admin routes are open");
    }

    let pool = db::init_db(&args.db).await?;
    let store = Store::new(pool);
    let embedder = HttpEmbedder::new(
        &args.embedder_url,
        Duration::from_secs(args.embedder_timeout_secs),
    )?;

    let state = Arc::new(
        AppState::builder()
            .store(store.clone())
            .embedder(Arc::new(embedder))
            .index(Arc::new(StoreIndex::new(store)))
            .config(config)
            .admin_secret(args.secret)
            .build(),
    );

    state.rebuild_aggregates().await?;

    if state.config.schedule.rotation_enabled {
        scheduler::spawn_daily_rotation(state.clone())?;
    } else {
        warn!("⏸️ Daily rotation disabled");
    }

    let app = routes::app(state)
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("🚀 Hive listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

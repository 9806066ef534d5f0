use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use peerly_gate::{
    AppState,
    config::{AppConfig, ClientContext, Env},
    create_router, export,
    paths::PathTable,
    profile::{PostgresProfileStore, ProfileState},
    session::SessionState,
    supabase,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "peerly-gate")]
#[command(about = "Peerly route-access gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the gated router (default)
    Serve,

    /// Render the public pages to static HTML without binding a listener
    Export {
        /// Output directory
        #[arg(long, default_value = "dist")]
        out_dir: PathBuf,
    },
}

/// main
///
/// Loads configuration, initializes logging, builds the provider clients once and either
/// serves the gated router or exports the public pages.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    let config = AppConfig::load().context("loading configuration")?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "peerly_gate=debug,tower_http=info".into());

    // Pretty output locally, JSON for log aggregation in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    let paths = PathTable::default();
    paths.validate().context("path table is inconsistent")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("starting in {:?} mode", config.env);
            // Missing provider settings are always fatal for the serving edge.
            let sessions = supabase::edge_session_provider(&config)
                .context("identity provider is not configured")?;
            serve(build_state(config, sessions, paths)?).await
        }
        Command::Export { out_dir } => {
            let sessions = supabase::session_client(&config, ClientContext::Build)?;
            let written = export::export_pages(build_state(config, sessions, paths)?, &out_dir)
                .await
                .context("static export failed")?;
            tracing::info!("exported {} pages to {}", written.len(), out_dir.display());
            Ok(())
        }
    }
}

fn build_state(
    config: AppConfig,
    sessions: SessionState,
    paths: PathTable,
) -> anyhow::Result<AppState> {
    // Lazy so the edge can start before the database accepts connections; lookups that
    // fail only leave the profile unknown.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&config.db_url)
        .context("invalid DATABASE_URL")?;
    let profiles = Arc::new(PostgresProfileStore::new(pool)) as ProfileState;

    Ok(AppState {
        sessions,
        profiles,
        config,
        paths: Arc::new(paths),
    })
}

async fn serve(app_state: AppState) -> anyhow::Result<()> {
    let bind_addr = app_state.config.bind_addr.clone();
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

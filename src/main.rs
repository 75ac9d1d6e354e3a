use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shoebox::config::AppConfig;
use shoebox::{app, db, prepare_storage, reset_content};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve,
    /// Delete all albums, photos and stored files, then recreate the default album
    InitDb,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shoebox=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new("shoebox".into(), std::io::stdout))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let db_pool = db::connect(&config.database_url).await?;

    match cli.command {
        Some(Commands::InitDb) => {
            reset_content(&db_pool, &config).await?;
            info!("Database initialized");
            Ok(())
        }
        Some(Commands::Serve) | None => {
            prepare_storage(&config).await?;

            let listener = TcpListener::bind(&config.bind_addr).await?;
            info!(addr = %config.bind_addr, mode = ?config.mode, "Server starting");

            let app = app(db_pool, config);
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
            Ok(())
        }
    }
}

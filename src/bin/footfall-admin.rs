use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use footfall::analytics::{DateRange, StatsService};
use footfall::config::{Config, DatabaseBackend};
use footfall::cursor;
use footfall::storage::{PostgresStorage, SqliteStorage, Storage};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "footfall-admin")]
#[command(about = "Footfall visit statistics CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Today, yesterday, this week and this month
    Overview,
    /// Per-day series for the last N days
    Trend {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Most visited pages
    TopPages {
        #[arg(long, default_value_t = 10)]
        limit: i64,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// Last day (inclusive), YYYY-MM-DD
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Latest raw visit records
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Cursor printed by a previous call
        #[arg(long)]
        cursor: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;
    cursor::init_cursor_hmac_key(config.pagination.cursor_hmac_secret.as_deref());

    let stats = StatsService::new(storage, &config.analytics);

    match cli.command {
        Commands::Overview => print_json(&stats.overview().await?)?,
        Commands::Trend { days } => {
            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                }
            });

            let trend = stats
                .trend_with_cancel(days, &cancel)
                .await
                .context("Trend computation failed")?;
            print_json(&trend)?;
        }
        Commands::TopPages {
            limit,
            start_date,
            end_date,
        } => {
            let range = DateRange::new(start_date, end_date);
            print_json(&stats.top_pages(&range, limit).await?)?;
        }
        Commands::Recent { limit, cursor } => {
            print_json(&stats.recent_visits(limit, cursor.as_deref()).await?)?;
        }
    }

    Ok(())
}

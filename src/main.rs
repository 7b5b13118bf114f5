use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bench;
mod codec;
mod config;
mod db;
mod engine;
mod metrics;
mod models;
mod queue;
mod submitter;

use crate::bench::BenchmarkConfig;
use crate::config::AppConfig;
use crate::db::Database;
use crate::engine::MatchingEngine;

#[derive(Parser)]
#[command(name = "bourse-engine", version, about = "Stock exchange matching engine")]
struct Cli {
    /// Provide more detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the store schema
    Initdb {
        /// Store URI; defaults to $SQLALCHEMY_URI
        #[arg(short = 's', long)]
        sql_uri: Option<String>,
    },

    /// Start an instance of the matching engine
    #[command(name = "start_engine")]
    StartEngine {
        /// Hostname of the RabbitMQ server; defaults to $RABBITMQ_HOST
        #[arg(short = 'q', long)]
        queue_host: Option<String>,

        /// Store URI; defaults to $SQLALCHEMY_URI
        #[arg(short = 's', long)]
        sql_uri: Option<String>,

        /// Receive messages but skip the match cycle
        #[arg(long)]
        dry_run: bool,
    },

    /// Seed a market, replay paired orders through a running engine, and
    /// verify fills and balances
    Benchmark {
        /// Number of (ask, bid) pairs to submit
        #[arg(short = 'n', long, default_value_t = 100)]
        rounds: u32,

        /// Hostname of the RabbitMQ server; defaults to $RABBITMQ_HOST
        #[arg(short = 'q', long)]
        queue_host: Option<String>,

        /// Store URI; defaults to $SQLALCHEMY_URI
        #[arg(short = 's', long)]
        sql_uri: Option<String>,

        /// How long to wait for the engine to drain the queue
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "bourse_engine=debug"
    } else {
        "bourse_engine=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::from_env();

    match cli.command {
        Command::Initdb { sql_uri } => {
            if let Some(uri) = sql_uri {
                config.sql_uri = uri;
            }
            let db = Database::connect(&config.sql_uri).await?;
            db.init_schema().await?;
        }

        Command::StartEngine {
            queue_host,
            sql_uri,
            dry_run,
        } => {
            if let Some(host) = queue_host {
                config.queue.host = host;
            }
            if let Some(uri) = sql_uri {
                config.sql_uri = uri;
            }
            config.dry_run |= dry_run;

            metrics::init_metrics(config.metrics_addr)?;
            let db = Database::connect(&config.sql_uri).await?;
            db.ping().await?;

            let engine = MatchingEngine::new(db, &config);
            engine.run(&config.queue).await?;
        }

        Command::Benchmark {
            rounds,
            queue_host,
            sql_uri,
            timeout_secs,
        } => {
            if let Some(host) = queue_host {
                config.queue.host = host;
            }
            if let Some(uri) = sql_uri {
                config.sql_uri = uri;
            }

            let db = Database::connect(&config.sql_uri).await?;
            let report = bench::run(
                &db,
                &config.queue,
                BenchmarkConfig {
                    rounds,
                    timeout: Duration::from_secs(timeout_secs),
                },
            )
            .await?;

            if !report.passed() {
                bail!("benchmark failed {} checks", report.mismatches.len());
            }
        }
    }

    Ok(())
}

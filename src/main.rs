use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod classify;
mod config;
mod db;
mod decode;
mod llm;
mod merge;
mod models;
mod normalize;
mod pipeline;
mod storage;
mod synth;
mod training;

use config::{CompletionArgs, DatabaseArgs, StorageArgs};

#[derive(Parser)]
#[command(name = "shop-boost-profile")]
#[command(about = "Shop health snapshots from repair-order history exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Import recorded work orders from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Print repair statistics for local export files
    Derive {
        #[arg(long, required = true)]
        csv: Vec<PathBuf>,
    },
    /// Build the shop health snapshot for a shop's pending intake
    Build {
        #[arg(long)]
        shop_id: Uuid,
        #[arg(long)]
        intake_id: Option<Uuid>,
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        storage: StorageArgs,
        #[command(flatten)]
        completion: CompletionArgs,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb { database } => {
            let pool = database.connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv, database } => {
            let pool = database.connect().await?;
            let inserted = db::import_work_orders(&pool, &csv).await?;
            println!("Inserted {inserted} work orders from {}.", csv.display());
        }
        Commands::Derive { csv } => {
            let mut per_file = Vec::with_capacity(csv.len());
            for path in &csv {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                per_file.push(aggregate::derive_file_stats(&storage::bytes_to_text(&bytes)));
            }
            let stats = merge::merge_all(&per_file);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Build {
            shop_id,
            intake_id,
            database,
            storage: storage_args,
            completion,
        } => {
            let pool = database.connect().await?;
            let storage_config = storage_args.config();
            let pipeline = pipeline::Pipeline::new(
                Arc::new(db::PgStore::new(pool)),
                Arc::new(storage::HttpObjectStore::new(&storage_config)),
                Arc::new(llm::OpenAiClient::new(completion.config())),
                storage_config.bucket,
            );

            let Some(snapshot) = pipeline.build_shop_boost_profile(shop_id, intake_id).await
            else {
                anyhow::bail!("no snapshot produced for shop {shop_id}; the intake was left pending");
            };
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

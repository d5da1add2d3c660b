use clap::{Parser, Subcommand};
use extractor::{rest_api_resources_with_settings, RestApiConfig};
use extractor_core::{telemetry, Settings};
use serde_json::Value;
use std::io::Write;
use std::process;
use tracing::info;

#[derive(Parser)]
#[clap(name = "extractor")]
#[clap(about = "Declarative REST API record extractor", version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one extraction and emit records as NDJSON on stdout
    Sync {
        /// Path to a JSON RestApiConfig file
        #[clap(long, env = "EXTRACTOR_CONFIG")]
        config: std::path::PathBuf,

        /// Watermark persisted by the previous run, as a JSON value
        #[clap(long, env = "EXTRACTOR_LAST_VALUE")]
        last_value: Option<String>,

        #[clap(long, env = "EXTRACTOR_TEAM_ID", default_value_t = 0)]
        team_id: u64,

        #[clap(long, env = "EXTRACTOR_JOB_ID", default_value = "local")]
        job_id: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // stderr, not tracing: the failure may predate telemetry init
        eprintln!("Fatal error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings =
        Settings::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    telemetry::init(&settings.telemetry)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            config,
            last_value,
            team_id,
            job_id,
        } => {
            let raw = std::fs::read_to_string(&config)?;
            let api_config: RestApiConfig = serde_json::from_str(&raw)?;

            let last_value = last_value
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .map_err(|e| anyhow::anyhow!("--last-value is not valid JSON: {}", e))?;

            let mut run = rest_api_resources_with_settings(
                &api_config,
                &settings.http,
                team_id,
                &job_id,
                last_value,
            )?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut count = 0u64;
            while let Some(record) = run.stream.try_next().await? {
                serde_json::to_writer(&mut out, &record)?;
                out.write_all(b"\n")?;
                count += 1;
            }
            out.flush()?;

            let watermark = run.incremental.as_ref().and_then(|inc| inc.last_value());
            info!(
                resource = %run.name,
                records = count,
                watermark = ?watermark,
                "Extraction completed"
            );
        }
    }

    telemetry::shutdown();
    Ok(())
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use wq2bq::{
    cloud::{StaticToken, TokenProvider, ACCESS_TOKEN_ENV},
    config::{load_transfer_configs, DEFAULT_GCS_FOLDER, MAX_WORKERS},
    runner::{convert_file, run_all, TransferContext},
};

#[derive(Parser)]
#[command(name = "wq2bq", version, about = "WebQuery HTML reports into BigQuery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every configured report, stage it in GCS and load it into BigQuery.
    Run {
        /// CSV with projectId,datasetId,tableId,webQueryUrl,gcsBucketName columns
        config: PathBuf,
        /// Directory the intermediate CSV files are written to
        out_dir: PathBuf,
        #[arg(long, default_value_t = MAX_WORKERS)]
        workers: usize,
        #[arg(long, env = ACCESS_TOKEN_ENV, hide_env_values = true)]
        access_token: String,
        #[arg(long, default_value = DEFAULT_GCS_FOLDER)]
        gcs_folder: String,
    },
    /// Convert a saved WebQuery HTML file to CSV.
    Convert { input: PathBuf, output: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    match Cli::parse().command {
        Command::Convert { input, output } => {
            convert_file(&input, &output)?;
        }
        Command::Run {
            config,
            out_dir,
            workers,
            access_token,
            gcs_folder,
        } => {
            // ─── 2) load configs ─────────────────────────────────────
            let configs = load_transfer_configs(&config)?;
            if configs.is_empty() {
                warn!("no transfers configured in {}", config.display());
                return Ok(());
            }
            fs::create_dir_all(&out_dir)?;
            if workers > MAX_WORKERS {
                warn!(workers, max = MAX_WORKERS, "worker count capped");
            }

            // ─── 3) run transfers ────────────────────────────────────
            let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken::new(access_token)?);
            let mut ctx = TransferContext::new(Client::new(), tokens, out_dir);
            ctx.gcs_folder = gcs_folder;

            info!("{} transfers to run", configs.len());
            let summary = run_all(Arc::new(ctx), configs, workers).await;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "all done"
            );
            if summary.failed > 0 {
                bail!("{} of {} transfers failed", summary.failed, summary.failed + summary.succeeded);
            }
        }
    }
    Ok(())
}

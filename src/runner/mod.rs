// src/runner/mod.rs

use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{sync::Semaphore, time::Instant};
use tracing::{error, info, instrument};

use crate::cloud::{BigQueryLoader, GcsUploader, LoadJob, TokenProvider};
use crate::config::{TransferConfig, CSV_FILE_PREFIX, DEFAULT_GCS_FOLDER, MAX_WORKERS};
use crate::extract::{extract_html, ExtractSummary, TableExtractor};
use crate::sink::CsvFileSink;
use crate::webquery::{RetryPolicy, WebQuery};

/// Everything a transfer needs besides its own config row.
pub struct TransferContext {
    pub client: Client,
    pub tokens: Arc<dyn TokenProvider>,
    pub storage: GcsUploader,
    pub bigquery: BigQueryLoader,
    pub out_dir: PathBuf,
    pub gcs_folder: String,
    pub retry: RetryPolicy,
}

impl TransferContext {
    /// Production endpoints, CSVs written under `out_dir`.
    pub fn new(client: Client, tokens: Arc<dyn TokenProvider>, out_dir: PathBuf) -> Self {
        Self {
            storage: GcsUploader::new(client.clone()),
            bigquery: BigQueryLoader::new(client.clone()),
            client,
            tokens,
            out_dir,
            gcs_folder: DEFAULT_GCS_FOLDER.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub report_id: Option<String>,
    pub local_file: PathBuf,
    pub rows: u64,
    pub gcs_uri: String,
    pub job_id: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Fetch one report, stage it in GCS and start its load job.
///
/// The local CSV is kept in `out_dir` after the upload.
#[instrument(level = "info", skip_all, fields(table = %config.table_id))]
pub async fn run_transfer(ctx: &TransferContext, config: &TransferConfig) -> Result<TransferOutcome> {
    let wq = WebQuery::new(&config.web_query_url)?;
    let token = ctx.tokens.access_token().context("obtaining access token")?;

    let staged = tempfile::Builder::new()
        .prefix(CSV_FILE_PREFIX)
        .suffix(".csv")
        .tempfile_in(&ctx.out_dir)
        .with_context(|| format!("creating CSV in {}", ctx.out_dir.display()))?;
    let (_, local_file) = staged
        .keep()
        .context("keeping staged CSV")?;

    let start = Instant::now();
    let summary = wq
        .fetch_to_csv(&ctx.client, &token, &local_file, ctx.retry)
        .await?;
    info!(rows = summary.rows, elapsed = ?start.elapsed(), "extracted");

    let gcs_uri = ctx
        .storage
        .upload_file(&token, &local_file, &config.gcs_bucket_name, &ctx.gcs_folder)
        .await?;

    let job = LoadJob::for_today(&config.table(), vec![gcs_uri.clone()]);
    let job_id = ctx.bigquery.submit(&token, &job).await?;

    Ok(TransferOutcome {
        report_id: wq.report_id().map(str::to_string),
        local_file,
        rows: summary.rows,
        gcs_uri,
        job_id,
    })
}

/// Run every transfer with at most `workers` in flight. A failing report is
/// logged and counted; it never stops the others.
pub async fn run_all(
    ctx: Arc<TransferContext>,
    configs: Vec<TransferConfig>,
    workers: usize,
) -> RunSummary {
    let sem = Arc::new(Semaphore::new(workers.clamp(1, MAX_WORKERS)));
    let mut handles = Vec::with_capacity(configs.len());

    for config in configs {
        let ctx = Arc::clone(&ctx);
        let sem = Arc::clone(&sem);
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await?;
            run_transfer(&ctx, &config)
                .await
                .with_context(|| format!("transfer into {}", config.table_id))
        }));
    }

    let mut summary = RunSummary::default();
    for h in handles {
        match h.await {
            Ok(Ok(outcome)) => {
                info!(
                    report = ?outcome.report_id,
                    rows = outcome.rows,
                    job = %outcome.job_id,
                    "transfer done"
                );
                summary.succeeded += 1;
            }
            Ok(Err(e)) => {
                error!("{:#}", e);
                summary.failed += 1;
            }
            Err(e) => {
                error!("transfer task panicked: {}", e);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Convert a saved WebQuery HTML file to CSV, no network involved.
pub fn convert_file(input: &Path, output: &Path) -> Result<ExtractSummary> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let summary = extract_html(
        BufReader::new(file),
        TableExtractor::new(CsvFileSink::new(output)),
    )
    .with_context(|| format!("converting {}", input.display()))?;
    info!(rows = summary.rows, path = %output.display(), "converted");
    Ok(summary)
}

// src/webquery/mod.rs

use anyhow::{Context, Result};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::extract::{ExtractError, ExtractSummary, HtmlTableStream, TableExtractor};
use crate::sink::CsvFileSink;

static REPORT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"rid=(\d+)").expect("report id pattern is valid"));

/// Body chunks buffered between the download and the extractor.
const CHUNK_QUEUE: usize = 32;

/// Backoff for the initial WebQuery request. Nothing is retried once the body
/// has started streaming.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// A WebQuery report, identified by its access URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebQuery {
    url: Url,
    report_id: Option<String>,
}

impl WebQuery {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).with_context(|| format!("parsing WebQuery URL {}", url))?;
        Ok(Self {
            report_id: extract_report_id(url),
            url: parsed,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Numeric `rid=` parameter of the URL. Only used to label logs.
    pub fn report_id(&self) -> Option<&str> {
        self.report_id.as_deref()
    }

    /// Download the report and stream it straight into a CSV at `out`.
    ///
    /// The body is tokenized on a blocking thread as chunks arrive.
    #[instrument(level = "info", skip_all, fields(report = ?self.report_id))]
    pub async fn fetch_to_csv(
        &self,
        client: &Client,
        token: &str,
        out: &Path,
        retry: RetryPolicy,
    ) -> Result<ExtractSummary> {
        let resp = send_with_retry(client, &self.url, token, retry).await?;

        let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(CHUNK_QUEUE);
        let out_path = out.to_path_buf();
        let worker = tokio::task::spawn_blocking(move || extract_chunks(rx, out_path));

        let mut body = resp.bytes_stream();
        let mut received = 0usize;
        while let Some(chunk) = body.next().await {
            let item = chunk.map(|b| b.to_vec()).map_err(io::Error::other);
            let failed = item.is_err();
            if let Ok(bytes) = &item {
                received += bytes.len();
            }
            // the extractor hung up early: its error is reported below
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
        drop(tx);
        debug!(bytes = received, "download finished");

        let summary = worker
            .await
            .context("extraction task panicked")?
            .with_context(|| format!("extracting {}", self.url))?;
        info!(rows = summary.rows, path = %out.display(), "report written");
        Ok(summary)
    }
}

fn extract_report_id(url: &str) -> Option<String> {
    REPORT_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_chunks(
    mut rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    out: PathBuf,
) -> Result<ExtractSummary, ExtractError> {
    let mut stream = HtmlTableStream::new(TableExtractor::new(CsvFileSink::new(out)));
    while let Some(chunk) = rx.blocking_recv() {
        match chunk {
            Ok(bytes) => stream.feed(&bytes)?,
            Err(e) => return Err(stream.abort(ExtractError::Read(e))),
        }
    }
    stream.finish()
}

async fn send_core(client: &Client, url: &Url, token: &str) -> Result<Response> {
    client
        .get(url.clone())
        .bearer_auth(token)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))
}

/// Client errors other than 429 will not get better by asking again.
fn is_retryable(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<reqwest::Error>().and_then(|e| e.status()) {
        Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        None => true,
    }
}

async fn send_with_retry(
    client: &Client,
    url: &Url,
    token: &str,
    retry: RetryPolicy,
) -> Result<Response> {
    let mut attempts = 0;
    loop {
        match send_core(client, url, token).await {
            Ok(resp) => return Ok(resp),
            Err(e) if attempts < retry.max_retries && is_retryable(&e) => {
                attempts += 1;
                let backoff = retry.initial_backoff * 2u32.pow(attempts - 1);
                warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %e, "Retrying");
                sleep(backoff).await;
            }
            Err(e) => {
                error!(%url, error = %e, "giving up on WebQuery request");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{serve, Canned};
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    const HTML: &str = "<table><colgroup><col class=\"integral\"></colgroup>\
        <thead><tr><th>Clicks!!</th></tr></thead>\
        <tbody><tr><td>1,234</td></tr><tr><td></td></tr></tbody></table>";

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_report_id() {
        let wq = WebQuery::new("https://searchads.example.com/wq?ay=1&rid=98765&x=2").unwrap();
        assert_eq!(wq.report_id(), Some("98765"));

        let wq = WebQuery::new("https://searchads.example.com/wq?ay=1").unwrap();
        assert_eq!(wq.report_id(), None);

        assert!(WebQuery::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_fetch_to_csv() -> Result<()> {
        let (base, server) = serve(vec![Canned::ok("text/html", HTML)]).await;
        let wq = WebQuery::new(base.join("wq?rid=7")?.as_str())?;
        let tmp = tempdir()?;
        let out = tmp.path().join("report.csv");

        let summary = wq
            .fetch_to_csv(&Client::new(), "secret-token", &out, fast_retry())
            .await?;

        let requests = server.await?;
        assert!(requests[0].starts_with("GET /wq?rid=7 "));
        assert!(requests[0]
            .to_ascii_lowercase()
            .contains("authorization: bearer secret-token"));

        let ts = &summary.processing_timestamp;
        assert_eq!(summary.rows, 2);
        assert_eq!(
            fs::read_to_string(&out)?,
            format!("clicks_,reporting_date\r\n\"1,234\",{ts}\r\n,{ts}\r\n")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_retries_server_errors() -> Result<()> {
        let (base, server) = serve(vec![
            Canned::status(503),
            Canned::ok("text/html", HTML),
        ])
        .await;
        let wq = WebQuery::new(base.join("wq?rid=8")?.as_str())?;
        let tmp = tempdir()?;

        let summary = wq
            .fetch_to_csv(&Client::new(), "t", &tmp.path().join("r.csv"), fast_retry())
            .await?;
        assert_eq!(summary.rows, 2);
        assert_eq!(server.await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() -> Result<()> {
        let (base, server) = serve(vec![Canned::status(401)]).await;
        let wq = WebQuery::new(base.join("wq")?.as_str())?;
        let tmp = tempdir()?;

        let err = wq
            .fetch_to_csv(&Client::new(), "bad", &tmp.path().join("r.csv"), fast_retry())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Non-success status"));
        assert_eq!(server.await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_table_fails() -> Result<()> {
        let html = "<table><thead><tr><th>A</th></tr></thead>\
                    <tbody><tr><td>1</td><td>2</td></tr></tbody></table>";
        let (base, _server) = serve(vec![Canned::ok("text/html", html)]).await;
        let wq = WebQuery::new(base.as_str())?;
        let tmp = tempdir()?;

        let err = wq
            .fetch_to_csv(&Client::new(), "t", &tmp.path().join("r.csv"), fast_retry())
            .await
            .unwrap_err();
        assert!(err
            .chain()
            .any(|e| e.downcast_ref::<ExtractError>().is_some()));
        Ok(())
    }
}

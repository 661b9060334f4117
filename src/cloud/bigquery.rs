// src/cloud/bigquery.rs

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config::BigQueryTable;

const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/";

/// Load-job request body for `jobs.insert`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadJob {
    pub configuration: JobConfiguration,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub load: LoadConfiguration,
}

/// Schema is auto-detected from the CSV; inferred column types are not sent.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadConfiguration {
    pub destination_table: BigQueryTable,
    pub write_disposition: String,
    pub autodetect: bool,
    pub skip_leading_rows: u32,
    pub source_format: String,
    pub source_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JobResource {
    id: String,
}

/// `<base>_<YYYYMMDD>`, the daily table a report is loaded into.
pub fn dated_table_id(base: &str, date: NaiveDate) -> String {
    format!("{}_{}", base, date.format("%Y%m%d"))
}

impl LoadJob {
    /// Load `source_uris` (first file carries the header) into today's (UTC) table.
    pub fn for_today(table: &BigQueryTable, source_uris: Vec<String>) -> Self {
        Self::for_date(table, source_uris, Utc::now().date_naive())
    }

    pub fn for_date(table: &BigQueryTable, source_uris: Vec<String>, date: NaiveDate) -> Self {
        LoadJob {
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    destination_table: BigQueryTable {
                        table_id: dated_table_id(&table.table_id, date),
                        ..table.clone()
                    },
                    write_disposition: "WRITE_TRUNCATE".into(),
                    autodetect: true,
                    skip_leading_rows: 1,
                    source_format: "CSV".into(),
                    source_uris,
                },
            },
        }
    }
}

/// Submits load jobs through the BigQuery REST API.
#[derive(Clone, Debug)]
pub struct BigQueryLoader {
    client: Client,
    endpoint: Url,
}

impl BigQueryLoader {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(
            client,
            Url::parse(BIGQUERY_ENDPOINT).expect("bigquery endpoint is valid"),
        )
    }

    pub fn with_endpoint(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    fn jobs_url(&self, project_id: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("bigquery endpoint {} cannot be a base", self.endpoint))?
            .pop_if_empty()
            .extend(["bigquery", "v2", "projects", project_id, "jobs"]);
        Ok(url)
    }

    /// Insert the job and return its id. Completion is not awaited.
    pub async fn submit(&self, token: &str, job: &LoadJob) -> Result<String> {
        let table = &job.configuration.load.destination_table;
        let url = self.jobs_url(&table.project_id)?;

        let created: JobResource = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(job)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| {
                format!(
                    "submitting load job into {}.{}.{}",
                    table.project_id, table.dataset_id, table.table_id
                )
            })?
            .json()
            .await
            .context("decoding job resource")?;

        info!(job = %created.id, table = %table.table_id, "load job submitted");
        Ok(created.id)
    }
}

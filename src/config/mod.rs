// src/config/mod.rs

use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Read, path::Path};

/// Prefix of the local CSV files written for each report.
pub const CSV_FILE_PREFIX: &str = "dswq_";

/// Default number of reports transferred concurrently.
pub const MAX_WORKERS: usize = 10;

/// Object-store folder the CSV files are uploaded into.
pub const DEFAULT_GCS_FOLDER: &str = "tmp";

/// Destination table of one transfer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BigQueryTable {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

/// One row of the job-configuration list.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub web_query_url: String,
    pub gcs_bucket_name: String,
}

impl TransferConfig {
    pub fn table(&self) -> BigQueryTable {
        BigQueryTable {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            table_id: self.table_id.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("projectId", &self.project_id),
            ("datasetId", &self.dataset_id),
            ("tableId", &self.table_id),
            ("webQueryUrl", &self.web_query_url),
            ("gcsBucketName", &self.gcs_bucket_name),
        ];
        match fields.iter().find(|(_, v)| v.trim().is_empty()) {
            Some((name, _)) => Err(anyhow!("empty {}", name)),
            None => Ok(()),
        }
    }
}

/// Read transfer configurations from a CSV file with a header row
/// (`projectId,datasetId,tableId,webQueryUrl,gcsBucketName`; extra columns ignored).
pub fn load_transfer_configs<P: AsRef<Path>>(path: P) -> Result<Vec<TransferConfig>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open config file: {}", path.display()))?;
    read_transfer_configs(file).with_context(|| format!("parsing {}", path.display()))
}

pub fn read_transfer_configs<R: Read>(reader: R) -> Result<Vec<TransferConfig>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut configs = Vec::new();
    for (idx, result) in rdr.deserialize::<TransferConfig>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let config = result.with_context(|| format!("invalid config at line {}", line))?;
        config
            .validate()
            .with_context(|| format!("invalid config at line {}", line))?;
        configs.push(config);
    }
    Ok(configs)
}

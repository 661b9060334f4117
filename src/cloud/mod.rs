// src/cloud/mod.rs

mod auth;
mod bigquery;
mod gcs;

pub use auth::{StaticToken, TokenProvider, ACCESS_TOKEN_ENV};
pub use bigquery::{dated_table_id, BigQueryLoader, JobConfiguration, LoadConfiguration, LoadJob};
pub use gcs::GcsUploader;

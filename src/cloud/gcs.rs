// src/cloud/gcs.rs

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::info;
use url::Url;

const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com/";

#[derive(Debug, Deserialize)]
struct ObjectResource {
    bucket: String,
    name: String,
}

/// Uploads local files to Google Cloud Storage through the JSON API.
#[derive(Clone, Debug)]
pub struct GcsUploader {
    client: Client,
    endpoint: Url,
}

impl GcsUploader {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(
            client,
            Url::parse(STORAGE_ENDPOINT).expect("storage endpoint is valid"),
        )
    }

    pub fn with_endpoint(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    fn upload_url(&self, bucket: &str, object: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("storage endpoint {} cannot be a base", self.endpoint))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);
        Ok(url)
    }

    /// Upload `file` to `gs://<bucket>/<folder>/<file name>` as `text/csv`.
    /// Returns the `gs://` URI of the stored object.
    pub async fn upload_file(
        &self,
        token: &str,
        file: &Path,
        bucket: &str,
        folder: &str,
    ) -> Result<String> {
        if bucket.trim().is_empty() {
            return Err(anyhow!("empty bucket name"));
        }
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("no file name in {}", file.display()))?;
        let object = format!("{}/{}", folder.trim_end_matches('/'), file_name);

        let data = fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let url = self.upload_url(bucket, &object)?;

        let stored: ObjectResource = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(data)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to upload {} to GCS bucket {}", object, bucket))?
            .json()
            .await
            .context("decoding GCS object resource")?;

        let uri = format!("gs://{}/{}", stored.bucket, stored.name);
        info!(uri = %uri, "uploaded");
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{serve, Canned};
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_upload_url() {
        let gcs = GcsUploader::new(Client::new());
        let url = gcs.upload_url("my-bucket", "tmp/dswq_1.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/my-bucket/o?uploadType=media&name=tmp%2Fdswq_1.csv"
        );
    }

    #[tokio::test]
    async fn test_upload_file() -> Result<()> {
        let (base, server) = serve(vec![Canned::ok(
            "application/json",
            r#"{"bucket":"my-bucket","name":"tmp/report.csv","size":"9"}"#,
        )])
        .await;
        let mut file = NamedTempFile::new()?;
        file.write_all(b"a,b\r\n1,2\r\n")?;

        let gcs = GcsUploader::with_endpoint(Client::new(), base);
        let uri = gcs
            .upload_file("tok", file.path(), "my-bucket", "tmp/")
            .await?;
        assert_eq!(uri, "gs://my-bucket/tmp/report.csv");

        let req = &server.await?[0];
        assert!(req.starts_with("POST /upload/storage/v1/b/my-bucket/o?uploadType=media&name=tmp%2F"));
        assert!(req.to_ascii_lowercase().contains("content-type: text/csv"));
        assert!(req.ends_with("a,b\r\n1,2\r\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_bucket_rejected() {
        let gcs = GcsUploader::new(Client::new());
        assert!(gcs
            .upload_file("tok", Path::new("x.csv"), " ", "tmp")
            .await
            .is_err());
    }
}

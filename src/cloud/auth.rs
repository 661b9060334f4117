// src/cloud/auth.rs

use anyhow::{bail, Result};

/// Environment variable the CLI reads the access token from.
pub const ACCESS_TOKEN_ENV: &str = "WQ2BQ_ACCESS_TOKEN";

/// Supplies OAuth bearer tokens for the WebQuery, storage and warehouse APIs.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

/// A token obtained out of band (e.g. `gcloud auth print-access-token`).
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            bail!("access token is empty");
        }
        Ok(Self(token))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

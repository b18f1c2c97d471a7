//! Authenticated remote session, built once at start-up and lent to every
//! component that talks to a remote service.
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("glacier-extract/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize)]
struct TokenFile {
    #[serde(alias = "token")]
    access_token: String,
}

pub struct Session {
    http: Client,
    access_token: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::Auth("empty access token".to_string()));
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, access_token })
    }

    /// Load an OAuth token cache (`{"access_token": "..."}`). Any failure to
    /// read it is an authentication failure.
    pub fn from_token_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Auth(format!("cannot read token file {}: {e}", path.display())))?;
        let token: TokenFile = serde_json::from_str(&content)
            .map_err(|e| Error::Auth(format!("invalid token file {}: {e}", path.display())))?;
        Self::new(token.access_token)
    }

    pub fn http(self: &Self) -> &Client {
        &self.http
    }

    pub fn authorized(self: &Self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.access_token)
    }
}

/// Pass successful responses through; turn the rest into classified errors.
pub async fn check_status(context: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::from_status(context, status.as_u16(), &body))
}

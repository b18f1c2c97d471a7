//! Utility functions for creating s3 clients and reading whole objects
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use regex::Regex;

use crate::error::{Error, Result};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, PartialEq)]
pub struct S3Object {
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl S3Object {
    /// Parse either `s3://bucket/key` or a virtual-hosted
    /// `https://bucket.s3.region.amazonaws.com/key` url.
    pub fn from_url(url: &str) -> Result<Self> {
        let s3_uri = Regex::new(r"^s3://(?<bucket>[^/]+)/(?<key>.+)$")
            .expect("Regex pattern should always compile");
        if let Some(captures) = s3_uri.captures(url) {
            let (_, [bucket, key]) = captures.extract();
            return Ok(Self {
                region: None,
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let https = Regex::new(
            r"^https://(?<bucket>[\w.-]+)\.s3\.(?<region>[\w-]+)\.amazonaws\.com/(?<key>.+)$",
        )
        .expect("Regex pattern should always compile");
        let captures = https
            .captures(url)
            .ok_or(Error::config(format!("Not an S3 url: {url}")))?;
        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            region: Some(region.to_string()),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Region to build a client for: the one named by the url, otherwise
    /// `fallback`.
    pub fn client_region<'a>(self: &'a Self, fallback: Option<&'a str>) -> Option<&'a str> {
        self.region.as_deref().or(fallback)
    }

    pub fn is_s3_url(url: &str) -> bool {
        url.starts_with("s3://") || Self::from_url(url).is_ok()
    }
}

pub trait S3Reader {
    async fn read_object(self: &Self, object: &S3Object) -> Result<Vec<u8>>;
}

pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_profile(profile_name: &str, region: Option<&str>) -> Self {
        Self::new(client_from_profile(profile_name, region).await)
    }

    pub async fn anonymous(region: Option<&str>) -> Self {
        Self::new(anon_client(region).await)
    }
}

impl S3Reader for S3Store {
    async fn read_object(self: &Self, object: &S3Object) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| Error::S3(format!("get s3://{}/{}: {e}", object.bucket, object.key)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::S3(e.to_string()))?
            .to_vec();
        Ok(data)
    }
}

pub async fn client_from_profile(profile_name: &str, region: Option<&str>) -> Client {
    let base_config = aws_config::from_env()
        .profile_name(profile_name)
        .load()
        .await;

    let region = region.unwrap_or(DEFAULT_REGION).to_string();
    let s3_config = aws_sdk_s3::config::Builder::from(&base_config)
        .region(Region::new(region))
        .force_path_style(true)
        .build();

    Client::from_conf(s3_config)
}

pub async fn anon_client(region: Option<&str>) -> Client {
    let region = Region::new(region.unwrap_or(DEFAULT_REGION).to_string());
    let config = aws_config::defaults(BehaviorVersion::latest())
        .no_credentials()
        .region(region)
        .load()
        .await;
    Client::new(&config)
}

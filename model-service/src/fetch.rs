//! Resolution of trigger inputs into the bytes the backend runs inference on.

use std::time::Duration;

use anyhow::Context;
use axum::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::debug;

use crate::{
    api_types::TriggerInput,
    error::{Result, ServiceError},
};

#[async_trait]
pub trait InputFetcher {
    /// Bytes of one input. Every failure is an InvalidArgument naming the input.
    async fn fetch(&self, input: &TriggerInput) -> Result<Vec<u8>>;
}

/// Resolve every input in order, rejecting an empty batch.
pub async fn fetch_all(
    fetcher: &(dyn InputFetcher + Send + Sync),
    inputs: &[TriggerInput],
) -> Result<Vec<Vec<u8>>> {
    if inputs.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "inputs must not be empty".to_owned(),
        ));
    }

    let mut resolved = Vec::with_capacity(inputs.len());
    for input in inputs {
        resolved.push(fetcher.fetch(input).await?);
    }

    Ok(resolved)
}

/// Decode an inline base64 input, tolerating a `data:` URL prefix.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid image_base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "image_base64 is empty".to_owned(),
        ));
    }

    Ok(bytes)
}

/// [InputFetcher] that downloads `image_url` inputs over HTTP, refusing bodies over `max_bytes`.
pub struct HttpInputFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpInputFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build input fetch client")?;

        Ok(HttpInputFetcher { client, max_bytes })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let invalid = |reason: String| {
            ServiceError::InvalidArgument(format!("unable to fetch image_url {}: {}", url, reason))
        };

        debug!("fetching input {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| invalid(e.to_string()))?;

        if !response.status().is_success() {
            return Err(invalid(response.status().to_string()));
        }

        let too_large = || invalid(format!("body exceeds {} bytes", self.max_bytes));
        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(too_large());
            }
        }

        // Content-Length may be absent or wrong, so the limit is enforced while streaming too.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| invalid(e.to_string()))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        if body.is_empty() {
            return Err(invalid("empty body".to_owned()));
        }

        Ok(body)
    }
}

#[async_trait]
impl InputFetcher for HttpInputFetcher {
    async fn fetch(&self, input: &TriggerInput) -> Result<Vec<u8>> {
        match (&input.image_url, &input.image_base64) {
            (Some(url), None) => self.download(url).await,
            (None, Some(encoded)) => decode_base64(encoded),
            (None, None) => Err(ServiceError::InvalidArgument(
                "input must set image_url or image_base64".to_owned(),
            )),
            (Some(_), Some(_)) => Err(ServiceError::InvalidArgument(
                "input must set only one of image_url and image_base64".to_owned(),
            )),
        }
    }
}

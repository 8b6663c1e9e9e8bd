//! File upload collaborator
//!
//! Files are pushed to the content-push service before the turn is sent;
//! the service answers with an opaque reference that the generate payload
//! embeds next to the file name.

use super::{MAX_REDIRECTS, TransportOptions, build_http_client};
use crate::constants::{UPLOAD_URL, upload_headers};
use crate::error::{GeminiError, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::path::Path;

#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Upload `path` and return the server side reference.
    async fn upload(&self, path: &Path) -> Result<String>;
}

/// Check that `path` is a regular file and return its file name.
pub async fn validate_file(path: &Path) -> Result<String> {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    let name = path.file_name().and_then(|n| n.to_str());
    match (is_file, name) {
        (true, Some(name)) => Ok(name.to_string()),
        _ => Err(GeminiError::InvalidInput(format!(
            "{} is not a valid file.",
            path.display()
        ))),
    }
}

pub struct ReqwestUploader {
    client: Client,
}

impl ReqwestUploader {
    pub fn new(options: &TransportOptions) -> Result<Self> {
        Ok(Self {
            client: build_http_client(options, reqwest::redirect::Policy::limited(MAX_REDIRECTS))?,
        })
    }
}

#[async_trait]
impl FileUploader for ReqwestUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        let file_name = validate_file(path).await?;
        let bytes = tokio::fs::read(path).await?;
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.clone()));

        let mut request = self.client.post(UPLOAD_URL).multipart(form);
        for (k, v) in upload_headers() {
            request = request.header(k, v);
        }
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeminiError::Timeout(format!("Upload of {file_name} timed out."))
            } else {
                GeminiError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(GeminiError::Api(format!(
                "Upload failed with status {}",
                status.as_u16()
            )));
        }
        let reference = resp
            .text()
            .await
            .map_err(|e| GeminiError::Transport(e.to_string()))?;
        tracing::debug!(file = %file_name, "File uploaded");
        Ok(reference)
    }
}

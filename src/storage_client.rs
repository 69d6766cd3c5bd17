use bytes::Bytes;
use futures::Stream;

use crate::config::Config;
use crate::error::AppError;

/// Thin HTTP wrapper around the internal storage worker. The worker owns
/// the actual bytes on disk (bucket = directory, file = path within it);
/// this gateway owns the `buckets`/`files` registry rows in Postgres and
/// only calls out here to keep the worker's directory tree in sync.
pub struct StorageClient<'a> {
    client: &'a reqwest::Client,
    base_url: String,
    host: String,
    port: u16,
}

impl<'a> StorageClient<'a> {
    pub fn new(client: &'a reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.storage_base_url(),
            host: config.storage_host.clone(),
            port: config.storage_internal_port,
        }
    }

    pub async fn create_bucket(&self, name: &str, public: bool) -> Result<(), AppError> {
        let resp = self
            .client
            .post(format!("{}/buckets", self.base_url))
            .json(&serde_json::json!({ "name": name, "public": public }))
            .send()
            .await?;
        ensure_success(resp).await
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), AppError> {
        let resp = self.client.delete(format!("{}/buckets/{name}", self.base_url)).send().await?;
        ensure_success(resp).await
    }

    /// Streams a file body straight through to the worker without
    /// buffering it in memory, per the streaming-proxy contract.
    pub async fn upload_file_streaming<S, E>(
        &self,
        bucket: &str,
        path: &str,
        stream: S,
        filename: &str,
        content_type: &str,
        content_length: Option<u64>,
    ) -> Result<serde_json::Value, AppError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Sync + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let mut req = self
            .client
            .post(format!("{}/files/{bucket}/{path}", self.base_url))
            .header("Content-Type", content_type)
            .header("X-Filename", filename)
            .body(reqwest::Body::wrap_stream(stream));

        if let Some(len) = content_length {
            req = req.header("Content-Length", len.to_string());
        }

        let resp = req.send().await?;
        let resp = ensure_success_response(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn download_file(&self, bucket: &str, path: &str) -> Result<reqwest::Response, AppError> {
        let resp = self
            .client
            .get(format!("{}/files/{bucket}/{path}", self.base_url))
            .send()
            .await?;
        ensure_success_response(resp).await
    }

    pub async fn delete_file(&self, bucket: &str, path: &str) -> Result<(), AppError> {
        let resp = self.client.delete(format!("{}/files/{bucket}/{path}", self.base_url)).send().await?;
        // Deletes are idempotent at the worker; a 404 here just means the
        // blob is already gone, which is not a failure for our callers.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp).await
    }

    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("http://{}:{}/health", self.host, self.port))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<(), AppError> {
    ensure_success_response(resp).await.map(|_| ())
}

async fn ensure_success_response(resp: reqwest::Response) -> Result<reqwest::Response, AppError> {
    if resp.status().is_success() {
        Ok(resp)
    } else if resp.status() == reqwest::StatusCode::NOT_FOUND {
        Err(AppError::NotFound("object not found in storage worker".into()))
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(AppError::Unavailable(format!("storage worker returned {status}: {body}")))
    }
}

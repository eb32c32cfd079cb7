use anyhow::Context;
use serde_json::Value;

use medley_core::MediaAsset;

/// Guess a MIME type from a file extension. Unknown extensions fall back to
/// `application/octet-stream`, which the queue treats as an image.
pub fn guess_content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Thin client for the Medley HTTP API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Reads MEDLEY_API_URL (default http://localhost:3100).
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("MEDLEY_API_URL")
            .unwrap_or_else(|_| "http://localhost:3100".to_string());
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn register_asset(&self, asset: &MediaAsset) -> anyhow::Result<MediaAsset> {
        let response = self
            .client
            .post(format!("{}/assets", self.base_url))
            .json(asset)
            .send()
            .await
            .context("POST /assets")?;
        Self::parse(response).await
    }

    pub async fn list_assets(&self) -> anyhow::Result<Vec<MediaAsset>> {
        let response = self
            .client
            .get(format!("{}/assets", self.base_url))
            .send()
            .await
            .context("GET /assets")?;
        Self::parse(response).await
    }

    pub async fn get_asset(&self, id: &str) -> anyhow::Result<MediaAsset> {
        let response = self
            .client
            .get(format!("{}/assets/{id}", self.base_url))
            .send()
            .await
            .context("GET /assets/{id}")?;
        Self::parse(response).await
    }

    pub async fn bulk(&self, body: &Value) -> anyhow::Result<Value> {
        let response = self
            .client
            .post(format!("{}/bulk", self.base_url))
            .json(body)
            .send()
            .await
            .context("POST /bulk")?;
        Self::parse(response).await
    }

    pub async fn add_usage(&self, id: &str, reference: &str) -> anyhow::Result<Vec<String>> {
        let response = self
            .client
            .post(format!("{}/assets/{id}/usage", self.base_url))
            .json(&serde_json::json!({ "reference": reference }))
            .send()
            .await
            .context("POST /assets/{id}/usage")?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> anyhow::Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error {status}: {body}");
        }
        response.json().await.context("Decode API response")
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

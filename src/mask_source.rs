use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::MaskServiceConfig;
use crate::error::{MockupError, Result};
use crate::mask;

/// Something that can produce a mask for a photo when the caller sent none.
/// Returns the encoded mask image; the compositor decodes it like any upload.
pub trait MaskSource: Send + Sync {
    fn resolve<'a>(&'a self, image: &'a [u8], prompt: Option<&'a str>) -> BoxFuture<'a, Result<Vec<u8>>>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: String,
    urls: Option<PredictionUrls>,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

/// Client for a prediction-style segmentation API: create a job, poll it
/// until it settles, then download the mask it points at.
pub struct SegmentationService {
    client: reqwest::Client,
    config: MaskServiceConfig,
    cancel: CancellationToken,
}

impl SegmentationService {
    pub fn new(config: MaskServiceConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            config,
            cancel,
        })
    }

    async fn segment(&self, image: &[u8], prompt: &str) -> Result<Vec<u8>> {
        let prediction = self.create_prediction(image, prompt).await?;
        tracing::info!("Mask prediction {} created for '{}'", prediction.id, prompt);
        let mask_url = self.wait_for_output(prediction).await?;
        tracing::debug!("Downloading mask from {}", mask_url);
        self.download(&mask_url).await
    }

    async fn create_prediction(&self, image: &[u8], prompt: &str) -> Result<Prediction> {
        let format = image::guess_format(image).map_err(|e| MockupError::Decode(e.to_string()))?;
        let kind = format
            .to_mime_type()
            .strip_prefix("image/")
            .unwrap_or("png");
        let body = json!({
            "version": self.config.model_version,
            "input": {
                "image": mask::to_data_url(kind, image),
                "prompt": prompt,
            },
        });
        let url = format!("{}/predictions", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.config.api_token))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MockupError::MaskService(format!("create prediction: {}", e)))?;
        response
            .json()
            .await
            .map_err(|e| MockupError::MaskService(format!("create prediction: {}", e)))
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Prediction> {
        self.client
            .get(url)
            .header("Authorization", format!("Token {}", self.config.api_token))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MockupError::MaskService(format!("poll prediction: {}", e)))?
            .json()
            .await
            .map_err(|e| MockupError::MaskService(format!("poll prediction: {}", e)))
    }

    async fn wait_for_output(&self, mut prediction: Prediction) -> Result<String> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let poll_url = prediction
            .urls
            .as_ref()
            .map(|u| u.get.clone())
            .ok_or_else(|| MockupError::MaskService("prediction has no poll URL".to_string()))?;

        for attempt in 1..=self.config.max_polls {
            match prediction.status.as_str() {
                "succeeded" => {
                    return output_url(&prediction.output).ok_or_else(|| {
                        MockupError::MaskService("prediction succeeded without an output URL".to_string())
                    });
                }
                "failed" | "canceled" => {
                    return Err(MockupError::MaskService(format!(
                        "prediction {} {}: {}",
                        prediction.id, prediction.status, prediction.error
                    )));
                }
                status => tracing::debug!(
                    "Prediction {} is {} (poll {}/{})",
                    prediction.id,
                    status,
                    attempt,
                    self.config.max_polls
                ),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(MockupError::MaskService("cancelled while waiting for mask".to_string()));
                }
                _ = tokio::time::sleep(interval) => {}
            }
            prediction = self.fetch_prediction(&poll_url).await?;
        }

        Err(MockupError::MaskService(format!(
            "no mask after {} polls",
            self.config.max_polls
        )))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MockupError::MaskService(format!("download mask: {}", e)))?
            .bytes()
            .await
            .map_err(|e| MockupError::MaskService(format!("download mask: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

impl MaskSource for SegmentationService {
    fn resolve<'a>(&'a self, image: &'a [u8], prompt: Option<&'a str>) -> BoxFuture<'a, Result<Vec<u8>>> {
        let prompt = prompt.unwrap_or(self.config.prompt.as_str());
        Box::pin(self.segment(image, prompt))
    }
}

/// Models answer with either a single URL or a list whose last entry is the mask.
fn output_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().rev().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
}

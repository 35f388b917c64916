use crate::models::book::{Book, Tag};
use crate::models::responses::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, FileUploadResponse,
};
use crate::services::prompt::{build_prompt, build_vocabulary_prompt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("could not send request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("remote API responded with status {status}: {body}")]
    Remote { status: StatusCode, body: String },
    #[error("unexpected response from remote API: {0}")]
    Protocol(String),
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Extra attempts after the first one for transport errors, 429 and 5xx.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

pub struct EnrichmentClient {
    client: Client,
    api_key: String,
    settings: EnrichmentSettings,
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl EnrichmentClient {
    pub fn new(api_key: impl Into<String>, settings: EnrichmentSettings) -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(EnrichmentError::Transport)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            settings,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn ensure_api_key(&self) -> Result<(), EnrichmentError> {
        if self.api_key.trim().is_empty() {
            return Err(EnrichmentError::Config("API key is empty".to_string()));
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Sends the request built by `build`, retrying transient failures, and
    /// returns the body of the first successful response.
    async fn send_with_retry<F>(&self, build: F) -> Result<String, EnrichmentError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let can_retry = attempt <= self.settings.max_retries;

            let response = match build().bearer_auth(&self.api_key).send().await {
                Ok(response) => response,
                Err(e) if can_retry => {
                    let delay = self.backoff(attempt);
                    warn!(attempt = attempt, "Request failed: {}, retrying in {:?}", e, delay);
                    sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(EnrichmentError::Transport(e)),
            };

            let status = response.status();
            let body = response.text().await.map_err(EnrichmentError::Transport)?;

            if status.is_success() {
                return Ok(body);
            }
            if is_retryable(status) && can_retry {
                let delay = self.backoff(attempt);
                warn!(attempt = attempt, "Remote API responded with {}, retrying in {:?}", status, delay);
                sleep(delay).await;
                continue;
            }
            return Err(EnrichmentError::Remote { status, body });
        }
    }

    /// Asks the model for tags and returns its answer verbatim. With `tags`
    /// the vocabulary-constrained prompt is used.
    pub async fn enrich(&self, books: &[Book], tags: Option<&[Tag]>) -> Result<String, EnrichmentError> {
        self.ensure_api_key()?;

        let prompt = match tags {
            Some(tags) => build_vocabulary_prompt(books, tags),
            None => build_prompt(books),
        };
        debug!("Prompt is {} bytes", prompt.len());

        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };
        let url = self.endpoint("chat/completions");

        info!("Requesting tags for {} books from {}", books.len(), self.settings.model);
        let body = self
            .send_with_retry(|| self.client.post(&url).json(&request))
            .await?;

        extract_content(&body)
    }

    /// Uploads a file to the remote API's file store. Only HTTP 200 counts as
    /// success and the request is never retried.
    pub async fn upload_file(&self, path: &Path, purpose: &str) -> Result<FileUploadResponse, EnrichmentError> {
        self.ensure_api_key()?;

        let bytes = tokio::fs::read(path).await.map_err(|source| EnrichmentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let url = self.endpoint("files");

        info!("Uploading {} ({} bytes)", path.display(), bytes.len());
        let part = Part::bytes(bytes).file_name(file_name);
        let form = Form::new()
            .part("file", part)
            .text("purpose", purpose.to_string());

        // Sent once: a retried upload could store the file twice.
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(EnrichmentError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(EnrichmentError::Transport)?;
        if status != StatusCode::OK {
            return Err(EnrichmentError::Remote { status, body });
        }

        let uploaded: FileUploadResponse = serde_json::from_str(&body)
            .map_err(|e| EnrichmentError::Protocol(format!("could not parse upload response: {}", e)))?;
        info!("File uploaded successfully");
        Ok(uploaded)
    }
}

/// Pulls `choices[0].message.content` out of a chat completion envelope.
pub fn extract_content(body: &str) -> Result<String, EnrichmentError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| EnrichmentError::Protocol(format!("could not parse response: {}", e)))?;

    let choice = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| EnrichmentError::Protocol(format!("response does not contain choices: {}", body)))?;

    choice
        .message
        .and_then(|message| message.content)
        .ok_or_else(|| EnrichmentError::Protocol("first choice has no message content".to_string()))
}

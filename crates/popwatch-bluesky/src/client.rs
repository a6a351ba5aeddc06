use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use popwatch_core::{PostDraft, PublishError, Publisher};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::error::BlueskyError;
use crate::facets::detect_facets;
use crate::retry::{is_retriable, retry_with_backoff, DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_ATTEMPTS};
use crate::types::{
    CreateRecordRequest, CreateRecordResponse, CreateSessionRequest, EmbeddedImage, PostRecord,
    Session, UploadBlobResponse, XrpcErrorBody, POST_COLLECTION,
};

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
const UPLOAD_BLOB: &str = "com.atproto.repo.uploadBlob";
const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

/// Client for the AT Protocol XRPC endpoints a posting bot needs.
///
/// [`login`](Self::login) must succeed before anything else is called. The
/// session is refreshed once, transparently, when the server reports
/// `ExpiredToken`.
pub struct BlueskyClient {
    client: Client,
    base_url: Url,
    session: RwLock<Option<Session>>,
    max_attempts: u32,
    backoff_base_ms: u64,
}

impl BlueskyClient {
    /// Creates a client for the PDS at `service_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BlueskyError::InvalidUrl`] if `service_url` does not parse,
    /// or [`BlueskyError::Http`] if the HTTP client cannot be built.
    pub fn new(service_url: &str, timeout_secs: u64) -> Result<Self, BlueskyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("popwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let normalized = format!("{}/", service_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| BlueskyError::InvalidUrl {
            url: service_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            session: RwLock::new(None),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        })
    }

    /// Overrides the retry schedule. Tests use a zero back-off.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff_base_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}xrpc/{method}", self.base_url)
    }

    /// Handle of the logged-in account, if any.
    pub async fn handle(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.handle.clone())
    }

    /// Opens a session with `com.atproto.server.createSession`.
    ///
    /// # Errors
    ///
    /// Returns the last [`BlueskyError`] once retries are exhausted, or the
    /// first non-retriable one (e.g. rejected credentials).
    pub async fn login(&self, handle: &str, app_password: &str) -> Result<(), BlueskyError> {
        let session: Session = retry_with_backoff(
            CREATE_SESSION,
            self.max_attempts,
            self.backoff_base_ms,
            |attempt| async move {
                tracing::info!(handle, attempt, "creating Bluesky session");
                let response = self
                    .client
                    .post(self.xrpc_url(CREATE_SESSION))
                    .json(&CreateSessionRequest {
                        identifier: handle,
                        password: app_password,
                    })
                    .send()
                    .await?;
                decode(response, CREATE_SESSION).await
            },
        )
        .await?;

        tracing::info!(handle = %session.handle, did = %session.did, "logged in to Bluesky");
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<(), BlueskyError> {
        let refresh_jwt = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_jwt.clone())
            .ok_or(BlueskyError::NotAuthenticated)?;

        tracing::info!("access token expired, refreshing session");
        let response = self
            .client
            .post(self.xrpc_url(REFRESH_SESSION))
            .bearer_auth(refresh_jwt)
            .send()
            .await?;
        let session: Session = decode(response, REFRESH_SESSION).await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn access_token(&self) -> Result<String, BlueskyError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_jwt.clone())
            .ok_or(BlueskyError::NotAuthenticated)
    }

    /// Runs `op` with the current access token, refreshing the session and
    /// running it once more if the token has expired.
    async fn call_authed<T, F, Fut>(&self, mut op: F) -> Result<T, BlueskyError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, BlueskyError>>,
    {
        match op(self.access_token().await?).await {
            Err(e) if e.is_expired_token() => {
                self.refresh_session().await?;
                op(self.access_token().await?).await
            }
            other => other,
        }
    }

    /// Uploads the image at `path` and returns the blob reference to embed.
    ///
    /// # Errors
    ///
    /// Returns [`BlueskyError::Io`] if the file cannot be read, or the last
    /// XRPC error once retries are exhausted.
    pub async fn upload_blob(&self, path: &Path) -> Result<serde_json::Value, BlueskyError> {
        let data = tokio::fs::read(path).await.map_err(|e| BlueskyError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mime = sniff_mime(&data);
        let body: &[u8] = &data;
        tracing::debug!(path = %path.display(), bytes = data.len(), mime, "uploading blob");

        let response: UploadBlobResponse = retry_with_backoff(
            UPLOAD_BLOB,
            self.max_attempts,
            self.backoff_base_ms,
            move |_| self.call_authed(move |token| self.upload_blob_once(token, body.to_vec(), mime)),
        )
        .await?;
        Ok(response.blob)
    }

    async fn upload_blob_once(
        &self,
        token: String,
        body: Vec<u8>,
        mime: &'static str,
    ) -> Result<UploadBlobResponse, BlueskyError> {
        let response = self
            .client
            .post(self.xrpc_url(UPLOAD_BLOB))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(body)
            .send()
            .await?;
        decode(response, UPLOAD_BLOB).await
    }

    /// Creates an `app.bsky.feed.post` record with link and tag facets.
    ///
    /// # Errors
    ///
    /// Returns [`BlueskyError::NotAuthenticated`] before login, or the last
    /// XRPC error once retries are exhausted.
    pub async fn create_post(
        &self,
        text: &str,
        images: Vec<EmbeddedImage>,
    ) -> Result<CreateRecordResponse, BlueskyError> {
        let did = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.did.clone())
            .ok_or(BlueskyError::NotAuthenticated)?;

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = PostRecord::new(text.to_string(), created_at, detect_facets(text), images);
        let repo: &str = &did;
        let record = &record;

        retry_with_backoff(
            CREATE_RECORD,
            self.max_attempts,
            self.backoff_base_ms,
            move |_| self.call_authed(move |token| self.create_record_once(token, repo, record)),
        )
        .await
    }

    async fn create_record_once(
        &self,
        token: String,
        repo: &str,
        record: &PostRecord,
    ) -> Result<CreateRecordResponse, BlueskyError> {
        let response = self
            .client
            .post(self.xrpc_url(CREATE_RECORD))
            .bearer_auth(token)
            .json(&CreateRecordRequest {
                repo,
                collection: POST_COLLECTION,
                record,
            })
            .send()
            .await?;
        decode(response, CREATE_RECORD).await
    }
}

/// Decodes a successful XRPC response, or turns an error response into
/// [`BlueskyError::Api`].
async fn decode<T: DeserializeOwned>(response: Response, method: &str) -> Result<T, BlueskyError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let parsed: XrpcErrorBody = serde_json::from_str(&body).unwrap_or_default();
        return Err(BlueskyError::Api {
            method: method.to_string(),
            status: status.as_u16(),
            error: parsed
                .error
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
            message: parsed.message.unwrap_or_default(),
        });
    }

    serde_json::from_str(&body).map_err(|e| BlueskyError::Deserialize {
        context: method.to_string(),
        source: e,
    })
}

/// MIME type from the file's magic bytes; JPEG when unrecognised.
fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    async fn publish(&self, draft: &PostDraft) -> Result<(), PublishError> {
        if self.session.read().await.is_none() {
            return Err(PublishError::NotAuthenticated);
        }

        let draft = PostDraft::new(&draft.text, draft.images.clone());
        let mut embedded = Vec::with_capacity(draft.images.len());
        for image in &draft.images {
            match self.upload_blob(&image.path).await {
                Ok(blob) => embedded.push(EmbeddedImage {
                    alt: image.alt_text.clone(),
                    image: blob,
                }),
                Err(e) => {
                    tracing::warn!(path = %image.path.display(), error = %e, "image upload failed, dropping it");
                }
            }
        }

        if embedded.is_empty() && !draft.images.is_empty() {
            tracing::warn!("all image uploads failed, posting without images");
        }

        let image_count = embedded.len();
        match self.create_post(&draft.text, embedded).await {
            Ok(created) => {
                tracing::info!(uri = %created.uri, cid = %created.cid, images = image_count, "published post");
                Ok(())
            }
            Err(e) if is_retriable(&e) => Err(PublishError::Exhausted {
                attempts: self.max_attempts,
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xrpc_url_tolerates_trailing_slash() {
        let a = BlueskyClient::new("https://bsky.social", 5).unwrap();
        let b = BlueskyClient::new("https://bsky.social/", 5).unwrap();
        assert_eq!(a.xrpc_url(CREATE_SESSION), "https://bsky.social/xrpc/com.atproto.server.createSession");
        assert_eq!(a.xrpc_url(UPLOAD_BLOB), b.xrpc_url(UPLOAD_BLOB));
    }

    #[test]
    fn invalid_service_url_is_rejected() {
        assert!(matches!(
            BlueskyClient::new("not a url", 5),
            Err(BlueskyError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn sniffs_common_image_types() {
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(sniff_mime(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_mime(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime(b"\xff\xd8\xff\xe0"), "image/jpeg");
        assert_eq!(sniff_mime(b""), "image/jpeg");
    }

    #[tokio::test]
    async fn create_post_requires_login() {
        let client = BlueskyClient::new(DEFAULT_SERVICE_URL, 5).unwrap();
        let result = client.create_post("hello", Vec::new()).await;
        assert!(matches!(result, Err(BlueskyError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn publish_requires_login() {
        let client = BlueskyClient::new(DEFAULT_SERVICE_URL, 5).unwrap();
        let result = client.publish(&PostDraft::new("hello", Vec::new())).await;
        assert!(matches!(result, Err(PublishError::NotAuthenticated)));
    }
}

//! Story backend access.
//!
//! `StoryBackend` is the REST contract the editor depends on; `HttpBackend`
//! speaks it over `reqwest`. The backend treats chapter content as opaque
//! text, so nothing here knows about shortcodes.

use std::future::Future;

use bookwiki_editor_core::{Namespace, RawEmote, RawEntity};
use mime_sniffer::MimeTypeSniffer;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{BookwikiError, Result};

/// Image types the upload endpoint stores.
pub const UPLOAD_MIME_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// A chapter as stored by the backend. `content` is the shortcode form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmoteRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
}

/// Operations the editor needs from the story backend.
pub trait StoryBackend: Send + Sync {
    /// Entities of one story namespace.
    fn fetch_entities(
        &self,
        story_id: u64,
        namespace: Namespace,
    ) -> impl Future<Output = Result<Vec<RawEntity>>> + Send;

    fn fetch_emotes(&self, story_id: u64) -> impl Future<Output = Result<Vec<RawEmote>>> + Send;

    /// Store an image and return the URL it is served from.
    fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<UploadResponse>> + Send;

    fn fetch_chapters(
        &self,
        story_id: u64,
    ) -> impl Future<Output = Result<Vec<ChapterRecord>>> + Send;

    fn fetch_chapter(&self, chapter_id: u64) -> impl Future<Output = Result<ChapterRecord>> + Send;

    fn save_chapter(
        &self,
        chapter_id: u64,
        title: &str,
        content: &str,
    ) -> impl Future<Output = Result<ChapterRecord>> + Send;

    fn create_emote(
        &self,
        story_id: u64,
        name: &str,
        image_url: &str,
    ) -> impl Future<Output = Result<RawEmote>> + Send;

    /// Rename an emote. A name already used in the story is a
    /// [`BookwikiError::Conflict`].
    fn rename_emote(
        &self,
        story_id: u64,
        emote_id: u64,
        name: &str,
    ) -> impl Future<Output = Result<RawEmote>> + Send;

    fn delete_emote(&self, story_id: u64, emote_id: u64) -> impl Future<Output = Result<()>> + Send;
}

/// REST path segment for a namespace's collection.
pub fn collection_path(namespace: Namespace) -> &'static str {
    match namespace {
        Namespace::Character => "characters",
        Namespace::Item => "items",
        Namespace::Location => "locations",
        Namespace::Lore => "lore",
        Namespace::Emote => "emotes",
    }
}

/// Sniff the payload and return its MIME type if the backend accepts it.
pub fn sniff_image(bytes: &[u8], file_name: &str) -> Result<&'static str> {
    let detected = bytes.sniff_mime_type().unwrap_or("application/octet-stream");
    UPLOAD_MIME_TYPES
        .into_iter()
        .find(|accepted| *accepted == detected)
        .ok_or_else(|| BookwikiError::UnsupportedUpload {
            file_name: file_name.to_string(),
            detected: detected.to_string(),
        })
}

/// [`StoryBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    async fn send(
        &self,
        method: &'static str,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        tracing::debug!(method, %url, "backend request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(BookwikiError::NotFound { what: url });
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(method, %url, status = status.as_u16(), "backend request failed");
        Err(BookwikiError::Status {
            method,
            url,
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.send("GET", url.clone(), self.client.get(&url)).await?;
        Ok(response.json().await?)
    }
}

/// Turn a 409 into a naming conflict.
fn conflict_on_409(err: BookwikiError, name: &str) -> BookwikiError {
    match err {
        BookwikiError::Status { status: 409, .. } => BookwikiError::Conflict {
            name: name.to_string(),
        },
        other => other,
    }
}

impl StoryBackend for HttpBackend {
    async fn fetch_entities(&self, story_id: u64, namespace: Namespace) -> Result<Vec<RawEntity>> {
        self.get_json(&format!(
            "/api/stories/{story_id}/{}",
            collection_path(namespace)
        ))
        .await
    }

    async fn fetch_emotes(&self, story_id: u64) -> Result<Vec<RawEmote>> {
        self.get_json(&format!("/api/stories/{story_id}/emotes"))
            .await
    }

    async fn upload_image(&self, bytes: Vec<u8>, file_name: &str) -> Result<UploadResponse> {
        let mime = sniff_image(&bytes, file_name)?;
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let url = self.url("/api/upload");
        tracing::debug!(file = file_name, mime, size, "uploading image");
        let response = self
            .send("POST", url.clone(), self.client.post(&url).multipart(form))
            .await?;
        Ok(response.json().await?)
    }

    async fn fetch_chapters(&self, story_id: u64) -> Result<Vec<ChapterRecord>> {
        self.get_json(&format!("/api/chapters?storyId={story_id}"))
            .await
    }

    async fn fetch_chapter(&self, chapter_id: u64) -> Result<ChapterRecord> {
        self.get_json(&format!("/api/chapters/{chapter_id}")).await
    }

    async fn save_chapter(&self, chapter_id: u64, title: &str, content: &str) -> Result<ChapterRecord> {
        let url = self.url(&format!("/api/chapters/{chapter_id}"));
        let record = ChapterRecord {
            id: chapter_id,
            title: title.to_string(),
            content: content.to_string(),
        };
        let response = self
            .send("PUT", url.clone(), self.client.put(&url).json(&record))
            .await?;
        Ok(response.json().await?)
    }

    async fn create_emote(&self, story_id: u64, name: &str, image_url: &str) -> Result<RawEmote> {
        let url = self.url(&format!("/api/stories/{story_id}/emotes"));
        let body = EmoteRequest {
            name,
            image_url: Some(image_url),
        };
        let response = self
            .send("POST", url.clone(), self.client.post(&url).json(&body))
            .await
            .map_err(|e| conflict_on_409(e, name))?;
        Ok(response.json().await?)
    }

    async fn rename_emote(&self, story_id: u64, emote_id: u64, name: &str) -> Result<RawEmote> {
        let url = self.url(&format!("/api/stories/{story_id}/emotes/{emote_id}"));
        let body = EmoteRequest {
            name,
            image_url: None,
        };
        let response = self
            .send("PATCH", url.clone(), self.client.patch(&url).json(&body))
            .await
            .map_err(|e| conflict_on_409(e, name))?;
        Ok(response.json().await?)
    }

    async fn delete_emote(&self, story_id: u64, emote_id: u64) -> Result<()> {
        let url = self.url(&format!("/api/stories/{story_id}/emotes/{emote_id}"));
        self.send("DELETE", url.clone(), self.client.delete(&url))
            .await?;
        Ok(())
    }
}

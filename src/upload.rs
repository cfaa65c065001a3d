//! Multipart uploads and image persistence.
//!
//! Handlers read the whole multipart body into an [`UploadForm`], then push
//! each file through the configured [`ImageStore`] and write the returned
//! path/URL onto the record before saving it. Nothing here deletes files, so a
//! record save that fails after a successful upload leaves the image behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::CloudinaryConfig;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Only image files are allowed!")]
    NotAnImage,

    #[error("File too large (limit is {limit} bytes)")]
    TooLarge { limit: usize },

    #[error("failed to write upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("image host request failed: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("image host rejected upload: {0}")]
    Rejected(String),
}

impl UploadError {
    /// Problems with what the client sent, as opposed to our storage failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::Multipart(_) | UploadError::NotAnImage | UploadError::TooLarge { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Extension from the original file name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("image")
    }
}

/// A fully buffered multipart submission: text fields and files.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, Vec<String>>,
    files: Vec<UploadedFile>,
}

/// `photos[]` and `photos` name the same field.
fn normalize(name: &str) -> &str {
    name.strip_suffix("[]").unwrap_or(name)
}

impl UploadForm {
    /// Buffer the request. Files must be images of at most `max_file_bytes`.
    pub async fn read(mut multipart: Multipart, max_file_bytes: usize) -> Result<Self, UploadError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = normalize(field.name().unwrap_or_default()).to_string();

            match field.file_name().map(str::to_string) {
                // Browsers send a nameless part when a file input is left blank
                Some(file_name) if file_name.is_empty() => continue,
                Some(file_name) => {
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    if !content_type.starts_with("image/") {
                        return Err(UploadError::NotAnImage);
                    }
                    let bytes = field.bytes().await?;
                    if bytes.len() > max_file_bytes {
                        return Err(UploadError::TooLarge {
                            limit: max_file_bytes,
                        });
                    }
                    form.files.push(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.entry(name).or_default().push(value);
                }
            }
        }

        debug!(
            fields = form.fields.len(),
            files = form.files.len(),
            "multipart form buffered"
        );
        Ok(form)
    }

    /// First value of a text field, trimmed; blank counts as missing.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Every non-blank value of a repeated text field.
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.field == name)
    }

    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |file| file.field == name)
    }
}

/// Where uploaded images end up. Returns the public path or URL to store on
/// the record.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, folder: &str, file: &UploadedFile) -> Result<String, UploadError>;
}

/// Store every file of a field, in upload order.
pub async fn store_all(
    store: &dyn ImageStore,
    folder: &str,
    files: impl Iterator<Item = &UploadedFile>,
) -> Result<Vec<String>, UploadError> {
    let mut stored = vec![];
    for file in files {
        stored.push(store.store(folder, file).await?);
    }
    Ok(stored)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Files on local disk, served by the static `/uploads` route.
pub struct LocalDiskStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "/uploads".to_string(),
        }
    }
}

#[async_trait]
impl ImageStore for LocalDiskStore {
    async fn store(&self, _folder: &str, file: &UploadedFile) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.root).await?;

        // <field>-<millis>-<random>.<ext>, flat directory
        let random = uuid::Uuid::new_v4().simple().to_string();
        let suffix = &random[..9];
        let file_name = match file.extension() {
            Some(ext) => format!("{}-{}-{}.{}", file.field, unix_millis(), suffix, ext),
            None => format!("{}-{}-{}", file.field, unix_millis(), suffix),
        };

        tokio::fs::write(self.root.join(&file_name), &file.bytes).await?;
        debug!(%file_name, bytes = file.bytes.len(), "stored upload on disk");
        Ok(format!("{}/{}", self.public_prefix, file_name))
    }
}

/// Signed uploads to the Cloudinary image API, re-encoded as JPEG.
pub struct CloudinaryStore {
    config: CloudinaryConfig,
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: Option<String>,
    error: Option<CloudinaryErrorBody>,
}

#[derive(Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        let endpoint = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            config.cloud_name
        );
        Self {
            config,
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

/// Cloudinary request signature: the signed params sorted by name, joined as
/// `k=v&k=v`, followed by the API secret, SHA-256 hex.
pub fn cloudinary_signature(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn store(&self, folder: &str, file: &UploadedFile) -> Result<String, UploadError> {
        let timestamp = (unix_millis() / 1000).to_string();
        let public_id = format!("{}-{}", file.stem(), unix_millis());
        let signed = [
            ("folder", folder),
            ("format", "jpg"),
            ("public_id", public_id.as_str()),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = cloudinary_signature(&signed, &self.config.api_secret);

        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;
        let mut form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in signed {
            form = form.text(key, value.to_string());
        }

        let response: CloudinaryResponse = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        match (response.secure_url, response.error) {
            (Some(url), _) => {
                info!(%url, "uploaded image to Cloudinary");
                Ok(url)
            }
            (None, Some(err)) => Err(UploadError::Rejected(err.message)),
            (None, None) => Err(UploadError::Rejected("no URL in response".to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const BOUNDARY: &str = "studio-test-boundary";

    /// Hand-built multipart body: `(name, value)` text parts and
    /// `(name, file_name, content_type, bytes)` file parts.
    pub(crate) fn multipart_body(texts: &[(&str, &str)], files: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in texts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, file_name, content_type, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn file(field: &str, name: &str) -> UploadedFile {
        UploadedFile {
            field: field.to_string(),
            file_name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: Bytes::from_static(b"\xff\xd8\xff"),
        }
    }

    #[test]
    fn test_field_names_are_normalized() {
        assert_eq!(normalize("photos[]"), "photos");
        assert_eq!(normalize("cover"), "cover");
    }

    #[test]
    fn test_signature_sorts_params() {
        let a = cloudinary_signature(&[("timestamp", "1"), ("folder", "galleries")], "secret");
        let b = cloudinary_signature(&[("folder", "galleries"), ("timestamp", "1")], "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, cloudinary_signature(&[("folder", "galleries"), ("timestamp", "1")], "other"));
    }

    #[tokio::test]
    async fn test_local_store_writes_under_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path());

        let path = store.store("galleries", &file("cover", "beach.jpg")).await.unwrap();
        assert!(path.starts_with("/uploads/cover-"));
        assert!(path.ends_with(".jpg"));

        let on_disk = dir.path().join(path.trim_start_matches("/uploads/"));
        assert_eq!(std::fs::read(on_disk).unwrap(), b"\xff\xd8\xff");
    }

    #[tokio::test]
    async fn test_store_all_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path());
        let files = [file("photos", "1.png"), file("photos", "2.png")];

        let stored = store_all(&store, "galleries", files.iter()).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|p| p.ends_with(".png")));
    }
}

//! Uploads to the external media host.
//!
//! The host speaks the Cloudinary upload API: a signed multipart form post
//! that answers with the stored resource's URL and public id.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing_futures::Instrument;

use crate::config::MediaConfig;
use crate::error::MediaError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResourceType {
    Image,
    Raw,
    Auto,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Raw => "raw",
            ResourceType::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// File contents as a `data:` URI.
    pub file: String,
    pub folder: String,
    pub resource_type: ResourceType,
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredMedia {
    #[serde(rename = "secure_url")]
    pub url: String,
    pub public_id: String,
}

#[rocket::async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, upload: MediaUpload) -> Result<StoredMedia, MediaError>;
}

/// Signature over the sorted, `&`-joined parameters followed by the secret.
pub fn sign(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let joined = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    Sha256::digest(format!("{}{}", joined, secret).as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Deserialize)]
struct HostErrorBody {
    error: HostError,
}

#[derive(Debug, Deserialize)]
struct HostError {
    message: String,
}

pub struct CloudinaryStore {
    http: reqwest::Client,
    config: MediaConfig,
}

impl CloudinaryStore {
    pub fn new(config: MediaConfig) -> Result<CloudinaryStore, MediaError> {
        let http = reqwest::Client::builder().build()?;
        Ok(CloudinaryStore { http, config })
    }

    fn endpoint(&self, resource_type: ResourceType) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name,
            resource_type.as_str()
        )
    }

    fn signed_form(&self, upload: &MediaUpload, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut signed = BTreeMap::new();
        signed.insert("folder", upload.folder.clone());
        signed.insert("timestamp", timestamp.to_string());
        if let Some(public_id) = &upload.public_id {
            signed.insert("public_id", public_id.clone());
        }

        let signature = sign(&signed, &self.config.api_secret);

        let mut form: Vec<(&'static str, String)> = signed.into_iter().collect();
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature_algorithm", "sha256".to_string()));
        form.push(("signature", signature));
        form
    }
}

#[rocket::async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, upload: MediaUpload) -> Result<StoredMedia, MediaError> {
        if !self.config.is_configured() {
            return Err(MediaError::NotConfigured);
        }

        let mut form = self.signed_form(&upload, Utc::now().timestamp());
        let resource_type = upload.resource_type;
        let span = tracing::info_span!(
            "media_upload",
            folder = %upload.folder,
            resource_type = resource_type.as_str()
        );
        form.push(("file", upload.file));

        async move {
            let response = self
                .http
                .post(self.endpoint(resource_type))
                .form(&form)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = match response.json::<HostErrorBody>().await {
                    Ok(body) => body.error.message,
                    Err(_) => status.to_string(),
                };
                tracing::warn!("media host rejected upload: {}", message);
                return Err(MediaError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }

            let stored = response.json::<StoredMedia>().await?;
            tracing::debug!("stored media as {}", stored.public_id);
            Ok(stored)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MediaConfig {
        MediaConfig {
            base_url: "https://api.cloudinary.com/".to_string(),
            cloud_name: "demo".to_string(),
            api_key: "1234".to_string(),
            api_secret: "abcd".to_string(),
        }
    }

    #[test]
    fn signature_covers_sorted_params() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("public_id", "sample_image".to_string());
        params.insert("eager", "w_400,h_300,c_pad|w_260,h_200,c_crop".to_string());

        assert_eq!(
            sign(&params, "abcd"),
            "cc927e1290f9e3ae4c1a741eda21a4630b4ce80f9ce0bc0296337d25cf40f91e"
        );
    }

    #[test]
    fn empty_params_are_not_signed() {
        let mut with_empty = BTreeMap::new();
        with_empty.insert("folder", "submissions/a/b".to_string());
        with_empty.insert("public_id", String::new());
        with_empty.insert("timestamp", "1315060510".to_string());

        assert_eq!(
            sign(&with_empty, "abcd"),
            "96c45436697424711d6f83ee057dac0161096fbd808464cf72e6c617f4ab1fc8"
        );
    }

    #[test]
    fn form_carries_signature_and_key() {
        let store = CloudinaryStore::new(config()).unwrap();
        let upload = MediaUpload {
            file: "data:application/pdf;base64,JVBERi0xLjQ=".to_string(),
            folder: "submissions/a/b".to_string(),
            resource_type: ResourceType::Raw,
            public_id: None,
        };

        let form: BTreeMap<_, _> = store.signed_form(&upload, 1315060510).into_iter().collect();
        assert_eq!(form["folder"], "submissions/a/b");
        assert_eq!(form["api_key"], "1234");
        assert_eq!(form["signature_algorithm"], "sha256");
        assert_eq!(
            form["signature"],
            "96c45436697424711d6f83ee057dac0161096fbd808464cf72e6c617f4ab1fc8"
        );
        assert!(!form.contains_key("public_id"));

        assert_eq!(
            store.endpoint(ResourceType::Raw),
            "https://api.cloudinary.com/v1_1/demo/raw/upload"
        );
    }

    #[rocket::async_test]
    async fn unconfigured_store_refuses_uploads() {
        let mut unconfigured = config();
        unconfigured.api_secret.clear();
        let store = CloudinaryStore::new(unconfigured).unwrap();

        let result = store
            .upload(MediaUpload {
                file: String::new(),
                folder: "profile_pictures/x".to_string(),
                resource_type: ResourceType::Image,
                public_id: None,
            })
            .await;

        assert!(matches!(result, Err(MediaError::NotConfigured)));
    }
}

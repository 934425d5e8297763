use crate::error::UploadError;
use crate::storage_utils::ImageHostConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Turns a local image into a publicly fetchable URL.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, UploadError>;
}

#[derive(Deserialize, Debug)]
struct UploadResponse {
    url: Option<String>,
}

pub struct ImageKitClient {
    client: Client,
    config: ImageHostConfig,
    private_key: Option<String>,
}

impl ImageKitClient {
    pub fn new(config: ImageHostConfig, private_key: Option<String>) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(UploadError::from_reqwest)?;

        Ok(Self {
            client,
            config,
            private_key,
        })
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Appends an ImageKit `tr` transformation to a delivery URL.
fn with_transform(url: String, transform: Option<&str>) -> String {
    match transform.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tr) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}tr={tr}")
        }
        None => url,
    }
}

fn hosted_url(body: UploadResponse, transform: Option<&str>) -> Result<String, UploadError> {
    let url = body
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or(UploadError::EmptyResult)?;
    Ok(with_transform(url, transform))
}

const FILE_FIELD: &str = "file";

/// Text fields sent next to the file part.
fn text_fields(file_name: &str, folder: Option<&str>) -> Vec<(&'static str, String)> {
    let mut fields = vec![("fileName", file_name.to_string())];
    if let Some(folder) = folder {
        fields.push(("folder", folder.to_string()));
    }
    fields
}

fn upload_form(bytes: Vec<u8>, path: &Path, folder: Option<&str>) -> Result<Form, UploadError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("chart.svg");
    let part = Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(mime_for(path))
        .map_err(UploadError::from_reqwest)?;

    let form = text_fields(file_name, folder)
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value));
    Ok(form.part(FILE_FIELD, part))
}

fn status_error(status: StatusCode, body: String) -> Option<UploadError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(UploadError::Auth(body))
    } else if !status.is_success() {
        Some(UploadError::Http(status.as_u16()))
    } else {
        None
    }
}

#[async_trait]
impl ImageHost for ImageKitClient {
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let private_key = self
            .private_key
            .as_deref()
            .ok_or_else(|| UploadError::Auth("IMAGEKIT_PRIVATE_KEY is not set".to_string()))?;

        let bytes = tokio::fs::read(path).await?;
        let form = upload_form(bytes, path, self.config.folder.as_deref())?;

        let response = self
            .client
            .post(&self.config.upload_url)
            .basic_auth(private_key, Some(""))
            .multipart(form)
            .send()
            .await
            .map_err(UploadError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = status_error(status, text) {
                return Err(err);
            }
            unreachable!("status_error maps every non-success status to an error");
        }

        let body: UploadResponse = response.json().await.map_err(UploadError::from_reqwest)?;
        hosted_url(body, self.config.delivery_transform.as_deref())
    }
}

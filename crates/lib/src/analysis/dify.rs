//! Dify app client. Blocking response mode; no conversation continuity.

use super::{AnalysisError, Analyzer, RAW_RESPONSE_PREVIEW_CHARS};
use crate::channels::Attachment;
use crate::chunk::truncate_chars;
use crate::config::{AnalysisConfig, AnalysisStrategy};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query sent by the upload strategy when none is configured; chat apps reject empty queries.
const DEFAULT_QUERY: &str = "請分析這張圖面。";

/// Client for a Dify app's HTTP API.
#[derive(Clone)]
pub struct DifyClient {
    api_url: Option<String>,
    api_key: Option<String>,
    strategy: AnalysisStrategy,
    image_field: String,
    query: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessagesRequest<'a> {
    inputs: serde_json::Value,
    query: &'a str,
    response_mode: &'a str,
    conversation_id: &'a str,
    user: &'a str,
    files: Vec<FileReference<'a>>,
}

#[derive(Debug, Serialize)]
struct FileReference<'a> {
    #[serde(rename = "type")]
    typ: &'a str,
    transfer_method: &'a str,
    upload_file_id: &'a str,
}

impl DifyClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_url: config
                .api_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_key: config.api_key.clone(),
            strategy: config.strategy,
            image_field: config.image_field.clone(),
            query: config
                .query
                .as_ref()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            client,
        })
    }

    fn endpoint(&self) -> Result<(&str, &str), AnalysisError> {
        match (self.api_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(AnalysisError::NotConfigured),
        }
    }

    /// Single multipart POST: image part plus `inputs`, `response_mode`, `user`,
    /// `conversation_id` and, when configured, `query`.
    async fn analyze_multipart(
        &self,
        user: &str,
        image: &Attachment,
    ) -> Result<Option<String>, AnalysisError> {
        let (url, key) = self.endpoint()?;
        let mut form = Form::new()
            .text("inputs", "{}")
            .text("response_mode", "blocking")
            .text("user", user.to_string())
            .text("conversation_id", "");
        if let Some(ref q) = self.query {
            form = form.text("query", q.clone());
        }
        form = form.part(self.image_field.clone(), image_part(image)?);
        let res = self
            .client
            .post(url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;
        read_answer(res).await
    }

    /// POST /files/upload, then POST /chat-messages referencing the uploaded file.
    async fn analyze_upload_then_reference(
        &self,
        user: &str,
        image: &Attachment,
    ) -> Result<Option<String>, AnalysisError> {
        let (base, key) = self.endpoint()?;
        let file_id = self.upload(base, key, user, image).await?;
        log::debug!("dify upload for {} returned file id {}", user, file_id);
        let body = ChatMessagesRequest {
            inputs: serde_json::json!({}),
            query: self.query.as_deref().unwrap_or(DEFAULT_QUERY),
            response_mode: "blocking",
            conversation_id: "",
            user,
            files: vec![FileReference {
                typ: "image",
                transfer_method: "local_file",
                upload_file_id: &file_id,
            }],
        };
        let res = self
            .client
            .post(format!("{}/chat-messages", base))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        read_answer(res).await
    }

    async fn upload(
        &self,
        base: &str,
        key: &str,
        user: &str,
        image: &Attachment,
    ) -> Result<String, AnalysisError> {
        let form = Form::new()
            .text("user", user.to_string())
            .part("file", image_part(image)?);
        let res = self
            .client
            .post(format!("{}/files/upload", base))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;
        let text = success_text(res).await?;
        let data: UploadResponse =
            serde_json::from_str(&text).map_err(|_| AnalysisError::Parse { raw: text.clone() })?;
        data.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AnalysisError::Api("upload response has no file id".to_string()))
    }
}

#[async_trait]
impl Analyzer for DifyClient {
    async fn analyze(
        &self,
        user: &str,
        image: &Attachment,
    ) -> Result<Option<String>, AnalysisError> {
        match self.strategy {
            AnalysisStrategy::Multipart => self.analyze_multipart(user, image).await,
            AnalysisStrategy::UploadThenReference => {
                self.analyze_upload_then_reference(user, image).await
            }
        }
    }
}

fn image_part(image: &Attachment) -> Result<Part, AnalysisError> {
    let part = Part::bytes(image.bytes.clone())
        .file_name(file_name_for(&image.content_type))
        .mime_str(&image.content_type)?;
    Ok(part)
}

/// "image/png; charset=binary" -> "image.png". Unknown or malformed types fall back to jpeg.
fn file_name_for(content_type: &str) -> String {
    let subtype = content_type
        .split(';')
        .next()
        .and_then(|t| t.trim().split_once('/'))
        .map(|(_, sub)| sub.trim())
        .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()));
    format!("image.{}", subtype.unwrap_or("jpeg"))
}

async fn success_text(res: reqwest::Response) -> Result<String, AnalysisError> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(AnalysisError::Api(format!(
            "{} {}",
            status,
            truncate_chars(&text, RAW_RESPONSE_PREVIEW_CHARS)
        )));
    }
    Ok(text)
}

async fn read_answer(res: reqwest::Response) -> Result<Option<String>, AnalysisError> {
    let text = success_text(res).await?;
    parse_answer(&text)
}

/// Extract `answer` from a blocking-mode response body. Missing or empty answer is `None`.
fn parse_answer(text: &str) -> Result<Option<String>, AnalysisError> {
    let v: serde_json::Value = serde_json::from_str(text).map_err(|_| AnalysisError::Parse {
        raw: text.to_string(),
    })?;
    Ok(v.get("answer")
        .and_then(|a| a.as_str())
        .filter(|a| !a.is_empty())
        .map(|a| a.to_string()))
}

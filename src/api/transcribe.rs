use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::queue::backend::{TranscribeRequest, Transcript, TranscriptionBackend};
use crate::queue::types::Half;
use super::client::FunctionsClient;
use super::errors::Result;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeBody<'a> {
    video_url: &'a str,
    file_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    half_type: Option<Half>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    part: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_parts: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscribePayload {
    text: String,
    srt_content: Option<String>,
}

/// 走托管转写函数的后端：整文件走 `transcribe-large-video`，
/// 切分后的分段走 `transcribe-split-video`
#[derive(Debug, Clone)]
pub struct HttpTranscriptionBackend {
    client: FunctionsClient,
}

impl HttpTranscriptionBackend {
    pub fn new(client: FunctionsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscriptionBackend {
    async fn transcribe(&self, request: &TranscribeRequest) -> Result<Transcript> {
        let function = match request.part {
            Some(_) => "transcribe-split-video",
            None => "transcribe-large-video",
        };

        let body = TranscribeBody {
            video_url: &request.video_url,
            file_name: &request.file_name,
            half_type: request.half,
            language: request.language.as_deref(),
            part: request.part.map(|p| p.index),
            total_parts: request.part.map(|p| p.total),
        };

        let payload: TranscribePayload = self.client.invoke(function, &body).await?;

        Ok(Transcript {
            text: payload.text,
            srt: payload.srt_content,
        })
    }
}

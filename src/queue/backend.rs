use async_trait::async_trait;
use crate::api::Result;
use super::types::Half;

/// 一次转写调用要处理的分段（大文件切分用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub index: u32,
    pub total: u32,
}

/// 转写请求
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    pub video_url: String,
    pub file_name: String,
    pub half: Option<Half>,
    /// None 表示整个文件一次转写
    pub part: Option<PartSpec>,
    pub language: Option<String>,
}

/// 转写结果
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub srt: Option<String>,
}

/// 转写后端接口，HTTP 实现见 [`crate::api::HttpTranscriptionBackend`]，
/// 测试可用内存实现替换
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(&self, request: &TranscribeRequest) -> Result<Transcript>;
}

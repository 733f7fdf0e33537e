use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use super::errors::Result;

/// 分片体发送过程中的字节回调（单个分片内已发送的字节数）
pub type ChunkProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// 创建会话时的文件元数据
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub filename: String,
    pub total_bytes: u64,
    pub total_chunks: u32,
    pub chunk_size: u64,
}

/// 待发送分片在源文件中的位置
#[derive(Debug, Clone)]
pub struct ChunkSlice {
    pub file_path: PathBuf,
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

/// 服务端后处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPhase {
    Assembling,
    Converting,
    Extracting,
    Segmenting,
    Transcribing,
    Completed,
    Failed,
}

/// 轮询状态接口返回的处理进度
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub phase: ServerPhase,
    pub conversion_progress: Option<f64>,
    pub transcription_progress: Option<f64>,
    pub segment_current: Option<u32>,
    pub segment_total: Option<u32>,
    pub error: Option<String>,
}

/// 分片传输接口，HTTP 实现见 [`super::client::HttpChunkTransport`]，
/// 测试可用内存实现替换
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// 创建上传会话，返回会话 URL
    async fn create_session(&self, meta: &SessionMeta) -> Result<String>;

    /// 查询服务端已确认的分片数（恢复时的权威来源）
    async fn acked_chunks(&self, session_url: &str) -> Result<u32>;

    /// 发送单个分片
    async fn send_chunk(
        &self,
        session_url: &str,
        chunk: &ChunkSlice,
        progress: Option<ChunkProgressFn>,
    ) -> Result<()>;

    /// 所有分片发完后触发服务端合并与后处理
    async fn finalize(&self, session_url: &str) -> Result<()>;

    /// 轮询服务端处理状态
    async fn processing_status(&self, session_url: &str) -> Result<ProcessingStatus>;

    /// 丢弃服务端的部分状态
    async fn discard(&self, session_url: &str) -> Result<()>;
}

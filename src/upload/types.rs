use std::path::PathBuf;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use super::errors::Result;
use super::transport::ProcessingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传阶段（线性状态机，含服务端后处理阶段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadStage {
    /// 空闲
    Idle,
    /// 准备中（创建上传会话）
    Preparing,
    /// 分片上传中
    Uploading,
    /// 已暂停
    Paused,
    /// 服务端合并分片
    Assembling,
    /// 服务端转码
    Converting,
    /// 服务端提取音轨
    Extracting,
    /// 服务端切分音频段
    Segmenting,
    /// 服务端转写
    Transcribing,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已取消
    Cancelled,
}

impl UploadStage {
    /// 终态不再迁移
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// 转写分段计数（current/total）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionSegment {
    pub current: u32,
    pub total: u32,
}

/// 上传过程中的时间线日志（追加写，不回改）
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// 单个上传的完整状态，只由协调器内部的处理函数修改
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub id: UploadId,
    pub file_path: PathBuf,
    pub filename: String,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub total_chunks: u32,
    /// 已确认的分片数，下一个发送的分片索引等于它
    pub current_chunk: u32,
    pub stage: UploadStage,
    /// 滑动窗口速度（字节/秒）
    pub speed_bps: f64,
    /// 估算剩余时间（remaining / speed）
    pub eta: Option<Duration>,
    pub conversion_progress: Option<f64>,
    pub transcription_progress: Option<f64>,
    pub transcription_segment: Option<TranscriptionSegment>,
    /// 总体百分比，只增不减
    pub overall_percent: f64,
    pub events: Vec<LogEntry>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn new(id: UploadId, file_path: PathBuf, filename: String, total_bytes: u64, total_chunks: u32) -> Self {
        Self {
            id,
            file_path,
            filename,
            total_bytes,
            uploaded_bytes: 0,
            total_chunks,
            current_chunk: 0,
            stage: UploadStage::Idle,
            speed_bps: 0.0,
            eta: None,
            conversion_progress: None,
            transcription_progress: None,
            transcription_segment: None,
            overall_percent: 0.0,
            events: Vec::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub(crate) fn push_log(&mut self, message: impl Into<String>) {
        self.events.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }
}

/// 分片总数 = ceil(size / chunk_size)
pub fn chunk_count(total_bytes: u64, chunk_size: u64) -> u32 {
    total_bytes.div_ceil(chunk_size) as u32
}

/// 协调器配置
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// 分片大小
    pub chunk_size: u64,
    /// 单个分片的最大重试次数
    pub max_retries: u32,
    /// 重试间隔
    pub retry_delay: Duration,
    /// 服务端处理状态的轮询间隔
    pub poll_interval: Duration,
    /// 超过该大小直接拒绝
    pub max_file_size: u64,
    /// 允许的扩展名（小写）
    pub allowed_extensions: Vec<String>,
    /// 待恢复上传的持久化文件
    pub state_file: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024, // 5MB
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            max_file_size: 8 * 1024 * 1024 * 1024, // 8GB
            allowed_extensions: ["mp4", "mov", "mkv", "avi", "webm", "mp3", "wav", "m4a"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            state_file: None,
        }
    }
}

/// 页面重载 / 进程重启后可恢复的上传记录
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PendingUpload {
    pub upload_id: UploadId,
    pub filename: String,
    pub file_path: PathBuf,
    pub session_url: String,
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub total_bytes: u64,
    pub chunk_size: u64,
}

/// 协调器命令
pub enum CoordinatorCommand {
    /// 开始新上传
    StartUpload {
        file_path: PathBuf,
        reply: oneshot::Sender<Result<UploadId>>,
    },

    /// 暂停（分片间生效，不丢弃任何状态）
    Pause {
        upload_id: UploadId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 恢复（从服务端确认的分片数继续）
    Resume {
        upload_id: UploadId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 取消并丢弃服务端的部分状态
    Cancel {
        upload_id: UploadId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 清除记录（含待恢复记录）
    Clear {
        upload_id: UploadId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 获取单个上传状态快照
    GetRecord {
        upload_id: UploadId,
        reply: oneshot::Sender<Option<UploadRecord>>,
    },

    /// 获取所有上传状态快照
    GetAllRecords {
        reply: oneshot::Sender<Vec<UploadRecord>>,
    },

    /// 获取可恢复的上传列表
    GetPending {
        reply: oneshot::Sender<Vec<PendingUpload>>,
    },
}

/// 进度快照（对外广播用）
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub current_chunk: u32,
    pub total_chunks: u32,
    pub speed_bps: f64,
    pub eta: Option<Duration>,
    pub overall_percent: f64,
}

/// 上传事件
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 阶段变更
    StageChanged {
        upload_id: UploadId,
        from: UploadStage,
        to: UploadStage,
    },

    /// 进度更新
    Progress {
        upload_id: UploadId,
        progress: ProgressSnapshot,
    },

    /// 完成
    Completed {
        upload_id: UploadId,
    },

    /// 失败
    Failed {
        upload_id: UploadId,
        error: String,
    },
}

/// 上传工作任务发回协调器的内部更新
pub(crate) enum WorkerUpdate {
    /// 会话已创建
    SessionCreated {
        upload_id: UploadId,
        session_url: String,
    },

    /// 分片体发送中的字节推进（非权威，确认以 ChunkAcked 为准）
    ChunkBytes {
        upload_id: UploadId,
        uploaded_bytes: u64,
    },

    /// 分片确认
    ChunkAcked {
        upload_id: UploadId,
        /// 已确认分片数
        acked_chunks: u32,
        uploaded_bytes: u64,
        speed_bps: f64,
        eta: Option<Duration>,
    },

    /// 服务端处理状态
    Processing {
        upload_id: UploadId,
        status: ProcessingStatus,
    },

    /// 时间线日志
    Log {
        upload_id: UploadId,
        message: String,
    },

    /// 工作任务结束，协调器 join 拿结果
    Finished {
        upload_id: UploadId,
    },
}

/// 工作任务的退出方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerOutcome {
    Completed,
    Paused { next_chunk: u32 },
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count_ceil() {
        let chunk = 5 * 1024 * 1024;
        assert_eq!(chunk_count(0, chunk), 0);
        assert_eq!(chunk_count(1, chunk), 1);
        assert_eq!(chunk_count(chunk, chunk), 1);
        assert_eq!(chunk_count(chunk + 1, chunk), 2);
        assert_eq!(chunk_count(10 * chunk, chunk), 10);
        assert_eq!(chunk_count(10 * chunk - 1, chunk), 10);
    }

    #[test]
    fn test_chunk_count_odd_sizes() {
        // 任意大小都满足 ceil
        for size in [1u64, 999, 1024, 4097, 123_456_789] {
            for chunk in [1024u64, 4096, 1_000_000] {
                let expected = (size + chunk - 1) / chunk;
                assert_eq!(chunk_count(size, chunk) as u64, expected);
            }
        }
    }

    #[test]
    fn test_terminal_stages() {
        assert!(UploadStage::Completed.is_terminal());
        assert!(UploadStage::Failed.is_terminal());
        assert!(UploadStage::Cancelled.is_terminal());
        assert!(!UploadStage::Uploading.is_terminal());
        assert!(!UploadStage::Paused.is_terminal());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上下半场
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    First,
    Second,
}

/// 队列项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum JobStatus {
    /// 等待中
    Pending,
    /// 转写中（全局同时只有一个）
    Transcribing,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 入队参数
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub video_url: String,
    pub file_name: String,
    pub size_mb: f64,
    pub match_id: Option<String>,
    pub video_id: Option<String>,
    pub half: Option<Half>,
}

/// 转写队列项，入队创建、原地修改，只能由调用方移除
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub id: JobId,
    pub video_url: String,
    pub file_name: String,
    pub size_mb: f64,
    pub match_id: Option<String>,
    pub video_id: Option<String>,
    pub half: Option<Half>,
    pub status: JobStatus,
    /// 估算进度（轮询计数线性外推，非权威值）
    pub estimated_progress: f64,
    pub message: String,
    pub current_part: Option<u32>,
    pub total_parts: Option<u32>,
    pub srt: Option<String>,
    pub text: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranscriptionJob {
    pub(crate) fn new(request: JobRequest) -> Self {
        Self {
            id: JobId::new(),
            video_url: request.video_url,
            file_name: request.file_name,
            size_mb: request.size_mb,
            match_id: request.match_id,
            video_id: request.video_id,
            half: request.half,
            status: JobStatus::Pending,
            estimated_progress: 0.0,
            message: "Waiting in queue".to_string(),
            current_part: None,
            total_parts: None,
            srt: None,
            text: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// 队列整体进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// 队列事件
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// 入队
    JobAdded {
        job_id: JobId,
    },

    /// 状态变更
    StatusChanged {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// 估算进度更新
    Progress {
        job_id: JobId,
        estimated_progress: f64,
    },

    /// 队列被清空
    Cleared,
}

/// 大文件切分阈值（MB）
pub const SPLIT_THRESHOLD_MB: f64 = 300.0;
/// 超过该大小切成 4 份，否则 2 份
pub const QUAD_SPLIT_THRESHOLD_MB: f64 = 800.0;

/// 切分策略：超过阈值的文件转码成 N 份分别转写
pub fn split_parts(size_mb: f64) -> Option<u32> {
    if size_mb > SPLIT_THRESHOLD_MB {
        Some(if size_mb > QUAD_SPLIT_THRESHOLD_MB { 4 } else { 2 })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_policy() {
        assert_eq!(split_parts(50.0), None);
        assert_eq!(split_parts(250.0), None);
        assert_eq!(split_parts(300.0), None);
        assert_eq!(split_parts(350.0), Some(2));
        assert_eq!(split_parts(800.0), Some(2));
        assert_eq!(split_parts(900.0), Some(4));
        assert_eq!(split_parts(2000.0), Some(4));
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = TranscriptionJob::new(JobRequest {
            video_url: "https://cdn.example.com/match.mp4".to_string(),
            file_name: "match.mp4".to_string(),
            size_mb: 120.0,
            match_id: None,
            video_id: None,
            half: Some(Half::First),
        });

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.estimated_progress, 0.0);
        assert!(job.error.is_none());
    }
}

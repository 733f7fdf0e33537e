pub mod api;
pub mod config;
pub mod queue;
pub mod upload;
pub mod utils;

// 重新导出核心类型
pub use api::{ApiError, FunctionsClient, HttpTranscriptionBackend, LiveEvent};
pub use queue::{
    JobId, JobRequest, JobStatus, QueueConfig, TranscriptionJob, TranscriptionQueue,
};
pub use upload::{
    ChunkTransport, HttpChunkTransport, UploadConfig, UploadCoordinator, UploadCoordinatorHandle,
    UploadError, UploadEvent, UploadId, UploadRecord, UploadStage,
};

mod client;
mod errors;
mod manager;
mod manager_worker;
mod pending;
mod progress_stream;
mod worker;
pub mod stage;
pub mod transport;
pub mod types;

pub use client::HttpChunkTransport;
pub use errors::{Result, UploadError};
pub use manager::{UploadCoordinator, UploadCoordinatorHandle};
pub use stage::overall_percent;
pub use transport::{ChunkTransport, ProcessingStatus, ServerPhase};
pub use types::{
    PendingUpload, ProgressSnapshot, UploadConfig, UploadEvent, UploadId, UploadRecord, UploadStage,
    chunk_count,
};

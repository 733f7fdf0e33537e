mod queue;
pub mod backend;
pub mod types;

pub use backend::{PartSpec, TranscribeRequest, Transcript, TranscriptionBackend};
pub use queue::{QueueConfig, TranscriptionQueue};
pub use types::{
    Half, JobId, JobRequest, JobStatus, QueueEvent, QueueProgress, TranscriptionJob, split_parts,
};

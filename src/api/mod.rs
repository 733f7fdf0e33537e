mod client;
mod errors;
mod transcribe;
pub mod events;

pub use client::FunctionsClient;
pub use errors::{ApiError, Result};
pub use events::{ExtractEventsRequest, LiveEvent, extract_live_events};
pub use transcribe::HttpTranscriptionBackend;

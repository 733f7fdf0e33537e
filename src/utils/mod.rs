pub mod progress;
pub mod retry;

pub use progress::{SpeedCalculator, format_bytes, format_duration, format_speed};
pub use retry::{RetryConfig, RetryStrategy, retry, retry_with_config};

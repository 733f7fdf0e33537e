use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use crate::upload::{Result, UploadError};

/// 重试策略
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// 固定延迟
    Fixed(Duration),
    /// 指数退避
    Exponential {
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
    /// 线性退避
    Linear {
        initial: Duration,
        increment: Duration,
        max_delay: Duration,
    },
}

impl RetryStrategy {
    /// 计算第 n 次重试的延迟
    pub fn get_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Fixed(delay) => *delay,
            RetryStrategy::Exponential { initial, multiplier, max_delay } => {
                let delay = initial.as_secs_f64() * multiplier.powf(attempt as f64);
                let delay = Duration::from_secs_f64(delay);
                std::cmp::min(delay, *max_delay)
            }
            RetryStrategy::Linear { initial, increment, max_delay } => {
                let delay = *initial + (*increment * attempt);
                std::cmp::min(delay, *max_delay)
            }
        }
    }
}

/// 重试配置
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 重试策略
    pub strategy: RetryStrategy,
    /// 是否重试的判断函数
    pub should_retry: Box<dyn Fn(&UploadError) -> bool + Send + Sync>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::Fixed(Duration::from_secs(2)),
            should_retry: Box::new(|error| error.is_transient()),
        }
    }
}

impl RetryConfig {
    /// 分片上传用的配置：固定延迟，只重试瞬时错误
    pub fn for_chunks(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Fixed(delay),
            should_retry: Box::new(|error| error.is_transient()),
        }
    }
}

/// 执行带重试的操作
pub async fn retry_with_config<F, Fut, T>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                // 不可重试的错误直接上抛
                if !(config.should_retry)(&error) {
                    return Err(error);
                }

                last_error = Some(error);

                // 如果不是最后一次尝试，等待后重试
                if attempt < config.max_attempts - 1 {
                    let delay = config.strategy.get_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    // 所有重试都失败了
    Err(last_error.unwrap_or(UploadError::RetryLimitExceeded))
}

/// 使用默认配置执行重试
pub async fn retry<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_config(RetryConfig::default(), operation).await
}

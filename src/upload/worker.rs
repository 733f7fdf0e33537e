use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::utils::SpeedCalculator;
use crate::utils::retry::{RetryConfig, retry_with_config};
use super::errors::{Result, UploadError};
use super::transport::{ChunkSlice, ChunkTransport, ServerPhase, SessionMeta};
use super::types::{UploadConfig, UploadId, WorkerOutcome, WorkerUpdate};

/// 单个上传的执行任务
pub(crate) struct UploadWorker {
    pub(crate) upload_id: UploadId,
    pub(crate) transport: Arc<dyn ChunkTransport>,
    pub(crate) config: UploadConfig,
    /// 分片间检查，暂停不打断在途请求
    pub(crate) pause_token: CancellationToken,
    /// 取消会中止在途请求
    pub(crate) cancel_token: CancellationToken,
    pub(crate) update_tx: mpsc::UnboundedSender<WorkerUpdate>,
}

/// 执行任务的输入
pub(crate) struct WorkerTask {
    pub(crate) file_path: PathBuf,
    pub(crate) filename: String,
    pub(crate) total_bytes: u64,
    pub(crate) total_chunks: u32,
    /// 已有会话（恢复），否则先创建
    pub(crate) session_url: Option<String>,
}

impl UploadWorker {
    pub(crate) async fn run(self, task: WorkerTask) -> Result<WorkerOutcome> {
        let (session_url, mut next_chunk) = match task.session_url {
            Some(url) => {
                // 恢复：服务端已确认的分片数是权威来源
                let acked = self.transport.acked_chunks(&url).await?;
                (url, acked)
            }
            None => {
                let meta = SessionMeta {
                    filename: task.filename.clone(),
                    total_bytes: task.total_bytes,
                    total_chunks: task.total_chunks,
                    chunk_size: self.config.chunk_size,
                };

                let url = tokio::select! {
                    result = self.transport.create_session(&meta) => result?,
                    _ = self.cancel_token.cancelled() => return Ok(WorkerOutcome::Cancelled),
                };

                self.send(WorkerUpdate::SessionCreated {
                    upload_id: self.upload_id,
                    session_url: url.clone(),
                });

                (url, 0)
            }
        };

        if next_chunk > 0 {
            self.send(WorkerUpdate::Log {
                upload_id: self.upload_id,
                message: format!("Resuming from chunk {}/{}", next_chunk, task.total_chunks),
            });
        }

        let mut speed = SpeedCalculator::new();

        while next_chunk < task.total_chunks {
            if self.cancel_token.is_cancelled() {
                return Ok(WorkerOutcome::Cancelled);
            }
            if self.pause_token.is_cancelled() {
                return Ok(WorkerOutcome::Paused { next_chunk });
            }

            let offset = next_chunk as u64 * self.config.chunk_size;
            let chunk = ChunkSlice {
                file_path: task.file_path.clone(),
                index: next_chunk,
                offset,
                len: self.config.chunk_size.min(task.total_bytes - offset),
            };

            match self.dispatch_chunk(&session_url, &chunk).await {
                Ok(()) => {}
                Err(UploadError::Cancelled) => return Ok(WorkerOutcome::Cancelled),
                Err(err) => return Err(err),
            }

            next_chunk += 1;
            let uploaded_bytes = chunk.offset + chunk.len;
            speed.add_sample(uploaded_bytes);

            let remaining = task.total_bytes - uploaded_bytes;
            self.send(WorkerUpdate::ChunkAcked {
                upload_id: self.upload_id,
                acked_chunks: next_chunk,
                uploaded_bytes,
                speed_bps: speed.instant_speed(),
                eta: speed.estimate_eta(remaining),
            });
        }

        if self.cancel_token.is_cancelled() {
            return Ok(WorkerOutcome::Cancelled);
        }

        self.transport.finalize(&session_url).await?;
        self.send(WorkerUpdate::Log {
            upload_id: self.upload_id,
            message: "All chunks acknowledged, waiting for server processing".to_string(),
        });

        self.poll_processing(&session_url).await
    }

    /// 单个分片：有限次重试，取消可中止在途请求
    async fn dispatch_chunk(&self, session_url: &str, chunk: &ChunkSlice) -> Result<()> {
        let progress = {
            let update_tx = self.update_tx.clone();
            let upload_id = self.upload_id;
            let base = chunk.offset;
            Arc::new(move |sent: u64| {
                let _ = update_tx.send(WorkerUpdate::ChunkBytes {
                    upload_id,
                    uploaded_bytes: base + sent,
                });
            }) as Arc<dyn Fn(u64) + Send + Sync>
        };

        let retry_config = RetryConfig::for_chunks(self.config.max_retries, self.config.retry_delay);
        let attempt = || {
            let progress = progress.clone();
            self.transport.send_chunk(session_url, chunk, Some(progress))
        };

        tokio::select! {
            result = retry_with_config(retry_config, attempt) => result,
            _ = self.cancel_token.cancelled() => Err(UploadError::Cancelled),
        }
    }

    /// 轮询服务端后处理状态直到终态
    async fn poll_processing(&self, session_url: &str) -> Result<WorkerOutcome> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => return Ok(WorkerOutcome::Cancelled),
                _ = ticker.tick() => {
                    let status = match self.transport.processing_status(session_url).await {
                        Ok(status) => {
                            consecutive_failures = 0;
                            status
                        }
                        Err(err) if err.is_transient() => {
                            consecutive_failures += 1;
                            if consecutive_failures > self.config.max_retries {
                                return Err(err);
                            }
                            continue;
                        }
                        Err(err) => return Err(err),
                    };

                    let phase = status.phase;
                    let error = status.error.clone();
                    self.send(WorkerUpdate::Processing {
                        upload_id: self.upload_id,
                        status,
                    });

                    match phase {
                        ServerPhase::Completed => return Ok(WorkerOutcome::Completed),
                        ServerPhase::Failed => {
                            let message = error.unwrap_or_else(|| "Server-side processing failed".to_string());
                            return Err(UploadError::internal_error(message));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn send(&self, update: WorkerUpdate) {
        let _ = self.update_tx.send(update);
    }
}

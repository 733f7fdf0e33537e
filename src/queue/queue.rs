use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::api::{ApiError, Result as ApiResult};
use super::backend::{PartSpec, TranscribeRequest, Transcript, TranscriptionBackend};
use super::types::{
    JobId, JobRequest, JobStatus, QueueEvent, QueueProgress, TranscriptionJob, split_parts,
};

/// 队列配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 估算进度的轮询间隔
    pub poll_interval: Duration,
    /// 每 MB 预计转写秒数，只用于估算进度
    pub secs_per_mb: f64,
    pub language: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            secs_per_mb: 0.6,
            language: None,
        }
    }
}

struct QueueInner {
    jobs: Vec<TranscriptionJob>,
    processing: bool,
    cancel_token: CancellationToken,
}

/// 转写任务队列：严格按入队顺序逐个处理，全局同时只有一个活动任务
pub struct TranscriptionQueue {
    inner: Arc<Mutex<QueueInner>>,
    backend: Arc<dyn TranscriptionBackend>,
    config: QueueConfig,
    event_tx: broadcast::Sender<QueueEvent>,
}

impl TranscriptionQueue {
    pub fn new(backend: Arc<dyn TranscriptionBackend>, config: QueueConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                jobs: Vec::new(),
                processing: false,
                cancel_token: CancellationToken::new(),
            })),
            backend,
            config,
            event_tx,
        }
    }

    /// 入队，返回队列项 id
    pub async fn add_job(&self, request: JobRequest) -> JobId {
        let job = TranscriptionJob::new(request);
        let job_id = job.id;

        let mut inner = self.inner.lock().await;
        inner.jobs.push(job);
        drop(inner);

        let _ = self.event_tx.send(QueueEvent::JobAdded { job_id });
        job_id
    }

    /// 移除一个队列项；正在转写的项不能移除，返回 false
    pub async fn remove_job(&self, job_id: JobId) -> bool {
        let mut inner = self.inner.lock().await;

        let Some(position) = inner.jobs.iter().position(|j| j.id == job_id) else {
            return false;
        };
        if inner.jobs[position].status == JobStatus::Transcribing {
            return false;
        }

        inner.jobs.remove(position);
        true
    }

    /// 清空队列并协同中止工作循环
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.cancel_token.cancel();
        inner.cancel_token = CancellationToken::new();
        inner.jobs.clear();
        inner.processing = false;
        drop(inner);

        let _ = self.event_tx.send(QueueEvent::Cleared);
    }

    /// 启动处理循环；已经在处理中时是 no-op
    pub async fn start_processing(&self) {
        let mut inner = self.inner.lock().await;
        if inner.processing {
            return;
        }
        inner.processing = true;
        let token = inner.cancel_token.clone();
        drop(inner);

        let worker = QueueWorker {
            inner: self.inner.clone(),
            backend: self.backend.clone(),
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
            token,
        };
        tokio::spawn(worker.run());
    }

    /// 队列快照
    pub async fn jobs(&self) -> Vec<TranscriptionJob> {
        self.inner.lock().await.jobs.clone()
    }

    pub async fn job(&self, job_id: JobId) -> Option<TranscriptionJob> {
        self.inner.lock().await.jobs.iter().find(|j| j.id == job_id).cloned()
    }

    /// 队列整体进度
    pub async fn queue_progress(&self) -> QueueProgress {
        let inner = self.inner.lock().await;
        QueueProgress {
            completed: inner.jobs.iter().filter(|j| j.status == JobStatus::Completed).count(),
            failed: inner.jobs.iter().filter(|j| j.status == JobStatus::Failed).count(),
            total: inner.jobs.len(),
        }
    }

    /// 订阅队列事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }
}

struct QueueWorker {
    inner: Arc<Mutex<QueueInner>>,
    backend: Arc<dyn TranscriptionBackend>,
    config: QueueConfig,
    event_tx: broadcast::Sender<QueueEvent>,
    token: CancellationToken,
}

impl QueueWorker {
    async fn run(self) {
        loop {
            // 每轮循环前检查协同取消
            if self.token.is_cancelled() {
                return;
            }

            // 严格按入队顺序取下一个等待项
            let next = {
                let mut inner = self.inner.lock().await;
                match inner.jobs.iter_mut().find(|j| j.status == JobStatus::Pending) {
                    Some(job) => {
                        job.status = JobStatus::Transcribing;
                        job.message = "Starting transcription".to_string();
                        job.total_parts = split_parts(job.size_mb);
                        Some(job.clone())
                    }
                    None => {
                        inner.processing = false;
                        None
                    }
                }
            };

            let Some(job) = next else { return };
            let job_id = job.id;

            let _ = self.event_tx.send(QueueEvent::StatusChanged {
                job_id,
                from: JobStatus::Pending,
                to: JobStatus::Transcribing,
            });

            let result = self.process_job(&job).await;

            if self.token.is_cancelled() {
                // 清空发生在转写期间，队列项已不存在，不再写回
                return;
            }

            let to = {
                let mut inner = self.inner.lock().await;
                match inner.jobs.iter_mut().find(|j| j.id == job_id) {
                    Some(job) => match result {
                        Ok(transcript) => {
                            job.status = JobStatus::Completed;
                            job.estimated_progress = 100.0;
                            job.message = "Transcription complete".to_string();
                            job.text = Some(transcript.text);
                            job.srt = transcript.srt;
                            Some(JobStatus::Completed)
                        }
                        Err(err) => {
                            job.status = JobStatus::Failed;
                            job.message = "Transcription failed".to_string();
                            job.error = Some(err.to_string());
                            Some(JobStatus::Failed)
                        }
                    },
                    // 处理期间被移除（只可能是 clear，单项移除会被拒绝）
                    None => None,
                }
            };

            if let Some(to) = to {
                let _ = self.event_tx.send(QueueEvent::StatusChanged {
                    job_id,
                    from: JobStatus::Transcribing,
                    to,
                });
            }

            // 单项失败不阻塞队列，继续下一项
        }
    }

    /// 处理单个队列项：超阈值的文件按切分策略逐段转写
    async fn process_job(&self, job: &TranscriptionJob) -> ApiResult<Transcript> {
        let parts = split_parts(job.size_mb);

        match parts {
            None => self.process_part(job, None).await,
            Some(total) => {
                let mut combined_text = String::new();
                let mut combined_srt = String::new();
                let mut has_srt = false;

                for index in 1..=total {
                    if self.token.is_cancelled() {
                        return Err(ApiError::ParamError("Queue cleared".to_string()));
                    }

                    {
                        let mut inner = self.inner.lock().await;
                        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == job.id) {
                            job.current_part = Some(index);
                            job.message = format!("Transcribing part {}/{}", index, total);
                        }
                    }

                    let transcript = self
                        .process_part(job, Some(PartSpec { index, total }))
                        .await?;

                    if !combined_text.is_empty() {
                        combined_text.push('\n');
                    }
                    combined_text.push_str(&transcript.text);

                    if let Some(srt) = transcript.srt {
                        if !combined_srt.is_empty() {
                            combined_srt.push('\n');
                        }
                        combined_srt.push_str(&srt);
                        has_srt = true;
                    }
                }

                Ok(Transcript {
                    text: combined_text,
                    srt: has_srt.then_some(combined_srt),
                })
            }
        }
    }

    /// 单次转写调用，期间用轮询计数做线性的估算进度
    async fn process_part(&self, job: &TranscriptionJob, part: Option<PartSpec>) -> ApiResult<Transcript> {
        let band = match part {
            Some(spec) => {
                let span = 100.0 / spec.total as f64;
                let start = span * (spec.index - 1) as f64;
                (start, start + span)
            }
            None => (0.0, 100.0),
        };

        let part_mb = match part {
            Some(spec) => job.size_mb / spec.total as f64,
            None => job.size_mb,
        };
        let estimator = self.spawn_estimator(job.id, band, part_mb);

        let request = TranscribeRequest {
            video_url: job.video_url.clone(),
            file_name: job.file_name.clone(),
            half: job.half,
            part,
            language: self.config.language.clone(),
        };

        let result = self.backend.transcribe(&request).await;
        estimator.abort();

        if result.is_ok() {
            let mut inner = self.inner.lock().await;
            if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == job.id) {
                job.estimated_progress = job.estimated_progress.max(band.1.min(99.0));
            }
        }

        result
    }

    /// 估算进度：固定间隔轮询，按轮询次数线性外推，不是服务端的真实进度
    fn spawn_estimator(&self, job_id: JobId, band: (f64, f64), part_mb: f64) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let event_tx = self.event_tx.clone();
        let poll_interval = self.config.poll_interval;

        let expected_secs = (part_mb * self.config.secs_per_mb).max(10.0);
        let expected_polls = (expected_secs / poll_interval.as_secs_f64()).ceil().max(1.0);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval 的第一次 tick 立即返回，跳过
            ticker.tick().await;

            let mut polls = 0u32;
            loop {
                ticker.tick().await;
                polls += 1;

                // 线性外推，封顶 95% 等权威结果落地
                let projected = (polls as f64 / expected_polls).min(0.95);
                let estimate = band.0 + (band.1 - band.0) * projected;

                let value = {
                    let mut inner = inner.lock().await;
                    match inner.jobs.iter_mut().find(|j| j.id == job_id) {
                        Some(job) if job.status == JobStatus::Transcribing => {
                            job.estimated_progress = job.estimated_progress.max(estimate);
                            Some(job.estimated_progress)
                        }
                        _ => None,
                    }
                };

                match value {
                    Some(estimated_progress) => {
                        let _ = event_tx.send(QueueEvent::Progress { job_id, estimated_progress });
                    }
                    None => break,
                }
            }
        })
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::utils::format_bytes;
use super::errors::{Result, UploadError};
use super::pending::PendingStore;
use super::stage::overall_percent;
use super::transport::{ChunkTransport, ProcessingStatus, ServerPhase};
use super::types::{
    CoordinatorCommand, PendingUpload, ProgressSnapshot, TranscriptionSegment, UploadConfig,
    UploadEvent, UploadId, UploadRecord, UploadStage, WorkerOutcome, WorkerUpdate, chunk_count,
};
use super::worker::{UploadWorker, WorkerTask};

struct RecordHandle {
    record: UploadRecord,
    session_url: Option<String>,
    /// 恢复的记录可能带着与当前配置不同的分片大小
    chunk_size: u64,
    pause_token: Option<CancellationToken>,
    cancel_token: Option<CancellationToken>,
    join_handle: Option<JoinHandle<Result<WorkerOutcome>>>,
}

impl RecordHandle {
    fn active(&self) -> bool {
        self.join_handle.is_some()
    }
}

pub(crate) struct CoordinatorWorker {
    transport: Arc<dyn ChunkTransport>,
    config: UploadConfig,
    records: HashMap<UploadId, RecordHandle>,
    pending: PendingStore,
    event_tx: broadcast::Sender<UploadEvent>,
    update_tx: mpsc::UnboundedSender<WorkerUpdate>,
    update_rx: mpsc::UnboundedReceiver<WorkerUpdate>,
}

impl CoordinatorWorker {
    pub(crate) async fn run(
        transport: Arc<dyn ChunkTransport>,
        config: UploadConfig,
        mut command_rx: mpsc::Receiver<CoordinatorCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let pending = match PendingStore::load(config.state_file.clone()).await {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!("Failed to restore pending uploads: {}", err);
                PendingStore::new(config.state_file.clone())
            }
        };

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            transport,
            config,
            records: HashMap::new(),
            pending,
            event_tx,
            update_tx,
            update_rx,
        };

        worker.restore_pending();

        // 主事件循环
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => worker.handle_command(command).await,
                        None => break,
                    }
                }
                Some(update) = worker.update_rx.recv() => {
                    worker.handle_update(update).await;
                }
            }

            if let Err(err) = worker.pending.save().await {
                tracing::warn!("Failed to save pending uploads: {}", err);
            }
        }
    }

    /// 重启后把可恢复记录还原成 Paused 状态
    fn restore_pending(&mut self) {
        for entry in self.pending.list() {
            let mut record = UploadRecord::new(
                entry.upload_id,
                entry.file_path.clone(),
                entry.filename.clone(),
                entry.total_bytes,
                entry.total_chunks,
            );
            record.stage = UploadStage::Paused;
            record.current_chunk = entry.uploaded_chunks;
            record.uploaded_bytes =
                (entry.uploaded_chunks as u64 * entry.chunk_size).min(entry.total_bytes);
            record.push_log("Restored unfinished upload from saved state");
            recompute_percent(&mut record);

            self.records.insert(entry.upload_id, RecordHandle {
                record,
                session_url: Some(entry.session_url),
                chunk_size: entry.chunk_size,
                pause_token: None,
                cancel_token: None,
                join_handle: None,
            });
        }
    }

    async fn handle_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::StartUpload { file_path, reply } => {
                let result = self.start_upload(file_path).await;
                let _ = reply.send(result);
            }
            CoordinatorCommand::Pause { upload_id, reply } => {
                let _ = reply.send(self.pause_upload(upload_id));
            }
            CoordinatorCommand::Resume { upload_id, reply } => {
                let _ = reply.send(self.resume_upload(upload_id));
            }
            CoordinatorCommand::Cancel { upload_id, reply } => {
                let _ = reply.send(self.cancel_upload(upload_id).await);
            }
            CoordinatorCommand::Clear { upload_id, reply } => {
                let _ = reply.send(self.clear_upload(upload_id).await);
            }
            CoordinatorCommand::GetRecord { upload_id, reply } => {
                let record = self.records.get(&upload_id).map(|h| h.record.clone());
                let _ = reply.send(record);
            }
            CoordinatorCommand::GetAllRecords { reply } => {
                let records: Vec<_> = self.records.values().map(|h| h.record.clone()).collect();
                let _ = reply.send(records);
            }
            CoordinatorCommand::GetPending { reply } => {
                let _ = reply.send(self.pending.list());
            }
        }
    }

    async fn start_upload(&mut self, file_path: PathBuf) -> Result<UploadId> {
        let metadata = tokio::fs::metadata(&file_path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Validation("Not a regular file".to_string()));
        }

        let total_bytes = metadata.len();
        if total_bytes == 0 {
            return Err(UploadError::Validation("File is empty".to_string()));
        }
        if total_bytes > self.config.max_file_size {
            return Err(UploadError::Validation(format!(
                "File exceeds the {} limit",
                format_bytes(self.config.max_file_size)
            )));
        }

        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.config.allowed_extensions.contains(&extension) {
            return Err(UploadError::Validation(format!(
                "Unsupported file type: .{}",
                extension
            )));
        }

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Validation("Filename is not valid UTF-8".to_string()))?
            .to_string();

        let upload_id = UploadId::new();
        let total_chunks = chunk_count(total_bytes, self.config.chunk_size);

        let mut record = UploadRecord::new(upload_id, file_path, filename, total_bytes, total_chunks);
        record.stage = UploadStage::Preparing;
        record.started_at = Some(chrono::Utc::now());
        record.push_log(format!(
            "Upload created: {} in {} chunks",
            format_bytes(total_bytes),
            total_chunks
        ));

        self.records.insert(upload_id, RecordHandle {
            record,
            session_url: None,
            chunk_size: self.config.chunk_size,
            pause_token: None,
            cancel_token: None,
            join_handle: None,
        });

        self.emit_stage_change(upload_id, UploadStage::Idle, UploadStage::Preparing);
        self.spawn_worker(upload_id);

        Ok(upload_id)
    }

    fn pause_upload(&mut self, upload_id: UploadId) -> Result<()> {
        let handle = self.records.get(&upload_id)
            .ok_or_else(|| UploadError::ParamError("Upload not found".to_string()))?;

        match handle.record.stage {
            UploadStage::Preparing | UploadStage::Uploading => {
                if let Some(token) = &handle.pause_token {
                    // 分片间生效；状态在工作任务退出时落到 Paused
                    token.cancel();
                    Ok(())
                } else {
                    Err(UploadError::internal_error("No active worker to pause"))
                }
            }
            stage => Err(UploadError::ParamError(format!("Cannot pause upload in stage {:?}", stage))),
        }
    }

    fn resume_upload(&mut self, upload_id: UploadId) -> Result<()> {
        let handle = self.records.get(&upload_id)
            .ok_or_else(|| UploadError::ParamError("Upload not found".to_string()))?;

        match handle.record.stage {
            UploadStage::Paused if !handle.active() => {
                let from = handle.record.stage;
                let to = if handle.session_url.is_some() {
                    UploadStage::Uploading
                } else {
                    UploadStage::Preparing
                };

                let handle = self.records.get_mut(&upload_id).unwrap();
                handle.record.stage = to;
                handle.record.push_log("Upload resumed");

                self.emit_stage_change(upload_id, from, to);
                self.spawn_worker(upload_id);
                Ok(())
            }
            UploadStage::Paused => {
                Err(UploadError::ParamError("Pause is still settling, retry shortly".to_string()))
            }
            stage => Err(UploadError::ParamError(format!("Cannot resume upload in stage {:?}", stage))),
        }
    }

    async fn cancel_upload(&mut self, upload_id: UploadId) -> Result<()> {
        let handle = self.records.get_mut(&upload_id)
            .ok_or_else(|| UploadError::ParamError("Upload not found".to_string()))?;

        if handle.record.stage.is_terminal() {
            return Err(UploadError::ParamError(format!(
                "Cannot cancel upload in stage {:?}",
                handle.record.stage
            )));
        }

        if let Some(token) = &handle.cancel_token {
            // 工作任务退出后在 Finished 分支做收尾
            token.cancel();
            return Ok(());
        }

        // 没有活动的工作任务（例如 Paused），直接收尾
        let from = handle.record.stage;
        handle.record.stage = UploadStage::Cancelled;
        handle.record.push_log("Upload cancelled");
        let session_url = handle.session_url.clone();

        self.emit_stage_change(upload_id, from, UploadStage::Cancelled);
        self.discard_session(session_url).await;
        self.pending.remove(&upload_id);

        Ok(())
    }

    async fn clear_upload(&mut self, upload_id: UploadId) -> Result<()> {
        let handle = self.records.remove(&upload_id)
            .ok_or_else(|| UploadError::ParamError("Upload not found".to_string()))?;

        if let Some(token) = &handle.cancel_token {
            token.cancel();
        }
        if !handle.record.stage.is_terminal() {
            self.discard_session(handle.session_url.clone()).await;
        }
        self.pending.remove(&upload_id);

        Ok(())
    }

    fn spawn_worker(&mut self, upload_id: UploadId) {
        let handle = match self.records.get_mut(&upload_id) {
            Some(h) => h,
            None => return,
        };

        let pause_token = CancellationToken::new();
        let cancel_token = CancellationToken::new();
        handle.pause_token = Some(pause_token.clone());
        handle.cancel_token = Some(cancel_token.clone());

        let mut config = self.config.clone();
        config.chunk_size = handle.chunk_size;

        let worker = UploadWorker {
            upload_id,
            transport: self.transport.clone(),
            config,
            pause_token,
            cancel_token,
            update_tx: self.update_tx.clone(),
        };

        let task = WorkerTask {
            file_path: handle.record.file_path.clone(),
            filename: handle.record.filename.clone(),
            total_bytes: handle.record.total_bytes,
            total_chunks: handle.record.total_chunks,
            session_url: handle.session_url.clone(),
        };

        let update_tx = self.update_tx.clone();
        handle.join_handle = Some(tokio::spawn(async move {
            let result = worker.run(task).await;
            // 唤醒协调器收尾
            let _ = update_tx.send(WorkerUpdate::Finished { upload_id });
            result
        }));
    }

    async fn handle_update(&mut self, update: WorkerUpdate) {
        match update {
            WorkerUpdate::SessionCreated { upload_id, session_url } => {
                if let Some(handle) = self.records.get_mut(&upload_id) {
                    handle.session_url = Some(session_url);
                    let from = handle.record.stage;
                    handle.record.stage = UploadStage::Uploading;
                    handle.record.push_log("Upload session created");
                    recompute_percent(&mut handle.record);
                    self.emit_stage_change(upload_id, from, UploadStage::Uploading);
                }
            }
            WorkerUpdate::ChunkBytes { upload_id, uploaded_bytes } => {
                if let Some(handle) = self.records.get_mut(&upload_id) {
                    let capped = uploaded_bytes.min(handle.record.total_bytes);
                    handle.record.uploaded_bytes = handle.record.uploaded_bytes.max(capped);
                    recompute_percent(&mut handle.record);
                }
            }
            WorkerUpdate::ChunkAcked { upload_id, acked_chunks, uploaded_bytes, speed_bps, eta } => {
                if let Some(handle) = self.records.get_mut(&upload_id) {
                    handle.record.current_chunk = acked_chunks.min(handle.record.total_chunks);
                    handle.record.uploaded_bytes =
                        handle.record.uploaded_bytes.max(uploaded_bytes.min(handle.record.total_bytes));
                    handle.record.speed_bps = speed_bps;
                    handle.record.eta = eta;
                    recompute_percent(&mut handle.record);

                    // 第一个分片确认时建立可恢复记录，之后每次确认更新
                    if let Some(session_url) = &handle.session_url {
                        self.pending.upsert(PendingUpload {
                            upload_id,
                            filename: handle.record.filename.clone(),
                            file_path: handle.record.file_path.clone(),
                            session_url: session_url.clone(),
                            uploaded_chunks: acked_chunks,
                            total_chunks: handle.record.total_chunks,
                            total_bytes: handle.record.total_bytes,
                            chunk_size: handle.chunk_size,
                        });
                    }

                    self.emit_progress(upload_id);
                }
            }
            WorkerUpdate::Processing { upload_id, status } => {
                self.apply_processing_status(upload_id, status);
            }
            WorkerUpdate::Log { upload_id, message } => {
                if let Some(handle) = self.records.get_mut(&upload_id) {
                    handle.record.push_log(message);
                }
            }
            WorkerUpdate::Finished { upload_id } => {
                self.handle_finished(upload_id).await;
            }
        }
    }

    fn apply_processing_status(&mut self, upload_id: UploadId, status: ProcessingStatus) {
        let handle = match self.records.get_mut(&upload_id) {
            Some(h) => h,
            None => return,
        };

        // 终态由 Finished 分支统一收尾
        if matches!(status.phase, ServerPhase::Completed | ServerPhase::Failed) {
            return;
        }

        let from = handle.record.stage;
        let to = UploadStage::from(status.phase);

        handle.record.conversion_progress =
            status.conversion_progress.or(handle.record.conversion_progress);
        handle.record.transcription_progress =
            status.transcription_progress.or(handle.record.transcription_progress);
        if let (Some(current), Some(total)) = (status.segment_current, status.segment_total) {
            handle.record.transcription_segment = Some(TranscriptionSegment { current, total });
        }

        if from != to {
            handle.record.stage = to;
            handle.record.push_log(stage_log_line(to));
            recompute_percent(&mut handle.record);
            self.emit_stage_change(upload_id, from, to);
        } else {
            recompute_percent(&mut handle.record);
        }

        self.emit_progress(upload_id);
    }

    async fn handle_finished(&mut self, upload_id: UploadId) {
        let handle = match self.records.get_mut(&upload_id) {
            Some(h) => h,
            None => return,
        };

        let join_handle = match handle.join_handle.take() {
            Some(h) => h,
            None => return,
        };
        handle.pause_token = None;
        handle.cancel_token = None;

        let from = handle.record.stage;
        match join_handle.await {
            Ok(Ok(WorkerOutcome::Completed)) => {
                handle.record.stage = UploadStage::Completed;
                handle.record.uploaded_bytes = handle.record.total_bytes;
                handle.record.current_chunk = handle.record.total_chunks;
                handle.record.overall_percent = 100.0;
                handle.record.completed_at = Some(chrono::Utc::now());
                handle.record.push_log("Processing complete");

                self.pending.remove(&upload_id);
                self.emit_stage_change(upload_id, from, UploadStage::Completed);
                let _ = self.event_tx.send(UploadEvent::Completed { upload_id });
            }
            Ok(Ok(WorkerOutcome::Paused { next_chunk })) => {
                handle.record.stage = UploadStage::Paused;
                handle.record.current_chunk = next_chunk;
                handle.record.push_log("Upload paused");
                self.emit_stage_change(upload_id, from, UploadStage::Paused);
            }
            Ok(Ok(WorkerOutcome::Cancelled)) => {
                handle.record.stage = UploadStage::Cancelled;
                handle.record.push_log("Upload cancelled");
                let session_url = handle.session_url.clone();

                self.pending.remove(&upload_id);
                self.emit_stage_change(upload_id, from, UploadStage::Cancelled);
                self.discard_session(session_url).await;
            }
            Ok(Err(err)) => {
                let message = err.to_string();
                handle.record.stage = UploadStage::Failed;
                handle.record.error = Some(message.clone());
                handle.record.push_log(format!("Upload failed: {}", message));

                self.emit_stage_change(upload_id, from, UploadStage::Failed);
                let _ = self.event_tx.send(UploadEvent::Failed { upload_id, error: message });
            }
            Err(err) => {
                let message = format!("Upload task panicked: {}", err);
                handle.record.stage = UploadStage::Failed;
                handle.record.error = Some(message.clone());

                self.emit_stage_change(upload_id, from, UploadStage::Failed);
                let _ = self.event_tx.send(UploadEvent::Failed { upload_id, error: message });
            }
        }
    }

    async fn discard_session(&self, session_url: Option<String>) {
        if let Some(url) = session_url {
            if let Err(err) = self.transport.discard(&url).await {
                tracing::warn!("Failed to discard upload session {}: {}", url, err);
            }
        }
    }

    fn emit_stage_change(&self, upload_id: UploadId, from: UploadStage, to: UploadStage) {
        let _ = self.event_tx.send(UploadEvent::StageChanged { upload_id, from, to });
    }

    fn emit_progress(&self, upload_id: UploadId) {
        if let Some(handle) = self.records.get(&upload_id) {
            let record = &handle.record;
            let _ = self.event_tx.send(UploadEvent::Progress {
                upload_id,
                progress: ProgressSnapshot {
                    uploaded_bytes: record.uploaded_bytes,
                    total_bytes: record.total_bytes,
                    current_chunk: record.current_chunk,
                    total_chunks: record.total_chunks,
                    speed_bps: record.speed_bps,
                    eta: record.eta,
                    overall_percent: record.overall_percent,
                },
            });
        }
    }
}

/// 总体百分比对历史值取 max，保证单调
fn recompute_percent(record: &mut UploadRecord) {
    let fraction = if record.total_bytes > 0 {
        record.uploaded_bytes as f64 / record.total_bytes as f64
    } else {
        0.0
    };

    let percent = overall_percent(
        record.stage,
        fraction,
        record.conversion_progress,
        record.transcription_progress,
    );
    record.overall_percent = record.overall_percent.max(percent);
}

fn stage_log_line(stage: UploadStage) -> &'static str {
    match stage {
        UploadStage::Assembling => "Assembling chunks on server",
        UploadStage::Converting => "Converting video",
        UploadStage::Extracting => "Extracting audio track",
        UploadStage::Segmenting => "Segmenting audio",
        UploadStage::Transcribing => "Transcribing audio",
        _ => "Processing",
    }
}

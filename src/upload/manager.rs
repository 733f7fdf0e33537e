use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use super::errors::{Result, UploadError};
use super::manager_worker::CoordinatorWorker;
use super::transport::ChunkTransport;
use super::types::{CoordinatorCommand, PendingUpload, UploadConfig, UploadEvent, UploadId, UploadRecord};

/// 上传协调器句柄
#[derive(Clone)]
pub struct UploadCoordinator {
    command_tx: mpsc::Sender<CoordinatorCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// 协调器与其工作循环
pub struct UploadCoordinatorHandle {
    pub coordinator: UploadCoordinator,
    pub worker_handle: JoinHandle<()>,
}

impl UploadCoordinatorHandle {
    pub async fn shutdown(self) -> Result<()> {
        drop(self.coordinator);
        self.worker_handle.await
            .map_err(|err| UploadError::internal_error(format!("Coordinator panic: {}", err)))
    }
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn ChunkTransport>, config: UploadConfig) -> UploadCoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        // 最大缓存 256 个事件
        let (event_tx, _) = broadcast::channel(256);

        let worker_handle = tokio::spawn(CoordinatorWorker::run(
            transport,
            config,
            command_rx,
            event_tx.clone(),
        ));

        let coordinator = Self {
            command_tx,
            event_tx,
        };

        UploadCoordinatorHandle {
            coordinator,
            worker_handle,
        }
    }

    /// 开始一个新上传（校验文件后立即进入 Preparing）
    pub async fn start_upload(&self, file_path: impl Into<PathBuf>) -> Result<UploadId> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::StartUpload {
                file_path: file_path.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))?
    }

    /// 暂停：分片间生效，不丢弃任何状态
    pub async fn pause(&self, upload_id: UploadId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Pause { upload_id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))?
    }

    /// 恢复：从服务端确认的分片数继续
    pub async fn resume(&self, upload_id: UploadId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Resume { upload_id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))?
    }

    /// 取消并丢弃服务端的部分状态
    pub async fn cancel(&self, upload_id: UploadId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Cancel { upload_id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))?
    }

    /// 清除记录与可恢复状态
    pub async fn clear(&self, upload_id: UploadId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Clear { upload_id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))?
    }

    /// 获取单个上传状态快照
    pub async fn record(&self, upload_id: UploadId) -> Result<Option<UploadRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::GetRecord { upload_id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))
    }

    /// 获取所有上传状态快照
    pub async fn records(&self) -> Result<Vec<UploadRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::GetAllRecords { reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))
    }

    /// 获取可恢复的上传列表
    pub async fn pending_uploads(&self) -> Result<Vec<PendingUpload>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::GetPending { reply: reply_tx })
            .await
            .map_err(|_| UploadError::internal_error("Coordinator shut down"))?;

        reply_rx
            .await
            .map_err(|err| UploadError::internal_error(err.to_string()))
    }

    /// 订阅事件
    ///
    /// 注意：接收速度跟不上发送速度时可能丢事件（lagged error），
    /// 订阅者应尽快处理
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }
}

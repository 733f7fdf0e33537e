use std::collections::HashMap;
use std::path::PathBuf;
use super::errors::Result;
use super::types::{PendingUpload, UploadId};

/// 待恢复上传的持久化存储
///
/// 记录在第一个分片确认时创建，每次确认后重写，完成/取消/清除时删除。
/// 没有配置文件路径时退化为纯内存表。
pub struct PendingStore {
    path: Option<PathBuf>,
    entries: HashMap<UploadId, PendingUpload>,
}

impl PendingStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            entries: HashMap::new(),
        }
    }

    /// 从磁盘恢复
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);

        if let Some(state_file) = &store.path {
            if state_file.exists() {
                let data = tokio::fs::read_to_string(state_file).await?;
                let pending: Vec<PendingUpload> = serde_json::from_str(&data)?;
                for entry in pending {
                    store.entries.insert(entry.upload_id, entry);
                }
            }
        }

        Ok(store)
    }

    pub fn get(&self, upload_id: &UploadId) -> Option<&PendingUpload> {
        self.entries.get(upload_id)
    }

    pub fn list(&self) -> Vec<PendingUpload> {
        self.entries.values().cloned().collect()
    }

    pub fn upsert(&mut self, entry: PendingUpload) {
        self.entries.insert(entry.upload_id, entry);
    }

    pub fn remove(&mut self, upload_id: &UploadId) -> bool {
        self.entries.remove(upload_id).is_some()
    }

    /// 写回磁盘
    pub async fn save(&self) -> Result<()> {
        if let Some(state_file) = &self.path {
            let entries: Vec<_> = self.entries.values().collect();
            let data = serde_json::to_string_pretty(&entries)?;
            tokio::fs::write(state_file, data).await?;
        }

        Ok(())
    }
}

use std::path::{Path, PathBuf};
use anyhow::Context;
use serde::Deserialize;

/// 运行配置，显式持有、按需传递，不放全局
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// 分片上传端点
    pub upload_endpoint: String,
    /// 托管函数基地址
    pub functions_base: String,
    pub token: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 待恢复上传的持久化文件
    pub state_file: Option<PathBuf>,
    /// 演示二进制要上传的文件
    pub file_path: Option<PathBuf>,
}

fn default_chunk_size() -> u64 {
    5 * 1024 * 1024
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            upload_endpoint = "https://media.example.com/uploads"
            functions_base = "https://api.example.com/functions/v1"
            token = "Bearer test-token"
            "#,
        )
        .unwrap();

        assert!(config.upload_endpoint.starts_with("http"));
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert!(config.state_file.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            upload_endpoint = "https://media.example.com/uploads"
            functions_base = "https://api.example.com/functions/v1"
            token = "Bearer test-token"
            chunk_size = 1048576
            state_file = "pending_uploads.json"
            file_path = "match_first_half.mp4"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 1048576);
        assert_eq!(config.state_file.unwrap(), PathBuf::from("pending_uploads.json"));
    }
}

use std::io::SeekFrom;
use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use url::Url;
use super::errors::{Result, UploadError};
use super::progress_stream::CountingStream;
use super::transport::{ChunkProgressFn, ChunkSlice, ChunkTransport, ProcessingStatus, SessionMeta};

/// 分片上传的 HTTP 客户端
///
/// 协议：
/// - `POST {endpoint}` 创建会话，`Location` 头返回会话地址
/// - `HEAD {session}` 读取 `Upload-Offset` 得到已确认字节数
/// - `PATCH {session}` 携带 `Upload-Offset` 发送一个分片
/// - `POST {session}/complete` 触发服务端合并与后处理
/// - `GET {session}/status` 轮询处理进度
/// - `DELETE {session}` 丢弃部分状态
#[derive(Debug, Clone)]
pub struct HttpChunkTransport {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpChunkTransport {
    pub fn new(endpoint: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        }
    }

    fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_str(&self.token)?);
        Ok(headers)
    }

    /// `filename <base64>` 形式的元数据头
    fn metadata_header(meta: &SessionMeta) -> String {
        format!("filename {}", BASE64_STANDARD.encode(&meta.filename))
    }

    fn parse_offset_header(status: u16, headers: &HeaderMap) -> Result<u64> {
        match headers.get("Upload-Offset") {
            Some(value) => {
                let offset = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| {
                        UploadError::server_error(status, "Malformed 'Upload-Offset' header")
                    })?;

                Ok(offset)
            }
            None => Err(UploadError::server_error(status, "No 'Upload-Offset' header in response")),
        }
    }

    /// Location 可能是相对路径，用创建接口的 origin 补全
    fn resolve_location(&self, location: &str) -> Result<String> {
        if location.starts_with("http") {
            return Ok(location.to_string());
        }

        let url = Url::parse(&self.endpoint)
            .map_err(|_| UploadError::ParamError(format!("Invalid endpoint: {:?}", self.endpoint)))?;
        let origin = url.origin().ascii_serialization();

        Ok(format!("{}{}", origin, location))
    }
}

#[async_trait]
impl ChunkTransport for HttpChunkTransport {
    async fn create_session(&self, meta: &SessionMeta) -> Result<String> {
        let mut headers = self.base_headers()?;
        headers.insert("Upload-Length", HeaderValue::from_str(&meta.total_bytes.to_string())?);
        headers.insert("Upload-Chunk-Size", HeaderValue::from_str(&meta.chunk_size.to_string())?);
        headers.insert("Upload-Metadata", HeaderValue::from_str(&Self::metadata_header(meta))?);

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(UploadError::server_error(
                response.status().as_u16(),
                "Failed to create upload session",
            ));
        }

        let location = match response.headers().get("location") {
            Some(loc) => loc
                .to_str()
                .map_err(|_| {
                    UploadError::server_error(response.status().as_u16(), "Malformed 'location' header")
                })?
                .to_string(),
            None => {
                return Err(UploadError::server_error(
                    response.status().as_u16(),
                    "No 'location' header in response",
                ));
            }
        };

        self.resolve_location(&location)
    }

    async fn acked_chunks(&self, session_url: &str) -> Result<u32> {
        let headers = self.base_headers()?;
        let response = self.client.head(session_url).headers(headers).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            // 服务端已不认识这个会话，必须重新上传
            return Err(UploadError::SessionExpired);
        }
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(UploadError::server_error(status.as_u16(), "Failed to query upload offset"));
        }

        let offset = Self::parse_offset_header(status.as_u16(), response.headers())?;
        let chunk_size = match response.headers().get("Upload-Chunk-Size") {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| {
                    UploadError::server_error(status.as_u16(), "Malformed 'Upload-Chunk-Size' header")
                })?,
            None => return Err(UploadError::server_error(status.as_u16(), "No 'Upload-Chunk-Size' header")),
        };

        Ok((offset / chunk_size.max(1)) as u32)
    }

    async fn send_chunk(
        &self,
        session_url: &str,
        chunk: &ChunkSlice,
        progress: Option<ChunkProgressFn>,
    ) -> Result<()> {
        let mut file = File::open(&chunk.file_path).await?;
        file.seek(SeekFrom::Start(chunk.offset)).await?;
        let limited = file.take(chunk.len);

        // 64KB 读块，分片内也能持续出进度样本
        let reader_stream = ReaderStream::with_capacity(limited, 64 * 1024);
        let body = match progress {
            Some(callback) => {
                let counting = CountingStream::new(reader_stream, callback);
                reqwest::Body::wrap_stream(counting)
            }
            None => reqwest::Body::wrap_stream(reader_stream),
        };

        let mut headers = self.base_headers()?;
        headers.insert("Upload-Offset", HeaderValue::from_str(&chunk.offset.to_string())?);
        headers.insert("Content-Length", HeaderValue::from_str(&chunk.len.to_string())?);
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/offset+octet-stream"),
        );

        let response = self
            .client
            .patch(session_url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(UploadError::SessionExpired);
        }
        if status != StatusCode::NO_CONTENT {
            return Err(UploadError::server_error(
                status.as_u16(),
                format!("Failed to send chunk {}", chunk.index),
            ));
        }

        // 校验服务端偏移量推进到了分片末尾
        let next_offset = Self::parse_offset_header(status.as_u16(), response.headers())?;
        let expected = chunk.offset + chunk.len;
        if next_offset != expected {
            return Err(UploadError::server_error(
                status.as_u16(),
                format!("Chunk {} offset mismatch: expected {}, got {}", chunk.index, expected, next_offset),
            ));
        }

        Ok(())
    }

    async fn finalize(&self, session_url: &str) -> Result<()> {
        let headers = self.base_headers()?;
        let response = self
            .client
            .post(format!("{}/complete", session_url))
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(status.as_u16(), "Failed to finalize upload"));
        }

        Ok(())
    }

    async fn processing_status(&self, session_url: &str) -> Result<ProcessingStatus> {
        let headers = self.base_headers()?;
        let response = self
            .client
            .get(format!("{}/status", session_url))
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(status.as_u16(), "Failed to query processing status"));
        }

        let parsed = response.json::<ProcessingStatus>().await?;
        Ok(parsed)
    }

    async fn discard(&self, session_url: &str) -> Result<()> {
        let headers = self.base_headers()?;
        let response = self
            .client
            .delete(session_url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        // 会话已不存在视为丢弃成功
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(UploadError::server_error(status.as_u16(), "Failed to discard upload session"));
        }

        Ok(())
    }
}

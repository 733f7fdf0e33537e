use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;
use super::errors::{ApiError, Result};

/// 服务端函数的统一响应包装：
/// 成功是 `{success: true, ...payload}`，失败是 `{error: "..."}`
#[derive(Deserialize)]
struct Envelope<T> {
    success: Option<bool>,
    error: Option<String>,
    #[serde(flatten)]
    payload: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// 托管函数（Deno 风格 serverless handler）的调用客户端
#[derive(Debug, Clone)]
pub struct FunctionsClient {
    client: Client,
    base: Url,
    token: String,
}

impl FunctionsClient {
    pub fn new(base: &str, token: &str) -> Result<Self> {
        // join 需要以 / 结尾的基地址
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let base = Url::parse(&normalized)
            .map_err(|_| ApiError::ParamError(format!("Invalid base url: {:?}", base)))?;

        Ok(Self {
            client: Client::new(),
            base,
            token: token.to_string(),
        })
    }

    /// 调用单个函数，做状态码映射与包装解包
    pub async fn invoke<B, T>(&self, function: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(function)
            .map_err(|_| ApiError::ParamError(format!("Invalid function name: {:?}", function)))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(ApiError::RateLimited),
            StatusCode::PAYMENT_REQUIRED => return Err(ApiError::PaymentRequired),
            StatusCode::PAYLOAD_TOO_LARGE => return Err(ApiError::FileTooLarge),
            _ => {}
        }

        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.error.or(body.message))
                .unwrap_or_else(|| format!("Function '{}' failed", function));
            return Err(ApiError::function_error(status.as_u16(), message));
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|err| ApiError::Payload(err.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(ApiError::function_error(status.as_u16(), error));
        }
        if envelope.success == Some(false) {
            return Err(ApiError::function_error(
                status.as_u16(),
                format!("Function '{}' reported failure", function),
            ));
        }

        Ok(envelope.payload)
    }
}

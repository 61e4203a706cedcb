use thiserror::Error;
use std::io;

use super::request::ResponseMeta;

/// HTTP 会话层错误
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("请求编码失败: {0}")]
    Encoding(String),

    #[error("响应类型不符: 收到 {received}, 期望 {expected}")]
    ContentType {
        received: String,
        expected: String,
    },

    #[error("响应校验失败: 状态码 {status}, MIME {mime}")]
    Validation {
        status: u16,
        mime: String,
    },

    #[error("响应解析失败: {0}")]
    Parse(String),

    #[error("网络错误: {0}")]
    Transport(String),

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("请求超时")]
    Timeout,

    #[error("任务被取消")]
    Cancelled,

    #[error("会话已失效")]
    SessionInvalidated,
}

impl HttpError {
    /// 是否为传输层错误（网络、超时、取消）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HttpError::Transport(_) | HttpError::Io(_) | HttpError::Timeout | HttpError::Cancelled
        )
    }

    /// 是否为取消类错误
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HttpError::Cancelled | HttpError::SessionInvalidated)
    }

    /// 是否为响应校验错误（状态码/MIME 超出会话配置）
    pub fn is_validation(&self) -> bool {
        matches!(self, HttpError::Validation { .. })
    }

    /// 是否在请求提交前就已失败（从未到达传输层）
    pub fn is_pre_submit(&self) -> bool {
        matches!(self, HttpError::InvalidUrl(_) | HttpError::Encoding(_))
    }
}

impl From<String> for HttpError {
    fn from(error: String) -> Self {
        HttpError::Transport(error)
    }
}

impl From<&str> for HttpError {
    fn from(error: &str) -> Self {
        HttpError::Transport(error.to_string())
    }
}

/// 成功完成：校验通过的响应，可能不带值（空响应体）
#[derive(Debug)]
pub struct Fetched<T> {
    pub value: Option<T>,
    pub response: ResponseMeta,
}

/// 失败完成：错误加上可能已收到的响应元数据
#[derive(Error, Debug)]
#[error("{error}")]
pub struct HttpFailure {
    pub response: Option<ResponseMeta>,
    pub error: HttpError,
}

impl From<HttpError> for HttpFailure {
    fn from(error: HttpError) -> Self {
        HttpFailure { response: None, error }
    }
}

/// 每次完成恰好是 {值, 错误} 之一
pub type HttpResult<T> = Result<Fetched<T>, HttpFailure>;

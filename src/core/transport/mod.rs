//! 传输层接缝：会话编排器只认这里定义的事件和提交接口，
//! 字节怎么在套接字上流动不归本层管。

pub mod awc;

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;

use super::bridge::DelegateBridge;
use super::error::HttpError;
use super::request::{BuiltRequest, ResponseMeta};

/// 任务标识：由传输层在任务创建时分配，仅在并发存活的任务间唯一，
/// 完成后可被复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// 认证凭据
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// 认证质询的处置方式
#[derive(Debug)]
pub enum ChallengeDisposition {
    UseCredential(Credential),
    PerformDefaultHandling,
    Cancel,
}

/// 响应元数据到达后的处置方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Allow,
    Cancel,
}

pub type ChallengeReply = oneshot::Sender<ChallengeDisposition>;
pub type ResponseReply = oneshot::Sender<ResponseDisposition>;

/// 认证质询
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub url: Url,
    pub scheme: String,
    pub realm: Option<String>,
    /// 本任务已失败的认证尝试次数
    pub previous_failures: u32,
}

/// 传输层事件（同一任务内有序，跨任务自由交错）
#[derive(Debug)]
pub enum TransportEvent {
    /// 元数据之前可能出现零或多次
    Challenge {
        challenge: AuthChallenge,
        reply: ChallengeReply,
    },
    Metadata {
        response: ResponseMeta,
        reply: ResponseReply,
    },
    /// 数据型任务的响应体分片
    Data { chunk: Bytes },
    /// (本次字节数, 累计字节数, 预期总字节数; 未知为 -1)
    Progress { bytes: i64, total: i64, expected: i64 },
    /// 下载型任务已落盘
    DownloadFinished { location: PathBuf },
    /// 终态，每个任务恰好一次
    Completed { error: Option<HttpError> },
}

/// 任务提交形态
#[derive(Debug, Clone)]
pub enum SubmitMode {
    Data,
    Download { destination: PathBuf },
}

/// 断点续传信息。对调用方是不透明字节块，通过 serde 往返
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeData {
    pub url: String,
    pub temp_path: PathBuf,
    pub bytes_written: u64,
    pub etag: Option<String>,
}

impl ResumeData {
    pub fn to_bytes(&self) -> Result<Vec<u8>, HttpError> {
        serde_json::to_vec(self).map_err(|e| HttpError::Encoding(format!("续传信息序列化失败: {}", e)))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HttpError> {
        serde_json::from_slice(data)
            .map_err(|e| HttpError::Encoding(format!("续传信息无法识别: {}", e)))
    }
}

/// 传输层：接收编码好的请求，分配任务标识，把事件回送给桥接器
pub trait Transport {
    fn submit(&self, request: BuiltRequest, mode: SubmitMode, events: DelegateBridge) -> TaskId;
    fn resume(&self, resume: ResumeData, events: DelegateBridge) -> TaskId;
    fn cancel(&self, id: TaskId);
    fn invalidate(&self);
}

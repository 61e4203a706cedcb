use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::error::HttpError;
use super::request::ResponseMeta;
use super::transport::{AuthChallenge, ChallengeReply, TaskId};

/// 数据型任务的完成回调 (数据, 响应元数据, 错误)，最多调用一次
pub type DataCompletion = Box<dyn FnOnce(Option<Bytes>, Option<ResponseMeta>, Option<HttpError>) + Send>;

/// 下载型任务的完成回调 (落盘位置, 响应元数据, 错误)，最多调用一次
pub type DownloadCompletion =
    Box<dyn FnOnce(Option<PathBuf>, Option<ResponseMeta>, Option<HttpError>) + Send>;

/// 进度回调 (本次字节数, 累计字节数, 预期总字节数)
pub type ProgressSink = Box<dyn FnMut(i64, i64, i64) + Send>;

/// 认证质询处理器，通过 reply 给出处置；丢弃 reply 视同默认处理
pub type ChallengeHandler = Arc<dyn Fn(&AuthChallenge, ChallengeReply) + Send + Sync>;

/// 完成回调二选一：内存数据或下载位置
pub enum CompletionSink {
    Data(DataCompletion),
    Download(DownloadCompletion),
}

/// 任务形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Data,
    Download,
    BackgroundDownload,
}

/// 单个在途任务的可变状态
pub struct TaskState {
    pub kind: TaskKind,
    /// 数据型任务的追加式字节累加器，下载型任务保持为空
    pub buffer: BytesMut,
    pub response: Option<ResponseMeta>,
    pub progress: Option<ProgressSink>,
    pub completion: Option<CompletionSink>,
    pub challenge: Option<ChallengeHandler>,
    /// 后台日志里的条目标识
    pub journal_key: Option<Uuid>,
}

impl TaskState {
    pub fn data(
        completion: DataCompletion,
        progress: Option<ProgressSink>,
        challenge: Option<ChallengeHandler>,
    ) -> Self {
        Self {
            kind: TaskKind::Data,
            buffer: BytesMut::new(),
            response: None,
            progress,
            completion: Some(CompletionSink::Data(completion)),
            challenge,
            journal_key: None,
        }
    }

    pub fn download(completion: DownloadCompletion, progress: Option<ProgressSink>) -> Self {
        Self {
            kind: TaskKind::Download,
            buffer: BytesMut::new(),
            response: None,
            progress,
            completion: Some(CompletionSink::Download(completion)),
            challenge: None,
            journal_key: None,
        }
    }

    /// 后台会话重启后才发现的任务：补一份最小状态
    pub fn synthesized(kind: TaskKind) -> Self {
        Self {
            kind,
            buffer: BytesMut::new(),
            response: None,
            progress: None,
            completion: None,
            challenge: None,
            journal_key: None,
        }
    }
}

/// 任务注册表：任务标识到任务状态的并发映射
///
/// 原始映射不对外暴露，单个标识上的读改写在锁内完成，
/// 不同标识的操作不会彼此交错出中间态。
pub struct TaskRegistry {
    inner: Mutex<HashMap<TaskId, TaskState>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, id: TaskId, state: TaskState) {
        self.inner.lock().unwrap().insert(id, state);
    }

    /// 对已存在的条目做原子读改写
    pub fn mutate<R>(&self, id: TaskId, f: impl FnOnce(&mut TaskState) -> R) -> Option<R> {
        self.inner.lock().unwrap().get_mut(&id).map(f)
    }

    /// 条目不存在则先用 `default` 补建，再做读改写
    pub fn upsert<R>(
        &self,
        id: TaskId,
        default: impl FnOnce() -> TaskState,
        f: impl FnOnce(&mut TaskState) -> R,
    ) -> R {
        let mut map = self.inner.lock().unwrap();
        f(map.entry(id).or_insert_with(default))
    }

    pub fn remove(&self, id: TaskId) -> Option<TaskState> {
        self.inner.lock().unwrap().remove(&id)
    }

    /// 清空注册表，返回全部存活条目（会话解约时使用）
    pub fn drain(&self) -> Vec<(TaskId, TaskState)> {
        self.inner.lock().unwrap().drain().collect()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.lock().unwrap().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

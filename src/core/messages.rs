//! 会话编排器的消息定义，一个操作一个消息

use actix::Message;

use super::builder::RequestBuilder;
use super::registry::{ChallengeHandler, DataCompletion, DownloadCompletion, ProgressSink};
use super::request::{HttpRequest, Parameters};
use super::transport::{ResumeData, TaskId, TransportEvent};

/// 提交数据型任务。编码失败时不会提交，completion 带错误被调用，返回 None
pub struct StartData {
    pub request: HttpRequest,
    pub parameters: Option<Parameters>,
    pub builder: Option<Box<dyn RequestBuilder>>,
    pub completion: DataCompletion,
    pub progress: Option<ProgressSink>,
    pub challenge: Option<ChallengeHandler>,
}
impl Message for StartData { type Result = Option<TaskId>; }

/// 提交下载型任务
pub struct StartDownload {
    pub request: HttpRequest,
    pub parameters: Option<Parameters>,
    pub builder: Option<Box<dyn RequestBuilder>>,
    pub completion: DownloadCompletion,
    pub progress: Option<ProgressSink>,
}
impl Message for StartDownload { type Result = Option<TaskId>; }

/// 从续传信息重启下载。产生新的任务标识，校验与完成接线同全新下载
pub struct ResumeDownloadMsg {
    pub resume: ResumeData,
    pub completion: DownloadCompletion,
    pub progress: Option<ProgressSink>,
}
impl Message for ResumeDownloadMsg { type Result = TaskId; }

/// 取消任务。不存在的标识返回 false
pub struct CancelTask {
    pub id: TaskId,
}
impl Message for CancelTask { type Result = bool; }

/// 会话解约：注册表里每个在途任务收到一次取消式完成，之后不再接收事件
pub struct InvalidateAndCancel;
impl Message for InvalidateAndCancel { type Result = (); }

/// 在途任务数
pub struct TaskCount;
impl Message for TaskCount { type Result = usize; }

/// 传输层事件，经桥接器投递，统一在一个入口分发
pub struct TaskEvent {
    pub id: TaskId,
    pub event: TransportEvent,
}
impl Message for TaskEvent { type Result = (); }

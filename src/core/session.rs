//! 会话编排器：任务注册、事件分发、响应校验、完成投递
//!
//! `SessionActor` 独占一个传输会话句柄，运行在单一 Arbiter 线程上，
//! 这个线程就是完成上下文：所有对调用方可见的回调（完成、进度、
//! 后台委托）都从这里发出。解析例外地放到阻塞线程池，结果再回来。

use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use actix::prelude::*;
use bytes::Bytes;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::SessionConfig;

use super::background::{BackgroundDelegate, BackgroundDownloadDelegate, DownloadJournal};
use super::bridge::DelegateBridge;
use super::builder::{HttpRequestBuilder, RequestBuilder};
use super::error::{Fetched, HttpError, HttpFailure, HttpResult};
use super::messages::{
    CancelTask, InvalidateAndCancel, ResumeDownloadMsg, StartData, StartDownload, TaskCount,
    TaskEvent,
};
use super::parser::{DataResponseParser, ResponseParser};
use super::registry::{
    ChallengeHandler, CompletionSink, DataCompletion, DownloadCompletion, ProgressSink,
    TaskKind, TaskRegistry, TaskState,
};
use super::request::{BuiltRequest, HttpMethod, HttpRequest, Parameters, ResponseMeta};
use super::transport::awc::AwcTransport;
use super::transport::{
    AuthChallenge, ChallengeDisposition, ChallengeReply, ResponseDisposition, ResumeData,
    SubmitMode, TaskId, Transport, TransportEvent,
};

/// 会话编排器 Actor
pub struct SessionActor {
    config: SessionConfig,
    transport: Rc<dyn Transport>,
    registry: TaskRegistry,
    bridge: Option<DelegateBridge>,
    session_challenge: Option<ChallengeHandler>,
    background_delegate: Option<Rc<dyn BackgroundDelegate>>,
    background_download_delegate: Option<Rc<dyn BackgroundDownloadDelegate>>,
    journal: Option<DownloadJournal>,
    /// 启动时重放的日志条目，清空时触发 on_session_finished
    replay_keys: HashSet<Uuid>,
    invalidated: bool,
}

impl Actor for SessionActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let bridge = DelegateBridge::new(ctx.address().downgrade());
        self.bridge = Some(bridge.clone());

        // 后台会话：打开日志，把上次未完成的下载重放为续传任务
        if let Some(identifier) = self.config.background_identifier.clone() {
            let dir = PathBuf::from(&self.config.download_dir);
            let journal = DownloadJournal::open(&dir, &identifier);
            for entry in journal.entries() {
                let id = self.transport.resume(entry.resume_data(), bridge.clone());
                let mut state = TaskState::synthesized(TaskKind::BackgroundDownload);
                state.journal_key = Some(entry.key);
                self.registry.insert(id, state);
                self.replay_keys.insert(entry.key);
                log::info!("重放后台下载 {} ({})", id, entry.url);
            }
            self.journal = Some(journal);
        }
    }
}

impl SessionActor {
    fn bridge(&self) -> DelegateBridge {
        self.bridge.clone().expect("桥接器在 started 里初始化")
    }

    /// 编码请求。builder 缺省时：有参数用通用编码器，没参数原样提交
    fn build(
        request: HttpRequest,
        parameters: Option<Parameters>,
        builder: Option<Box<dyn RequestBuilder>>,
    ) -> Result<BuiltRequest, HttpError> {
        match builder {
            Some(builder) => builder.build(request, parameters.as_ref()),
            None => match parameters {
                Some(ref p) => HttpRequestBuilder::new().build(request, Some(p)),
                None => Ok(request.into()),
            },
        }
    }

    fn on_challenge(&mut self, id: TaskId, challenge: AuthChallenge, reply: ChallengeReply) {
        // 任务级处理器优先，其次会话级，最后默认处理
        let handler = self
            .registry
            .mutate(id, |state| state.challenge.clone())
            .flatten()
            .or_else(|| self.session_challenge.clone());
        match handler {
            Some(handler) => handler(&challenge, reply),
            None => {
                let _ = reply.send(ChallengeDisposition::PerformDefaultHandling);
            }
        }
    }

    fn on_metadata(
        &mut self,
        id: TaskId,
        response: ResponseMeta,
        reply: oneshot::Sender<ResponseDisposition>,
    ) {
        let disposition = match self.config.validate_response(&response) {
            Ok(()) => ResponseDisposition::Allow,
            Err(e) => {
                log::debug!("{} 响应校验不通过: {}", id, e);
                ResponseDisposition::Cancel
            }
        };
        self.registry.upsert(
            id,
            || TaskState::synthesized(TaskKind::Data),
            |state| state.response = Some(response),
        );
        let _ = reply.send(disposition);
    }

    fn on_data(&mut self, id: TaskId, chunk: Bytes) {
        // 未知标识：后台会话重启后才出现的任务，就地补建状态
        self.registry.upsert(
            id,
            || TaskState::synthesized(TaskKind::Data),
            |state| state.buffer.extend_from_slice(&chunk),
        );
    }

    fn on_progress(&mut self, id: TaskId, bytes: i64, total: i64, expected: i64) {
        self.registry.mutate(id, |state| {
            if let Some(progress) = state.progress.as_mut() {
                progress(bytes, total, expected);
            }
        });
    }

    fn on_download_finished(&mut self, id: TaskId, location: PathBuf) {
        if self.config.is_background_capable() {
            if let Some(delegate) = self.background_download_delegate.clone() {
                let location = location.clone();
                actix::spawn(async move {
                    delegate.on_download_finished(id, location).await;
                });
            }
        }
        let taken = self
            .registry
            .mutate(id, |state| {
                if matches!(state.completion, Some(CompletionSink::Download(_))) {
                    if let Some(CompletionSink::Download(f)) = state.completion.take() {
                        return Some((f, state.response.clone()));
                    }
                }
                None
            })
            .flatten();
        if let Some((completion, response)) = taken {
            completion(Some(location), response, None);
        }
    }

    fn on_completed(&mut self, id: TaskId, error: Option<HttpError>) {
        // 注册表移除即终态判定：重复的终态事件在这里自然落空
        let Some(state) = self.registry.remove(id) else {
            log::debug!("{} 的终态事件无对应注册项，忽略", id);
            return;
        };
        match state.completion {
            Some(CompletionSink::Data(completion)) => {
                let data = if state.buffer.is_empty() {
                    None
                } else {
                    Some(state.buffer.freeze())
                };
                completion(data, state.response, error);
            }
            Some(CompletionSink::Download(completion)) => {
                // 收到终态却没等到落盘事件：错误由完成管线裁定
                completion(None, state.response, error);
            }
            None => self.finish_background(id, state, error),
        }
    }

    /// 没有内联回调的任务走后台通道
    fn finish_background(&mut self, id: TaskId, state: TaskState, error: Option<HttpError>) {
        if !self.config.is_background_capable() {
            return;
        }
        if let Some(key) = state.journal_key {
            if let Some(journal) = self.journal.as_mut() {
                journal.remove(key);
            }
        }
        let data = if state.buffer.is_empty() {
            None
        } else {
            Some(state.buffer.freeze())
        };
        // 传输错误优先，其次补一次响应校验
        let error = error.or_else(|| {
            state
                .response
                .as_ref()
                .and_then(|meta| self.config.validate_response(meta).err())
        });
        if let Some(delegate) = self.background_delegate.clone() {
            actix::spawn(async move {
                delegate.on_task_complete(id, data, error).await;
            });
        }
        let was_replay = state
            .journal_key
            .map(|key| self.replay_keys.remove(&key))
            .unwrap_or(false);
        if was_replay && self.replay_keys.is_empty() {
            if let Some(delegate) = self.background_delegate.clone() {
                actix::spawn(async move {
                    delegate.on_session_finished().await;
                });
            }
        }
    }

    fn finish_cancelled(state: TaskState) {
        match state.completion {
            Some(CompletionSink::Data(completion)) => {
                completion(None, state.response, Some(HttpError::Cancelled));
            }
            Some(CompletionSink::Download(completion)) => {
                completion(None, state.response, Some(HttpError::Cancelled));
            }
            None => {}
        }
    }
}

impl Handler<StartData> for SessionActor {
    type Result = Option<TaskId>;

    fn handle(&mut self, msg: StartData, _ctx: &mut Self::Context) -> Self::Result {
        if self.invalidated {
            (msg.completion)(None, None, Some(HttpError::SessionInvalidated));
            return None;
        }
        let built = match Self::build(msg.request, msg.parameters, msg.builder) {
            Ok(built) => built,
            Err(e) => {
                // 编码失败：任务从未提交，完成回调在本线程（完成上下文）同步报错
                log::debug!("请求编码失败: {}", e);
                (msg.completion)(None, None, Some(e));
                return None;
            }
        };
        log::debug!("{} {} 提交数据任务", built.method, built.url);
        let id = self.transport.submit(built, SubmitMode::Data, self.bridge());
        self.registry
            .insert(id, TaskState::data(msg.completion, msg.progress, msg.challenge));
        Some(id)
    }
}

impl Handler<StartDownload> for SessionActor {
    type Result = Option<TaskId>;

    fn handle(&mut self, msg: StartDownload, _ctx: &mut Self::Context) -> Self::Result {
        if self.invalidated {
            (msg.completion)(None, None, Some(HttpError::SessionInvalidated));
            return None;
        }
        let built = match Self::build(msg.request, msg.parameters, msg.builder) {
            Ok(built) => built,
            Err(e) => {
                log::debug!("请求编码失败: {}", e);
                (msg.completion)(None, None, Some(e));
                return None;
            }
        };
        let destination = PathBuf::from(&self.config.download_dir)
            .join("tmp")
            .join(format!("{}.part", Uuid::new_v4()));
        let url = built.url.to_string();
        log::debug!("{} {} 提交下载任务 -> {}", built.method, built.url, destination.display());
        let id = self.transport.submit(
            built,
            SubmitMode::Download { destination: destination.clone() },
            self.bridge(),
        );
        let mut state = TaskState::download(msg.completion, msg.progress);
        if let Some(journal) = self.journal.as_mut() {
            state.kind = TaskKind::BackgroundDownload;
            state.journal_key = Some(journal.add(url, destination));
        }
        self.registry.insert(id, state);
        Some(id)
    }
}

impl Handler<ResumeDownloadMsg> for SessionActor {
    type Result = MessageResult<ResumeDownloadMsg>;

    fn handle(&mut self, msg: ResumeDownloadMsg, _ctx: &mut Self::Context) -> Self::Result {
        log::debug!("从 {} 字节处续传 {}", msg.resume.bytes_written, msg.resume.url);
        let id = self.transport.resume(msg.resume, self.bridge());
        self.registry
            .insert(id, TaskState::download(msg.completion, msg.progress));
        MessageResult(id)
    }
}

impl Handler<CancelTask> for SessionActor {
    type Result = bool;

    fn handle(&mut self, msg: CancelTask, _ctx: &mut Self::Context) -> Self::Result {
        if self.registry.contains(msg.id) {
            self.transport.cancel(msg.id);
            true
        } else {
            false
        }
    }
}

impl Handler<InvalidateAndCancel> for SessionActor {
    type Result = ();

    fn handle(&mut self, _msg: InvalidateAndCancel, ctx: &mut Self::Context) {
        self.invalidated = true;
        self.transport.invalidate();
        self.session_challenge = None;
        for (id, state) in self.registry.drain() {
            log::info!("会话解约，取消 {}", id);
            Self::finish_cancelled(state);
        }
        ctx.stop();
    }
}

impl Handler<TaskCount> for SessionActor {
    type Result = usize;

    fn handle(&mut self, _msg: TaskCount, _ctx: &mut Self::Context) -> Self::Result {
        self.registry.len()
    }
}

impl Handler<TaskEvent> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: TaskEvent, _ctx: &mut Self::Context) {
        if self.invalidated {
            match msg.event {
                TransportEvent::Challenge { reply, .. } => {
                    let _ = reply.send(ChallengeDisposition::PerformDefaultHandling);
                }
                TransportEvent::Metadata { reply, .. } => {
                    let _ = reply.send(ResponseDisposition::Cancel);
                }
                _ => {}
            }
            return;
        }
        match msg.event {
            TransportEvent::Challenge { challenge, reply } => {
                self.on_challenge(msg.id, challenge, reply)
            }
            TransportEvent::Metadata { response, reply } => {
                self.on_metadata(msg.id, response, reply)
            }
            TransportEvent::Data { chunk } => self.on_data(msg.id, chunk),
            TransportEvent::Progress { bytes, total, expected } => {
                self.on_progress(msg.id, bytes, total, expected)
            }
            TransportEvent::DownloadFinished { location } => {
                self.on_download_finished(msg.id, location)
            }
            TransportEvent::Completed { error } => self.on_completed(msg.id, error),
        }
    }
}

/// 会话构造器
pub struct SessionBuilder {
    config: SessionConfig,
    transport: Option<Rc<dyn Transport>>,
    session_challenge: Option<ChallengeHandler>,
    background_delegate: Option<Rc<dyn BackgroundDelegate>>,
    background_download_delegate: Option<Rc<dyn BackgroundDownloadDelegate>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            session_challenge: None,
            background_delegate: None,
            background_download_delegate: None,
        }
    }

    /// 替换传输层（测试接缝）
    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 会话级认证质询处理器
    pub fn on_session_challenge(
        mut self,
        handler: impl Fn(&AuthChallenge, ChallengeReply) + Send + Sync + 'static,
    ) -> Self {
        self.session_challenge = Some(std::sync::Arc::new(handler));
        self
    }

    pub fn background_delegate(mut self, delegate: Rc<dyn BackgroundDelegate>) -> Self {
        self.background_delegate = Some(delegate);
        self
    }

    pub fn background_download_delegate(
        mut self,
        delegate: Rc<dyn BackgroundDownloadDelegate>,
    ) -> Self {
        self.background_download_delegate = Some(delegate);
        self
    }

    /// 启动会话 Actor。必须在 actix 系统内调用
    pub fn start(self) -> HttpSession {
        let config = self.config;
        let transport = self
            .transport
            .unwrap_or_else(|| Rc::new(AwcTransport::new(&config)));
        let actor = SessionActor {
            config: config.clone(),
            transport,
            registry: TaskRegistry::new(),
            bridge: None,
            session_challenge: self.session_challenge,
            background_delegate: self.background_delegate,
            background_download_delegate: self.background_download_delegate,
            journal: None,
            replay_keys: HashSet::new(),
            invalidated: false,
        };
        HttpSession { addr: actor.start(), config }
    }
}

/// 一个尚未完成的任务：标识加上最终结果
pub struct TaskHandle<T> {
    /// None 表示任务在提交前就失败，结果已经在路上
    pub id: Option<TaskId>,
    receiver: oneshot::Receiver<HttpResult<T>>,
}

impl<T> TaskHandle<T> {
    pub async fn outcome(self) -> HttpResult<T> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(HttpFailure::from(HttpError::SessionInvalidated)))
    }
}

/// HTTP 会话：编排器的公开句柄
#[derive(Clone)]
pub struct HttpSession {
    addr: Addr<SessionActor>,
    config: SessionConfig,
}

impl HttpSession {
    pub fn new(config: SessionConfig) -> Self {
        SessionBuilder::new(config).start()
    }

    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// 提交数据型任务，返回可取消的句柄
    pub async fn start_request<P: ResponseParser>(
        &self,
        request: HttpRequest,
        parameters: Option<Parameters>,
        builder: Option<Box<dyn RequestBuilder>>,
        parser: P,
    ) -> Result<TaskHandle<P::Value>, HttpError> {
        self.start_request_with(request, parameters, builder, parser, None, None)
            .await
    }

    /// 同上，外加进度与任务级质询处理器
    pub async fn start_request_with<P: ResponseParser>(
        &self,
        request: HttpRequest,
        parameters: Option<Parameters>,
        builder: Option<Box<dyn RequestBuilder>>,
        parser: P,
        progress: Option<ProgressSink>,
        challenge: Option<ChallengeHandler>,
    ) -> Result<TaskHandle<P::Value>, HttpError> {
        let (tx, rx) = oneshot::channel();
        let completion = data_pipeline(self.config.clone(), parser, tx);
        let id = self
            .addr
            .send(StartData { request, parameters, builder, completion, progress, challenge })
            .await
            .map_err(|_| HttpError::SessionInvalidated)?;
        Ok(TaskHandle { id, receiver: rx })
    }

    /// 通用入口：编码、提交、校验、解析一条龙
    pub async fn request<P: ResponseParser>(
        &self,
        method: HttpMethod,
        url: &str,
        parameters: Option<Parameters>,
        builder: Option<Box<dyn RequestBuilder>>,
        parser: P,
    ) -> HttpResult<P::Value> {
        let request = HttpRequest::parse(method, url)?;
        let handle = self
            .start_request(request, parameters, builder, parser)
            .await?;
        handle.outcome().await
    }

    pub async fn get<P: ResponseParser>(
        &self,
        url: &str,
        parameters: Option<Parameters>,
        parser: P,
    ) -> HttpResult<P::Value> {
        self.request(HttpMethod::Get, url, parameters, None, parser).await
    }

    pub async fn post<P: ResponseParser>(
        &self,
        url: &str,
        parameters: Option<Parameters>,
        parser: P,
    ) -> HttpResult<P::Value> {
        self.request(HttpMethod::Post, url, parameters, None, parser).await
    }

    pub async fn patch<P: ResponseParser>(
        &self,
        url: &str,
        parameters: Option<Parameters>,
        parser: P,
    ) -> HttpResult<P::Value> {
        self.request(HttpMethod::Patch, url, parameters, None, parser).await
    }

    pub async fn delete<P: ResponseParser>(
        &self,
        url: &str,
        parameters: Option<Parameters>,
        parser: P,
    ) -> HttpResult<P::Value> {
        self.request(HttpMethod::Delete, url, parameters, None, parser).await
    }

    /// 原始字节入口：绕过解析管线
    pub async fn get_data(&self, url: &str, parameters: Option<Parameters>) -> HttpResult<Bytes> {
        self.get(url, parameters, DataResponseParser).await
    }

    /// 提交下载型任务，返回可取消的句柄
    pub async fn start_download(
        &self,
        request: HttpRequest,
        parameters: Option<Parameters>,
        builder: Option<Box<dyn RequestBuilder>>,
        progress: Option<ProgressSink>,
    ) -> Result<TaskHandle<PathBuf>, HttpError> {
        let (tx, rx) = oneshot::channel();
        let completion = download_pipeline(self.config.clone(), tx);
        let id = self
            .addr
            .send(StartDownload { request, parameters, builder, completion, progress })
            .await
            .map_err(|_| HttpError::SessionInvalidated)?;
        Ok(TaskHandle { id, receiver: rx })
    }

    pub async fn download(
        &self,
        url: &str,
        parameters: Option<Parameters>,
        progress: Option<ProgressSink>,
    ) -> HttpResult<PathBuf> {
        let request = HttpRequest::parse(HttpMethod::Get, url)?;
        let handle = self.start_download(request, parameters, None, progress).await?;
        handle.outcome().await
    }

    /// 从续传信息重启下载，校验与完成接线同全新下载
    pub async fn resume_download(
        &self,
        resume: ResumeData,
        progress: Option<ProgressSink>,
    ) -> HttpResult<PathBuf> {
        let (tx, rx) = oneshot::channel();
        let completion = download_pipeline(self.config.clone(), tx);
        let id = self
            .addr
            .send(ResumeDownloadMsg { resume, completion, progress })
            .await
            .map_err(|_| HttpError::SessionInvalidated)?;
        let handle = TaskHandle { id: Some(id), receiver: rx };
        handle.outcome().await
    }

    pub async fn cancel(&self, id: TaskId) -> bool {
        self.addr.send(CancelTask { id }).await.unwrap_or(false)
    }

    /// 会话解约：所有在途任务收到一次取消式完成，之后会话不再可用
    pub async fn invalidate_and_cancel(&self) {
        let _ = self.addr.send(InvalidateAndCancel).await;
    }

    pub async fn task_count(&self) -> usize {
        self.addr.send(TaskCount).await.unwrap_or(0)
    }
}

/// 数据任务的完成管线：传输错误透传 → 响应校验 → 内容类型核对 →
/// 阻塞线程池解码 → 结果送回完成上下文
fn data_pipeline<P: ResponseParser>(
    config: SessionConfig,
    parser: P,
    tx: oneshot::Sender<HttpResult<P::Value>>,
) -> DataCompletion {
    Box::new(move |data, response, error| {
        if let Some(error) = error {
            let _ = tx.send(Err(HttpFailure { response, error }));
            return;
        }
        let Some(response) = response else {
            let _ = tx.send(Err(HttpFailure {
                response: None,
                error: HttpError::Transport("未收到响应元数据".to_string()),
            }));
            return;
        };
        if let Err(error) = config.validate_response(&response) {
            let _ = tx.send(Err(HttpFailure { response: Some(response), error }));
            return;
        }
        let data = data.unwrap_or_default();
        if data.is_empty() {
            // 空响应体：校验通过但无值，解码器不参与
            let _ = tx.send(Ok(Fetched { value: None, response }));
            return;
        }
        if let Err(error) = parser.should_accept(&response) {
            let _ = tx.send(Err(HttpFailure { response: Some(response), error }));
            return;
        }
        actix::spawn(async move {
            let decoded = actix_rt::task::spawn_blocking(move || parser.decode(data)).await;
            let outcome = match decoded {
                Ok(Ok(value)) => Ok(Fetched { value: Some(value), response }),
                Ok(Err(error)) => Err(HttpFailure { response: Some(response), error }),
                Err(e) => Err(HttpFailure {
                    response: Some(response),
                    error: HttpError::Parse(format!("解码执行中断: {}", e)),
                }),
            };
            let _ = tx.send(outcome);
        });
    })
}

/// 下载任务的完成管线：传输错误透传，落盘成功后仍要过响应校验
fn download_pipeline(
    config: SessionConfig,
    tx: oneshot::Sender<HttpResult<PathBuf>>,
) -> DownloadCompletion {
    Box::new(move |location, response, error| {
        let outcome = match (location, error) {
            (_, Some(error)) => Err(HttpFailure { response, error }),
            (Some(location), None) => match response {
                Some(response) => match config.validate_response(&response) {
                    Ok(()) => Ok(Fetched { value: Some(location), response }),
                    Err(error) => Err(HttpFailure { response: Some(response), error }),
                },
                None => Err(HttpFailure {
                    response: None,
                    error: HttpError::Transport("未收到响应元数据".to_string()),
                }),
            },
            (None, None) => match response {
                // 终态正常但没有落盘：先看校验，校验通过才算传输中断
                Some(response) => {
                    let error = config
                        .validate_response(&response)
                        .err()
                        .unwrap_or_else(|| HttpError::Transport("下载未完成".to_string()));
                    Err(HttpFailure { response: Some(response), error })
                }
                None => Err(HttpFailure {
                    response: None,
                    error: HttpError::Transport("下载未完成".to_string()),
                }),
            },
        };
        let _ = tx.send(outcome);
    })
}

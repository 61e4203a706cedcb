//! 基于 awc 的传输层实现
//!
//! 每个任务是一个跑在当前 Arbiter 上的 future：发请求、合成认证质询、
//! 上报元数据等处置、按分片回送数据或落盘，最后恰好回报一次终态。

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use awc::error::SendRequestError;
use awc::http::{header, Method};
use futures::StreamExt;
use tokio::sync::oneshot;
use url::Url;

use crate::config::SessionConfig;
use crate::core::bridge::DelegateBridge;
use crate::core::error::HttpError;
use crate::core::request::{BuiltRequest, HttpMethod, ResponseMeta};

use super::{
    AuthChallenge, ChallengeDisposition, Credential, ResponseDisposition, ResumeData,
    SubmitMode, TaskId, Transport, TransportEvent,
};

const PART_BUFFER: usize = 256 * 1024;

/// awc 传输层。任务标识单调递增，取消经由每任务一个的标志位
pub struct AwcTransport {
    client: awc::Client,
    next_id: AtomicU64,
    live: Arc<Mutex<HashMap<TaskId, Arc<AtomicBool>>>>,
    invalidated: Arc<AtomicBool>,
}

impl AwcTransport {
    pub fn new(config: &SessionConfig) -> Self {
        let client = awc::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .add_default_header((header::USER_AGENT, config.user_agent.clone()))
            .finish();
        Self {
            client,
            next_id: AtomicU64::new(1),
            live: Arc::new(Mutex::new(HashMap::new())),
            invalidated: Arc::new(AtomicBool::new(false)),
        }
    }

    fn launch(&self, request: BuiltRequest, mode: SubmitMode, resume_from: u64, events: DelegateBridge) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        if self.invalidated.load(Ordering::SeqCst) {
            let bridge = events.clone();
            actix::spawn(async move {
                bridge.deliver(id, TransportEvent::Completed {
                    error: Some(HttpError::SessionInvalidated),
                });
            });
            return id;
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.live.lock().unwrap().insert(id, flag.clone());

        let client = self.client.clone();
        let live = self.live.clone();
        actix::spawn(async move {
            let error = run_task(&client, id, request, mode, resume_from, &flag, &events).await;
            live.lock().unwrap().remove(&id);
            events.deliver(id, TransportEvent::Completed { error });
        });
        id
    }
}

impl Transport for AwcTransport {
    fn submit(&self, request: BuiltRequest, mode: SubmitMode, events: DelegateBridge) -> TaskId {
        self.launch(request, mode, 0, events)
    }

    fn resume(&self, resume: ResumeData, events: DelegateBridge) -> TaskId {
        let request = match BuiltRequest::for_resume(&resume) {
            Ok(request) => request,
            Err(e) => {
                let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
                let bridge = events.clone();
                actix::spawn(async move {
                    bridge.deliver(id, TransportEvent::Completed { error: Some(e) });
                });
                return id;
            }
        };
        let mode = SubmitMode::Download { destination: resume.temp_path.clone() };
        self.launch(request, mode, resume.bytes_written, events)
    }

    fn cancel(&self, id: TaskId) {
        if let Some(flag) = self.live.lock().unwrap().get(&id) {
            log::debug!("{} 收到取消", id);
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        for flag in self.live.lock().unwrap().values() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl BuiltRequest {
    /// 续传任务的请求形态：GET 原始地址，Range 头由传输层追加
    fn for_resume(resume: &ResumeData) -> Result<Self, HttpError> {
        let url = Url::parse(&resume.url).map_err(|_| HttpError::InvalidUrl(resume.url.clone()))?;
        let mut request = BuiltRequest {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        };
        if let Some(etag) = &resume.etag {
            request.headers.push((header::IF_RANGE.to_string(), etag.clone()));
        }
        Ok(request)
    }
}

/// 单个任务的完整生命周期。返回值进入终态事件：
/// None 表示正常收尾（含元数据处置为取消的情况），Some 是传输层错误
async fn run_task(
    client: &awc::Client,
    id: TaskId,
    request: BuiltRequest,
    mode: SubmitMode,
    resume_from: u64,
    flag: &Arc<AtomicBool>,
    events: &DelegateBridge,
) -> Option<HttpError> {
    let range_from = if resume_from > 0 { Some(resume_from) } else { None };

    // 认证质询链：同一任务最多用凭据重发一次
    let mut credential: Option<Credential> = None;
    let mut failures = 0u32;
    let mut response = loop {
        let prepared = prepare(client, &request, credential.as_ref(), range_from);
        let sent = match &request.body {
            Some(body) => prepared.send_body(body.clone()).await,
            None => prepared.send().await,
        };
        let response = match sent {
            Ok(response) => response,
            Err(e) => return Some(map_send_error(e)),
        };
        let status = response.status().as_u16();
        if (status == 401 || status == 407) && failures == 0 {
            let challenge = synthesize_challenge(&request.url, status, &response, failures);
            let (tx, rx) = oneshot::channel();
            events.deliver(id, TransportEvent::Challenge { challenge, reply: tx });
            match rx.await {
                Ok(ChallengeDisposition::UseCredential(cred)) => {
                    credential = Some(cred);
                    failures += 1;
                    continue;
                }
                Ok(ChallengeDisposition::Cancel) => return Some(HttpError::Cancelled),
                // 默认处理：响应原样下传，让校验去裁定
                Ok(ChallengeDisposition::PerformDefaultHandling) | Err(_) => break response,
            }
        }
        break response;
    };

    if flag.load(Ordering::SeqCst) {
        return Some(HttpError::Cancelled);
    }

    let status = response.status().as_u16();
    let meta = response_meta(&request.url, &response);
    let content_length = meta.content_length;

    let (tx, rx) = oneshot::channel();
    events.deliver(id, TransportEvent::Metadata { response: meta, reply: tx });
    match rx.await {
        Ok(ResponseDisposition::Allow) => {}
        // 处置为取消：不读响应体，正常收尾
        Ok(ResponseDisposition::Cancel) | Err(_) => return None,
    }

    // 服务端只在 206 下接受续传，200 意味着从头重来
    let appending = resume_from > 0 && status == 206;
    let mut total: i64 = if appending { resume_from as i64 } else { 0 };
    let expected = match content_length {
        Some(len) => total + len as i64,
        None => -1,
    };

    let mut part = match &mode {
        SubmitMode::Data => None,
        SubmitMode::Download { destination } => match PartFile::open(destination, appending) {
            Ok(part) => Some(part),
            Err(e) => return Some(HttpError::Io(e)),
        },
    };

    while let Some(chunk) = response.next().await {
        if flag.load(Ordering::SeqCst) {
            return Some(HttpError::Cancelled);
        }
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => return Some(HttpError::Transport(format!("网络流错误: {}", e))),
        };
        let len = bytes.len() as i64;
        total += len;
        match part.as_mut() {
            None => events.deliver(id, TransportEvent::Data { chunk: bytes }),
            Some(part) => {
                if let Err(e) = part.write(&bytes) {
                    return Some(HttpError::Io(e));
                }
            }
        }
        events.deliver(id, TransportEvent::Progress { bytes: len, total, expected });
    }

    if let Some(mut part) = part {
        if let Err(e) = part.flush() {
            return Some(HttpError::Io(e));
        }
        if let SubmitMode::Download { destination } = mode {
            log::debug!("{} 落盘 {} 字节到 {}", id, part.written(), destination.display());
            events.deliver(id, TransportEvent::DownloadFinished { location: destination });
        }
    }
    None
}

fn prepare(
    client: &awc::Client,
    request: &BuiltRequest,
    credential: Option<&Credential>,
    range_from: Option<u64>,
) -> awc::ClientRequest {
    let mut prepared = client.request(awc_method(request.method), request.url.as_str());
    for (name, value) in &request.headers {
        prepared = prepared.insert_header((name.as_str(), value.as_str()));
    }
    if let Some(cred) = credential {
        prepared = prepared.basic_auth(&cred.username, &cred.password);
    }
    if let Some(from) = range_from {
        prepared = prepared.insert_header((header::RANGE, format!("bytes={}-", from)));
    }
    prepared
}

fn awc_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn map_send_error(e: SendRequestError) -> HttpError {
    match e {
        SendRequestError::Timeout => HttpError::Timeout,
        SendRequestError::Url(e) => HttpError::InvalidUrl(e.to_string()),
        other => HttpError::Transport(other.to_string()),
    }
}

fn response_meta<S>(url: &Url, response: &awc::ClientResponse<S>) -> ResponseMeta {
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let mime_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ResponseMeta::mime_from_content_type);
    let content_length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    ResponseMeta {
        url: url.clone(),
        status: response.status().as_u16(),
        mime_type,
        content_length,
        headers,
    }
}

/// 从 401/407 响应合成认证质询
fn synthesize_challenge<S>(
    url: &Url,
    status: u16,
    response: &awc::ClientResponse<S>,
    previous_failures: u32,
) -> AuthChallenge {
    let name = if status == 407 {
        header::PROXY_AUTHENTICATE
    } else {
        header::WWW_AUTHENTICATE
    };
    let value = response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("Basic");
    let (scheme, realm) = parse_authenticate(value);
    AuthChallenge { url: url.clone(), scheme, realm, previous_failures }
}

/// 解析 `Basic realm="api"` 形式的头部值
fn parse_authenticate(value: &str) -> (String, Option<String>) {
    let mut parts = value.splitn(2, ' ');
    let scheme = parts.next().unwrap_or("Basic").trim().to_string();
    let realm = parts
        .next()
        .and_then(|rest| rest.split("realm=\"").nth(1))
        .and_then(|rest| rest.split('"').next())
        .map(|s| s.to_string());
    (scheme, realm)
}

/// 下载落盘的缓冲写入器。满一个缓冲才写一次文件
struct PartFile {
    buffer: Vec<u8>,
    used: usize,
    file: std::fs::File,
    written: u64,
}

impl PartFile {
    fn open(path: &Path, append: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            OpenOptions::new().create(true).write(true).truncate(true).open(path)?
        };
        Ok(Self { buffer: vec![0; PART_BUFFER], used: 0, file, written: 0 })
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut copied = 0;
        while copied < data.len() {
            let space = self.buffer.len() - self.used;
            let take = space.min(data.len() - copied);
            self.buffer[self.used..self.used + take].copy_from_slice(&data[copied..copied + take]);
            self.used += take;
            copied += take;
            if self.used == self.buffer.len() {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.used > 0 {
            self.file.write_all(&self.buffer[..self.used])?;
            self.written += self.used as u64;
            self.used = 0;
        }
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

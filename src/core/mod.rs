//! Core: 会话编排、任务注册、请求编码与响应解析的核心模块

pub mod background;
pub mod bridge;
pub mod builder;
pub mod error;
pub mod messages;
pub mod parser;
pub mod registry;
pub mod request;
pub mod session;
pub mod transport;

// 只导出调用方组装一次请求所需的类型
pub use builder::{HttpRequestBuilder, JsonRequestBuilder, RequestBuilder};
pub use error::{Fetched, HttpError, HttpFailure, HttpResult};
pub use parser::{
    json_parser, DataResponseParser, HttpResponseParser, JsonDecoder, JsonResponseParser,
    RawDecoder, ResponseParser,
};
pub use request::{HttpMethod, HttpRequest, Parameters, ResponseMeta};
pub use session::{HttpSession, SessionBuilder, TaskHandle};
pub use transport::{
    AuthChallenge, ChallengeDisposition, ChallengeReply, Credential, ResumeData, TaskId,
};

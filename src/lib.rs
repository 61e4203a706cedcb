//! netkit: 一个用 Rust 编写的 HTTP 会话编排库
//!
//! 围绕单个会话 Actor 组织：调用方提交请求，编码器把参数装进
//! URL 或请求体，传输层把字节搬回来，会话统一做响应校验、
//! 内容类型核对和解析，最后把带元数据的结果送回调用方。
//!
//! ```no_run
//! use netkit::config::SessionConfig;
//! use netkit::core::{json_parser, HttpSession};
//!
//! #[actix::main]
//! async fn main() {
//!     let session = HttpSession::new(SessionConfig::default());
//!     match session.get("https://example.com/api", None, json_parser()).await {
//!         Ok(fetched) => println!("{:?}", fetched.value),
//!         Err(failure) => eprintln!("{}", failure),
//!     }
//!     session.invalidate_and_cancel().await;
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;

pub use config::SessionConfig;
pub use core::{
    Fetched, HttpError, HttpFailure, HttpMethod, HttpRequest, HttpResult, HttpSession,
    Parameters, ResponseMeta, SessionBuilder, TaskId,
};

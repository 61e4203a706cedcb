//! Utils: 文件日志与输入校验

pub mod logger;
pub mod validator;

pub use logger::{LoggerActor, SessionLog};

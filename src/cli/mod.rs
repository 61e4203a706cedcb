//! CLI: 命令行接口和参数解析模块
//!
//! ## 主要功能
//!
//! - 命令行参数解析和验证
//! - 配置文件路径管理
//! - 请求参数与认证凭据的解析
//! - 平台特定的路径处理
//! - 配置文件编辑器集成
//!
//! ## 支持的命令
//!
//! - 基本请求：`netkit <url>`
//! - 指定方法：`netkit -X POST -d key=value <url>`
//! - JSON 请求体：`netkit -X POST --json -d key=value <url>`
//! - 下载文件：`netkit -o file.bin <url>`
//! - 基本认证：`netkit -u user:password <url>`
//! - 编辑配置：`netkit -e`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/netkit/netkit.conf`
//! - macOS: `~/Library/Application Support/netkit/netkit.conf`
//! - Linux: `~/.config/netkit/netkit.conf`

use std::env;

use anyhow::Result;
use clap::Parser;

use crate::config::SessionConfig;
use crate::core::request::{HttpMethod, Parameters};
use crate::core::transport::Credential;
use crate::utils::validator;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/netkit/netkit.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/netkit/netkit.conf", home)
    }
    #[cfg(target_os = "linux")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/netkit/netkit.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(not(target_os = "windows"))]
    {
        let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        std::process::Command::new(editor).arg(config_path).status().ok();
    }
}

#[derive(Parser, Debug)]
#[command(name = "netkit", version, about = "HTTP 请求与下载工具：校验、解析、断点续传")]
pub struct Args {
    /// 请求地址
    pub url: Option<String>,

    /// HTTP 方法
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// 请求参数 key=value，可重复
    #[arg(short = 'd', long = "data")]
    pub data: Vec<String>,

    /// 参数编码为 JSON 请求体
    #[arg(long)]
    pub json: bool,

    /// 下载到文件而不是打印响应
    #[arg(short, long)]
    pub output: Option<String>,

    /// 基本认证凭据 user:password
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// 配置文件路径
    #[arg(short, long, default_value_t = default_config_path())]
    pub config: String,

    /// 打开配置文件编辑器后退出
    #[arg(short, long)]
    pub edit: bool,
}

impl Args {
    /// 解析命令行参数并加载配置
    pub fn parse_args() -> Result<(Args, SessionConfig)> {
        let args = Args::parse();
        let config = SessionConfig::load(&args.config)?;
        config.validate()?;
        Ok((args, config))
    }

    pub fn http_method(&self) -> Result<HttpMethod> {
        match self.method.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => anyhow::bail!("不支持的 HTTP 方法: {}", other),
        }
    }

    pub fn parameters(&self) -> Result<Option<Parameters>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let mut parameters = Parameters::new();
        for pair in &self.data {
            let (key, value) = validator::parse_parameter(pair)?;
            parameters.insert(key, value);
        }
        Ok(Some(parameters))
    }

    pub fn credential(&self) -> Result<Option<Credential>> {
        match &self.user {
            Some(pair) => {
                let (username, password) = validator::parse_credential(pair)?;
                Ok(Some(Credential { username, password }))
            }
            None => Ok(None),
        }
    }
}

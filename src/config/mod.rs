use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::HttpError;
use crate::core::request::ResponseMeta;

/// 会话配置。构造时定死，会话存续期间只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 接受的状态码闭区间 (min, max)；min > max 视为不限制
    pub accepted_status_codes: (u16, u16),
    /// 接受的 MIME 类型集合；空集合视为不限制
    pub accepted_mime_types: Vec<String>,
    /// 后台会话标识；Some 即具备后台能力
    pub background_identifier: Option<String>,
    /// 下载目录（落盘文件与后台日志都在这里）
    pub download_dir: String,
    /// 传输层超时（秒）
    pub timeout_secs: u64,
    /// User-Agent
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            accepted_status_codes: (200, 299),
            accepted_mime_types: Vec::new(),
            background_identifier: None,
            download_dir: "./downloads".to_string(),
            timeout_secs: 30,
            user_agent: format!("netkit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SessionConfig {
    /// 后台会话：标识非空
    pub fn is_background_capable(&self) -> bool {
        self.background_identifier.is_some()
    }

    /// 以默认配置为底，改出一个后台会话配置
    pub fn background(identifier: &str) -> Self {
        Self {
            background_identifier: Some(identifier.to_string()),
            ..Self::default()
        }
    }

    /// 响应校验：状态码与 MIME 两个维度都采用「空约束 = 不限制」，
    /// 两边策略对称
    pub fn validate_response(&self, response: &ResponseMeta) -> Result<(), HttpError> {
        let (min, max) = self.accepted_status_codes;
        let status_ok = min > max || (response.status >= min && response.status <= max);
        let mime_ok = self.accepted_mime_types.is_empty()
            || self
                .accepted_mime_types
                .iter()
                .any(|m| m.eq_ignore_ascii_case(response.mime()));
        if status_ok && mime_ok {
            Ok(())
        } else {
            Err(HttpError::Validation {
                status: response.status,
                mime: response.mime().to_string(),
            })
        }
    }

    /// 加载配置文件；不存在或格式错误时落回默认并写出带说明的模板
    pub fn load(path: &str) -> Result<Self, HttpError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，使用默认配置", e);
                    let config = SessionConfig::default();
                    config.save_with_tutorial(path)?;
                    Ok(config)
                }
            }
        } else {
            let config = SessionConfig::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 写出配置文件，顶部附说明
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), HttpError> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| HttpError::Encoding(format!("配置序列化失败: {}", e)))?;
        let content = format!(
            "# netkit 会话配置\n\
             # accepted_status_codes: 接受的状态码闭区间，min > max 表示不限制\n\
             # accepted_mime_types: 接受的 MIME 集合，留空表示不限制\n\
             # background_identifier: 设置后启用后台下载日志\n\n{}",
            body
        );
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// 配置合法性检查
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("超时必须大于0秒");
        }
        if self.download_dir.is_empty() {
            anyhow::bail!("下载目录不能为空");
        }
        if let Some(id) = &self.background_identifier {
            if id.is_empty() {
                anyhow::bail!("后台会话标识不能为空字符串");
            }
        }
        Ok(())
    }

    /// 配置摘要（日志用）
    pub fn summary(&self) -> String {
        format!(
            "状态码区间: {:?} | MIME 约束: {} | 后台: {} | 下载目录: {} | 超时: {}s",
            self.accepted_status_codes,
            if self.accepted_mime_types.is_empty() {
                "不限".to_string()
            } else {
                self.accepted_mime_types.join(",")
            },
            self.background_identifier.as_deref().unwrap_or("无"),
            self.download_dir,
            self.timeout_secs,
        )
    }
}

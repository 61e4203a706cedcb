use anyhow::Result;
use url::Url;

/// 只认 http/https，其他 scheme 一律拒绝
pub fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

pub fn validate_url(value: &str) -> Result<()> {
    if !is_http_url(value) {
        anyhow::bail!("不支持的 URL: {}", value);
    }
    Ok(())
}

/// `key=value` 形式的请求参数
pub fn parse_parameter(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => anyhow::bail!("参数格式应为 key=value: {}", pair),
    }
}

/// `user:password` 形式的认证凭据
pub fn parse_credential(pair: &str) -> Result<(String, String)> {
    match pair.split_once(':') {
        Some((user, password)) if !user.is_empty() => {
            Ok((user.to_string(), password.to_string()))
        }
        _ => anyhow::bail!("凭据格式应为 user:password"),
    }
}

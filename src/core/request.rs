use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use url::Url;

use super::error::HttpError;

/// 请求参数。BTreeMap 保证按键字典序迭代，查询串因此是确定性的
pub type Parameters = BTreeMap<String, String>;

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// 参数是否并入 URL 查询串（否则进请求体）
    pub fn is_query_parameterized(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调用方组装的请求原型，交给 RequestBuilder 编码
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self { method, url, headers: Vec::new(), body: None }
    }

    pub fn parse(method: HttpMethod, url: &str) -> Result<Self, HttpError> {
        let url = Url::parse(url).map_err(|_| HttpError::InvalidUrl(url.to_string()))?;
        Ok(Self::new(method, url))
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Builder 产出的不可变请求，交付传输层后不再改动
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl From<HttpRequest> for BuiltRequest {
    fn from(request: HttpRequest) -> Self {
        BuiltRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
        }
    }
}

/// 响应元数据（状态行与关键头部的快照）
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub url: Url,
    pub status: u16,
    pub mime_type: Option<String>,
    pub content_length: Option<u64>,
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    /// MIME 主类型，无 Content-Type 时为空串
    pub fn mime(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("")
    }

    /// 从 Content-Type 头部值里取出 MIME（去掉 charset 等参数）
    pub fn mime_from_content_type(value: &str) -> String {
        value
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_query_parameterized() {
        assert!(HttpMethod::Get.is_query_parameterized());
        assert!(HttpMethod::Head.is_query_parameterized());
        assert!(HttpMethod::Delete.is_query_parameterized());
        assert!(!HttpMethod::Post.is_query_parameterized());
        assert!(!HttpMethod::Patch.is_query_parameterized());
        assert!(!HttpMethod::Put.is_query_parameterized());
    }

    #[test]
    fn test_request_parse_invalid_url() {
        let err = HttpRequest::parse(HttpMethod::Get, "not a url").unwrap_err();
        assert!(matches!(err, HttpError::InvalidUrl(_)));
    }

    #[test]
    fn test_mime_from_content_type() {
        assert_eq!(
            ResponseMeta::mime_from_content_type("application/json; charset=utf-8"),
            "application/json"
        );
        assert_eq!(ResponseMeta::mime_from_content_type("Text/HTML"), "text/html");
        assert_eq!(ResponseMeta::mime_from_content_type(""), "");
    }
}

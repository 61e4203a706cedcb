use bytes::Bytes;
use url::form_urlencoded;

use super::error::HttpError;
use super::request::{BuiltRequest, HttpRequest, Parameters};

/// 请求编码能力：把参数编进请求（查询串或请求体）
///
/// Builder 无状态，可在并发请求间复用。
pub trait RequestBuilder: Send {
    fn build(
        &self,
        request: HttpRequest,
        parameters: Option<&Parameters>,
    ) -> Result<BuiltRequest, HttpError>;
}

/// 通用编码器
///
/// GET/HEAD/DELETE：参数按键字典序并入 URL 查询串，不进请求体；
/// 其余方法：参数序列化为 form-urlencoded 请求体并设置 Content-Type。
pub struct HttpRequestBuilder {
    /// 是否对查询串做百分号编码（关闭则原样拼接）
    pub percent_encode: bool,
}

impl HttpRequestBuilder {
    pub fn new() -> Self {
        Self { percent_encode: true }
    }

    pub fn raw() -> Self {
        Self { percent_encode: false }
    }
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder for HttpRequestBuilder {
    fn build(
        &self,
        request: HttpRequest,
        parameters: Option<&Parameters>,
    ) -> Result<BuiltRequest, HttpError> {
        let parameters = match parameters {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(request.into()),
        };

        let mut built: BuiltRequest = request.into();
        let encoded = form_encoded(parameters, self.percent_encode);
        if built.method.is_query_parameterized() {
            built.url.set_query(Some(&encoded));
        } else {
            built.body = Some(Bytes::from(encoded));
            built.headers.push((
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            ));
        }
        Ok(built)
    }
}

/// JSON 编码器
///
/// 请求体方法把参数序列化为 JSON 对象；查询串方法退回通用编码器，
/// 绝不尝试把 JSON 编进 URL。
pub struct JsonRequestBuilder {
    inner: HttpRequestBuilder,
}

impl JsonRequestBuilder {
    pub fn new() -> Self {
        Self { inner: HttpRequestBuilder::new() }
    }
}

impl Default for JsonRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder for JsonRequestBuilder {
    fn build(
        &self,
        request: HttpRequest,
        parameters: Option<&Parameters>,
    ) -> Result<BuiltRequest, HttpError> {
        let Some(parameters) = parameters else {
            return Err(HttpError::Encoding("JSON 编码器缺少请求参数".to_string()));
        };

        if request.method.is_query_parameterized() {
            return self.inner.build(request, Some(parameters));
        }

        let body = serde_json::to_vec(parameters)
            .map_err(|e| HttpError::Encoding(format!("JSON 序列化失败: {}", e)))?;
        let mut built: BuiltRequest = request.into();
        built.body = Some(Bytes::from(body));
        built.headers.push((
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        ));
        Ok(built)
    }
}

/// 参数编码为 `k=v&k=v`，键按字典序升序
fn form_encoded(parameters: &Parameters, percent_encode: bool) -> String {
    if percent_encode {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in parameters {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    } else {
        parameters
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::HttpMethod;

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_query_keys_sorted_ascending() {
        let p = params(&[("b", "2"), ("a", "1")]);
        let request = HttpRequest::parse(HttpMethod::Get, "http://example.com/api").unwrap();
        let built = HttpRequestBuilder::raw().build(request, Some(&p)).unwrap();
        assert_eq!(built.url.query(), Some("a=1&b=2"));
        assert!(built.body.is_none());
    }

    #[test]
    fn test_get_parameters_never_in_body() {
        let p = params(&[("q", "rust"), ("page", "2")]);
        for method in [HttpMethod::Get, HttpMethod::Head, HttpMethod::Delete] {
            let request = HttpRequest::parse(method, "http://example.com/").unwrap();
            let built = HttpRequestBuilder::new().build(request, Some(&p)).unwrap();
            assert!(built.body.is_none());
            assert!(built.url.query().is_some());
        }
    }

    #[test]
    fn test_post_parameters_never_in_url() {
        let p = params(&[("name", "值"), ("id", "7")]);
        let request = HttpRequest::parse(HttpMethod::Post, "http://example.com/submit").unwrap();
        let built = HttpRequestBuilder::new().build(request, Some(&p)).unwrap();
        assert!(built.url.query().is_none());
        let body = built.body.expect("POST 应有请求体");
        assert!(!body.is_empty());
        let content_type = built
            .headers
            .iter()
            .find(|(k, _)| k == "Content-Type")
            .map(|(_, v)| v.as_str());
        assert_eq!(
            content_type,
            Some("application/x-www-form-urlencoded; charset=utf-8")
        );
    }

    #[test]
    fn test_percent_encode_round_trip() {
        let p = params(&[("q", "swift code")]);
        let request = HttpRequest::parse(HttpMethod::Get, "http://example.com/search").unwrap();
        let built = HttpRequestBuilder::new().build(request, Some(&p)).unwrap();
        let query = built.url.query().unwrap();
        let decoded: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(decoded, vec![("q".to_string(), "swift code".to_string())]);
    }

    #[test]
    fn test_no_parameters_leaves_request_unchanged() {
        let request = HttpRequest::parse(HttpMethod::Get, "http://example.com/plain").unwrap();
        let built = HttpRequestBuilder::new().build(request, None).unwrap();
        assert!(built.url.query().is_none());
        assert!(built.body.is_none());
        assert!(built.headers.is_empty());
    }

    #[test]
    fn test_json_builder_body_methods() {
        let p = params(&[("name", "netkit"), ("lang", "rust")]);
        let request = HttpRequest::parse(HttpMethod::Post, "http://example.com/api").unwrap();
        let built = JsonRequestBuilder::new().build(request, Some(&p)).unwrap();
        let body = built.body.expect("JSON POST 应有请求体");
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["name"], "netkit");
        assert_eq!(value["lang"], "rust");
        let content_type = built
            .headers
            .iter()
            .find(|(k, _)| k == "Content-Type")
            .map(|(_, v)| v.as_str());
        assert_eq!(content_type, Some("application/json; charset=utf-8"));
    }

    #[test]
    fn test_json_builder_delegates_query_methods() {
        let p = params(&[("b", "2"), ("a", "1")]);
        let request = HttpRequest::parse(HttpMethod::Delete, "http://example.com/item").unwrap();
        let built = JsonRequestBuilder::new().build(request, Some(&p)).unwrap();
        // 与通用编码器一致：参数进查询串，而非 JSON 体
        assert!(built.body.is_none());
        assert_eq!(built.url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_json_builder_requires_parameters() {
        let request = HttpRequest::parse(HttpMethod::Post, "http://example.com/api").unwrap();
        let err = JsonRequestBuilder::new().build(request, None).unwrap_err();
        assert!(matches!(err, HttpError::Encoding(_)));
    }
}

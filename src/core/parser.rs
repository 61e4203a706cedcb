use std::marker::PhantomData;

use bytes::Bytes;

use super::error::HttpError;
use super::request::ResponseMeta;

/// 响应体解码步骤：字节到结构化值，无状态
pub trait DataDecoder: Send + 'static {
    type Value: Send + 'static;

    fn decode(data: Bytes) -> Result<Self::Value, HttpError>;
}

/// 原样返回字节
pub struct RawDecoder;

impl DataDecoder for RawDecoder {
    type Value = Bytes;

    fn decode(data: Bytes) -> Result<Self::Value, HttpError> {
        Ok(data)
    }
}

/// 解码为通用 JSON 值
pub struct JsonDecoder;

impl DataDecoder for JsonDecoder {
    type Value = serde_json::Value;

    fn decode(data: Bytes) -> Result<Self::Value, HttpError> {
        serde_json::from_slice(&data).map_err(|e| HttpError::Parse(format!("JSON 解码失败: {}", e)))
    }
}

/// 响应解析能力：先核对内容类型，再解码字节
///
/// `decode` 由会话放到阻塞线程池上执行，不会阻塞事件线程；
/// 零长度响应体不会进入 `decode`。
pub trait ResponseParser: Send + 'static {
    type Value: Send + 'static;

    fn should_accept(&self, response: &ResponseMeta) -> Result<(), HttpError>;
    fn decode(&self, data: Bytes) -> Result<Self::Value, HttpError>;
}

/// 带 MIME 白名单的解析器
///
/// 白名单不命中时，URL 扩展名为 `.json` 仍放行（服务端 Content-Type
/// 配错是常事）。
pub struct HttpResponseParser<D: DataDecoder> {
    pub accepted_mime_types: Vec<String>,
    _decoder: PhantomData<D>,
}

impl<D: DataDecoder> HttpResponseParser<D> {
    pub fn new(accepted_mime_types: &[&str]) -> Self {
        Self {
            accepted_mime_types: accepted_mime_types.iter().map(|s| s.to_string()).collect(),
            _decoder: PhantomData,
        }
    }
}

impl<D: DataDecoder> ResponseParser for HttpResponseParser<D> {
    type Value = D::Value;

    fn should_accept(&self, response: &ResponseMeta) -> Result<(), HttpError> {
        let mime = response.mime();
        let accepted = self
            .accepted_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime));
        let json_extension = response
            .url
            .path()
            .to_ascii_lowercase()
            .ends_with(".json");
        if accepted || json_extension {
            Ok(())
        } else {
            Err(HttpError::ContentType {
                received: mime.to_string(),
                expected: self.accepted_mime_types.join(", "),
            })
        }
    }

    fn decode(&self, data: Bytes) -> Result<Self::Value, HttpError> {
        D::decode(data)
    }
}

/// JSON 解析器，接受常见的 JSON Content-Type
pub type JsonResponseParser = HttpResponseParser<JsonDecoder>;

pub fn json_parser() -> JsonResponseParser {
    HttpResponseParser::new(&["application/json", "text/javascript"])
}

/// 原始字节解析器：接受任何内容类型，跳过核对
pub struct DataResponseParser;

impl ResponseParser for DataResponseParser {
    type Value = Bytes;

    fn should_accept(&self, _response: &ResponseMeta) -> Result<(), HttpError> {
        Ok(())
    }

    fn decode(&self, data: Bytes) -> Result<Self::Value, HttpError> {
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn meta(url: &str, mime: Option<&str>) -> ResponseMeta {
        ResponseMeta {
            url: Url::parse(url).unwrap(),
            status: 200,
            mime_type: mime.map(|s| s.to_string()),
            content_length: None,
            headers: Vec::new(),
        }
    }

    #[test]
    fn test_json_parser_accepts_json_mime() {
        let parser = json_parser();
        assert!(parser.should_accept(&meta("http://a.com/api", Some("application/json"))).is_ok());
        assert!(parser.should_accept(&meta("http://a.com/api", Some("text/javascript"))).is_ok());
    }

    #[test]
    fn test_json_parser_rejects_html() {
        let parser = json_parser();
        let err = parser
            .should_accept(&meta("http://a.com/page", Some("text/html")))
            .unwrap_err();
        assert!(matches!(err, HttpError::ContentType { .. }));
    }

    #[test]
    fn test_json_extension_fallback() {
        // Content-Type 配错但路径以 .json 结尾，仍然放行
        let parser = json_parser();
        assert!(parser
            .should_accept(&meta("http://a.com/feed.JSON", Some("text/plain")))
            .is_ok());
    }

    #[test]
    fn test_json_decode() {
        let parser = json_parser();
        let value = parser.decode(Bytes::from_static(b"{\"ok\":true}")).unwrap();
        assert_eq!(value["ok"], true);

        let err = parser.decode(Bytes::from_static(b"{broken")).unwrap_err();
        assert!(matches!(err, HttpError::Parse(_)));
    }

    #[test]
    fn test_data_parser_accepts_anything() {
        let parser = DataResponseParser;
        assert!(parser.should_accept(&meta("http://a.com/blob", None)).is_ok());
        assert!(parser
            .should_accept(&meta("http://a.com/blob", Some("application/octet-stream")))
            .is_ok());
        let data = Bytes::from_static(b"\x00\x01\x02");
        assert_eq!(parser.decode(data.clone()).unwrap(), data);
    }
}

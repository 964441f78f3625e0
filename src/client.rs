use std::path::Path;
use std::time::Duration;
use reqwest::blocking::{multipart, Client};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors that end a dispatch. Displayed text goes straight into the results panel.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Server error: {0}")]
    Status(u16),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint { AnalyzeDump, AnalyzeCode, ScanSystem }

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::AnalyzeDump => "/api/analyze-dump",
            Endpoint::AnalyzeCode => "/api/analyze-code",
            Endpoint::ScanSystem => "/api/scan-system",
        }
    }

    pub fn method(&self) -> &'static str {
        match self { Endpoint::ScanSystem => "GET", _ => "POST" }
    }

    /// Used in "Error <verb>: <message>".
    pub fn verb(&self) -> &'static str {
        match self {
            Endpoint::AnalyzeDump => "analyzing dump file",
            Endpoint::AnalyzeCode => "analyzing error code",
            Endpoint::ScanSystem => "scanning system",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ApiRequest {
    AnalyzeDump { file_name: String, bytes: Vec<u8> },
    AnalyzeCode { error_code: String },
    ScanSystem,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeBody<'a> { error_code: &'a str }

impl ApiRequest {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ApiRequest::AnalyzeDump { .. } => Endpoint::AnalyzeDump,
            ApiRequest::AnalyzeCode { .. } => Endpoint::AnalyzeCode,
            ApiRequest::ScanSystem => Endpoint::ScanSystem,
        }
    }

    /// JSON body for the code lookup; the other requests carry none.
    pub fn json_body(&self) -> Option<Value> {
        match self {
            ApiRequest::AnalyzeCode { error_code } => serde_json::to_value(CodeBody { error_code }).ok(),
            _ => None,
        }
    }

    pub fn dump_from_path(path: &Path) -> Result<ApiRequest, ClientError> {
        let bytes = std::fs::read(path)?;
        let file_name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "upload.dmp".to_string());
        Ok(ApiRequest::AnalyzeDump { file_name, bytes })
    }
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub trait Transport {
    fn send(&self, req: &ApiRequest) -> Result<ApiResponse, ClientError>;
}

/// Talks to the analyzer server over HTTP.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn url(&self, ep: Endpoint) -> String { format!("{}{}", self.base_url, ep.path()) }
}

impl Transport for HttpTransport {
    fn send(&self, req: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = self.url(req.endpoint());
        log::debug!("{} {}", req.endpoint().method(), url);
        let resp = match req {
            ApiRequest::AnalyzeDump { file_name, bytes } => {
                let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                let form = multipart::Form::new().part("dumpFile", part);
                self.client.post(&url).multipart(form).send()?
            }
            ApiRequest::AnalyzeCode { .. } => {
                let body = req.json_body().unwrap_or(Value::Null);
                self.client.post(&url).json(&body).send()?
            }
            ApiRequest::ScanSystem => self.client.get(&url).send()?,
        };
        let status = resp.status().as_u16();
        let body = resp.bytes()?.to_vec();
        log::debug!("{} answered {} ({} bytes)", url, status, body.len());
        Ok(ApiResponse { status, body })
    }
}

/// One request, one parsed JSON body. Any status outside 2xx fails regardless of the body.
pub fn dispatch(t: &dyn Transport, req: &ApiRequest) -> Result<Value, ClientError> {
    let resp = t.send(req)?;
    if !(200..300).contains(&resp.status) { return Err(ClientError::Status(resp.status)); }
    Ok(serde_json::from_slice(&resp.body)?)
}

pub fn failure_message(ep: Endpoint, err: &ClientError) -> String {
    format!("Error {}: {}", ep.verb(), err)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTransport;
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoints_are_fixed() {
        assert_eq!(Endpoint::AnalyzeDump.path(), "/api/analyze-dump");
        assert_eq!(Endpoint::AnalyzeCode.path(), "/api/analyze-code");
        assert_eq!(Endpoint::ScanSystem.path(), "/api/scan-system");
        assert_eq!(Endpoint::ScanSystem.method(), "GET");
        assert_eq!(Endpoint::AnalyzeDump.method(), "POST");
    }

    #[test]
    fn code_body_uses_camel_case() {
        let req = ApiRequest::AnalyzeCode { error_code: "0x0000007B".into() };
        assert_eq!(req.json_body(), Some(json!({"errorCode": "0x0000007B"})));
        assert_eq!(ApiRequest::ScanSystem.json_body(), None);
    }

    #[test]
    fn non_success_status_fails_regardless_of_body() {
        let t = FakeTransport::status(500, r#"{"code": "0x7B"}"#);
        let err = dispatch(&t, &ApiRequest::ScanSystem).unwrap_err();
        assert_eq!(err.to_string(), "Server error: 500");
        assert_eq!(failure_message(Endpoint::AnalyzeCode, &err), "Error analyzing error code: Server error: 500");
    }

    #[test]
    fn malformed_json_is_a_failure() {
        let t = FakeTransport::ok("<html>not json</html>");
        assert!(matches!(dispatch(&t, &ApiRequest::ScanSystem), Err(ClientError::Json(_))));
    }

    #[test]
    fn success_parses_body() {
        let t = FakeTransport::ok(r#"{"crashes": []}"#);
        assert_eq!(dispatch(&t, &ApiRequest::ScanSystem).unwrap(), json!({"crashes": []}));
        assert_eq!(t.sent.borrow().len(), 1);
    }

    #[test]
    fn dump_request_keeps_file_name() {
        let p = std::env::temp_dir().join("bsodview-client-test.dmp");
        std::fs::write(&p, b"PAGEDU64").unwrap();
        let req = ApiRequest::dump_from_path(&p).unwrap();
        assert_eq!(req, ApiRequest::AnalyzeDump { file_name: "bsodview-client-test.dmp".into(), bytes: b"PAGEDU64".to_vec() });
        let _ = std::fs::remove_file(&p);
        assert!(matches!(ApiRequest::dump_from_path(&p), Err(ClientError::Io(_))));
    }

    /// Answers one connection with `{}` and hands back the raw request text.
    fn serve_once() -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 { break; }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                let Some(end) = text.find("\r\n\r\n") else { continue };
                let head = text[..end].to_ascii_lowercase();
                let body_len = head.lines()
                    .find_map(|l| l.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0)));
                let done = match body_len {
                    Some(len) => raw.len() >= end + 4 + len,
                    None if head.contains("transfer-encoding: chunked") => text.ends_with("0\r\n\r\n"),
                    None => true,
                };
                if done { break; }
            }
            stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}").unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (base, handle)
    }

    #[test]
    fn dump_upload_is_multipart_dump_file() {
        let (base, server) = serve_once();
        let t = HttpTransport::new(&base, Duration::from_secs(10)).unwrap();
        let req = ApiRequest::AnalyzeDump { file_name: "x.dmp".into(), bytes: b"PAGEDU64".to_vec() };
        assert_eq!(dispatch(&t, &req).unwrap(), json!({}));
        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /api/analyze-dump HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("content-type: multipart/form-data"));
        assert!(raw.contains("name=\"dumpFile\"; filename=\"x.dmp\""));
        assert!(raw.contains("PAGEDU64"));
    }

    #[test]
    fn code_lookup_posts_json() {
        let (base, server) = serve_once();
        let t = HttpTransport::new(&base, Duration::from_secs(10)).unwrap();
        dispatch(&t, &ApiRequest::AnalyzeCode { error_code: "0x0000007B".into() }).unwrap();
        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /api/analyze-code HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(raw.ends_with(r#"{"errorCode":"0x0000007B"}"#));
    }

    #[test]
    fn scan_is_a_plain_get() {
        let (base, server) = serve_once();
        let t = HttpTransport::new(&base, Duration::from_secs(10)).unwrap();
        dispatch(&t, &ApiRequest::ScanSystem).unwrap();
        let raw = server.join().unwrap();
        assert!(raw.starts_with("GET /api/scan-system HTTP/1.1"));
        assert!(!raw.to_ascii_lowercase().contains("content-type"));
    }

    #[test]
    fn base_url_joins_paths() {
        let t = HttpTransport::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(t.url(Endpoint::ScanSystem), "http://localhost:5000/api/scan-system");
    }
}

//! HTTP plumbing shared by the client and the proof-of-play engine.
//!
//! Transports are blocking (libcurl); async callers go through [`send`],
//! which runs the exchange on the blocking pool.

mod curl_transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{TransportError, TransportErrorKind};

pub use curl_transport::{classify_curl_error, CurlTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Vec<u8>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
            timeout,
        }
    }

    /// Approximate bytes put on the wire: header lines plus body.
    pub fn bytes_sent(&self) -> u64 {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.len() + value.len() + 4)
            .sum();
        (headers + self.body.len()) as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u32,
    /// Raw header lines, status line included, without trailing CRLF.
    pub headers: Vec<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn bytes_received(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|line| line.len() + 2).sum();
        (headers + self.body.len()) as u64
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs one blocking HTTP exchange.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
{
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self(request)
    }
}

/// Run `request` on the blocking pool.
pub async fn send(
    transport: Arc<dyn Transport>,
    request: HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let url = request.url.clone();
    tokio::task::spawn_blocking(move || transport.execute(&request))
        .await
        .map_err(|e| {
            TransportError::new(url, TransportErrorKind::Other, format!("transport task: {}", e))
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_accounting_counts_headers_and_body() {
        let req = HttpRequest::post_json(
            "http://x/pop",
            b"{\"display_time\":1}".to_vec(),
            Duration::from_secs(1),
        );
        // "Content-Type" (12) + "application/json" (16) + 4, body 18
        assert_eq!(req.bytes_sent(), 32 + 18);

        let resp = HttpResponse {
            status: 200,
            headers: vec!["HTTP/1.1 200 OK".into(), "Content-Length: 2".into()],
            body: b"ok".to_vec(),
        };
        assert_eq!(resp.bytes_received(), 17 + 19 + 2);
    }

    #[tokio::test]
    async fn send_runs_closure_transports() {
        let transport: Arc<dyn Transport> =
            Arc::new(|req: &HttpRequest| -> Result<HttpResponse, TransportError> {
                Ok(HttpResponse::new(204, req.url.clone().into_bytes()))
            });
        let resp = send(transport, HttpRequest::get("http://x/exp", Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(resp.body_text(), "http://x/exp");
    }
}

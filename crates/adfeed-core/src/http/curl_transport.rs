//! libcurl-backed transport.

use std::str;
use std::time::Duration;

use ::curl::easy::{Easy, List};

use super::{HttpRequest, HttpResponse, Method, Transport};
use crate::error::{TransportError, TransportErrorKind};

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// One `Easy` handle per exchange; no connection reuse between calls.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    user_agent: String,
}

impl CurlTransport {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    fn perform(&self, request: &HttpRequest) -> Result<HttpResponse, ::curl::Error> {
        let mut headers: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = Easy::new();
        easy.url(&request.url)?;
        easy.useragent(&self.user_agent)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(request.timeout.min(MAX_CONNECT_TIMEOUT))?;
        easy.timeout(request.timeout)?;
        match request.method {
            Method::Get => easy.get(true)?,
            Method::Post => {
                easy.post(true)?;
                easy.post_fields_copy(&request.body)?;
            }
        }

        let mut list = List::new();
        for (name, value) in &request.headers {
            list.append(&format!("{}: {}", name.trim(), value.trim()))?;
        }
        // Suppress `Expect: 100-continue` on larger POST bodies.
        list.append("Expect:")?;
        easy.http_headers(list)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    if !line.is_empty() {
                        headers.push(line.to_string());
                    }
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let status = easy.response_code()?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for CurlTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        tracing::debug!(method = %request.method, url = %request.url, "http request");
        self.perform(request).map_err(|e| {
            TransportError::new(request.url.clone(), classify_curl_error(&e), e.to_string())
        })
    }
}

/// Classify a curl error for retry decisions and logging.
pub fn classify_curl_error(e: &::curl::Error) -> TransportErrorKind {
    if e.is_operation_timedout() {
        return TransportErrorKind::Timeout;
    }
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        return TransportErrorKind::InvalidUrl;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return TransportErrorKind::Connection;
    }
    TransportErrorKind::Other
}

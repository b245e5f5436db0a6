//! In-memory collaborators for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::document::{ExtractError, ExtractOptions, PageTable, TableExtractor, TextEncoding};
use crate::error::{RegistrarError, Result};
use crate::http_client::{Transport, TransportResponse};

/// A request the stub saw.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    /// Form fields for POST, query parameters for GET.
    pub fields: Vec<(String, String)>,
    pub timeout: Duration,
}

enum Reply {
    Body { content_type: &'static str, body: Bytes },
    Status(u16),
}

/// [`Transport`] answering every request with the same canned reply.
pub struct StubTransport {
    reply: Reply,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    fn with(reply: Reply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn json(value: Value) -> Self {
        Self::with(Reply::Body {
            content_type: "application/json",
            body: Bytes::from(value.to_string()),
        })
    }

    pub fn bytes(body: Vec<u8>) -> Self {
        Self::with(Reply::Body {
            content_type: "application/pdf",
            body: Bytes::from(body),
        })
    }

    pub fn html(body: &str) -> Self {
        Self::with(Reply::Body {
            content_type: "text/html",
            body: Bytes::from(body.to_string()),
        })
    }

    /// Every request fails as a non-2xx response.
    pub fn failing(status: u16) -> Self {
        Self::with(Reply::Status(status))
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn respond(
        &self,
        method: &'static str,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            fields: fields.to_vec(),
            timeout,
        });

        match &self.reply {
            Reply::Body { content_type, body } => Ok(TransportResponse {
                url: url.to_string(),
                content_type: Some((*content_type).to_string()),
                body: body.clone(),
            }),
            Reply::Status(status) => Err(RegistrarError::Transport {
                url: url.to_string(),
                status: Some(*status),
                message: format!("server responded with {status}"),
            }),
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse> {
        self.respond("POST", url, fields, timeout)
    }

    async fn get(&self, url: &str, query: &[(String, String)], timeout: Duration) -> Result<TransportResponse> {
        self.respond("GET", url, query, timeout)
    }
}

/// [`TableExtractor`] returning fixed pages, optionally failing to decode
/// for chosen encodings. Records the encoding of every call.
#[derive(Default)]
pub struct StubExtractor {
    pages: Vec<PageTable>,
    error: Option<ExtractError>,
    failing: Vec<TextEncoding>,
    calls: Mutex<Vec<TextEncoding>>,
}

impl StubExtractor {
    pub fn pages(pages: Vec<PageTable>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn error(error: ExtractError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_for(mut self, encoding: TextEncoding) -> Self {
        self.failing.push(encoding);
        self
    }

    pub fn encodings(&self) -> Vec<TextEncoding> {
        self.calls.lock().unwrap().clone()
    }
}

impl TableExtractor for StubExtractor {
    fn extract(&self, _bytes: &[u8], options: &ExtractOptions) -> std::result::Result<Vec<PageTable>, ExtractError> {
        self.calls.lock().unwrap().push(options.encoding);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.failing.contains(&options.encoding) {
            return Err(ExtractError::Decode {
                encoding: options.encoding.name(),
            });
        }
        Ok(self.pages.clone())
    }
}

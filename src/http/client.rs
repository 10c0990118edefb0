use super::debug::HttpDebugConfig;
use crate::trace::{SessionTrace, TraceRecord, body_value, header_fields};
use reqwest::header::HeaderMap;
use reqwest::{Client, Request};
use serde::Serialize;
use std::fmt;

const LOG_TARGET: &str = "persona_chat::http";

/// Shared `reqwest` client. Every exchange is mirrored verbatim into the
/// session trace and, with `--verbose`, logged with secrets masked.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    debug: HttpDebugConfig,
    trace: Option<SessionTrace>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("debug", &self.debug)
            .field("traced", &self.trace.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseData {
    pub status: u16,
    pub body: String,
}

impl HttpResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpClient {
    pub fn new(inner: Client, debug: HttpDebugConfig) -> Self {
        Self {
            inner,
            debug,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        bearer: Option<&str>,
        payload: &T,
    ) -> Result<HttpResponseData, reqwest::Error> {
        let mut builder = self.inner.post(url).json(payload);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let request = builder.build()?;
        let shown = self.debug.json_body(&sent_body(&request));
        self.send(request, shown).await
    }

    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
    ) -> Result<HttpResponseData, reqwest::Error> {
        let request = self.inner.post(url).form(fields).build()?;
        let shown = self.debug.form_body(fields);
        self.send(request, shown).await
    }

    async fn send(
        &self,
        request: Request,
        shown_body: String,
    ) -> Result<HttpResponseData, reqwest::Error> {
        if self.debug.enabled {
            tracing::debug!(target: LOG_TARGET, "{}", describe_request(&self.debug, &request, &shown_body));
        }
        if let Some(trace) = &self.trace {
            let sent = sent_body(&request);
            trace.record(TraceRecord::HttpRequest {
                method: request.method().as_str(),
                url: request.url().as_str(),
                headers: header_fields(request.headers()),
                body: body_value(&sent),
            });
        }

        let response = match self.inner.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                if let Some(trace) = &self.trace {
                    trace.record(TraceRecord::HttpError {
                        message: err.to_string(),
                    });
                }
                return Err(err);
            }
        };
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if self.debug.enabled {
            tracing::debug!(target: LOG_TARGET, "{}", describe_response(&self.debug, status, &headers, &body));
        }
        if let Some(trace) = &self.trace {
            trace.record(TraceRecord::HttpResponse {
                status,
                headers: header_fields(&headers),
                body: body_value(&body),
            });
        }

        Ok(HttpResponseData { status, body })
    }
}

fn sent_body(request: &Request) -> String {
    request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

fn describe_request(debug: &HttpDebugConfig, request: &Request, body: &str) -> String {
    let mut text = format!("--> {} {}", request.method(), request.url());
    push_headers(&mut text, debug, request.headers());
    push_body(&mut text, &debug.clip(body));
    text
}

fn describe_response(debug: &HttpDebugConfig, status: u16, headers: &HeaderMap, body: &str) -> String {
    let mut text = format!("<-- {status}");
    push_headers(&mut text, debug, headers);
    push_body(&mut text, &debug.clip(&debug.json_body(body)));
    text
}

fn push_headers(text: &mut String, debug: &HttpDebugConfig, headers: &HeaderMap) {
    for (name, value) in headers {
        text.push_str(&format!("\n    {name}: {}", debug.header(name.as_str(), value)));
    }
}

fn push_body(text: &mut String, body: &str) {
    if body.is_empty() {
        text.push_str("\n    (empty body)");
    }
    for line in body.lines() {
        text.push_str("\n    ");
        text.push_str(line);
    }
}

// response.rs — Error responses.
//
// Every failure leaves the API as an ApiError: a status, a short cause, an
// optional detailed error and an optional machine-readable code. Details are
// only attached for client errors; internal errors are logged where they
// happen and answered with the cause alone.
//
//   text/plain (default)   "{cause}:\n\n{error}"  + X-Error-Code header
//   application/json       {"cause": ..., "error": ..., "code": ...}

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::negotiate::negotiate_content_type;

const OFFERS: &[&str] = &["text/plain", "application/json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

impl ResponseFormat {
    pub fn negotiate(headers: &HeaderMap) -> Self {
        match negotiate_content_type(headers, OFFERS, "text/plain") {
            "application/json" => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ErrorBody<'a> {
    cause: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub cause: &'static str,
    pub error: Option<String>,
    pub code: Option<&'static str>,
    pub format: ResponseFormat,
}

impl ApiError {
    /// A client error; `error` is shown to the caller.
    pub fn client(status: StatusCode, cause: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            cause,
            error: Some(error.into()),
            code: None,
            format: ResponseFormat::Text,
        }
    }

    /// A failure whose details stay in the logs.
    pub fn internal(cause: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            cause,
            error: None,
            code: None,
            format: ResponseFormat::Text,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            ..Self::internal("Authentication failed")
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Render in the format the request's `Accept` header prefers.
    pub fn negotiated(mut self, headers: &HeaderMap) -> Self {
        self.format = ResponseFormat::negotiate(headers);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            cause: self.cause,
            error: self.error.as_deref(),
            code: self.code,
        };
        match self.format {
            ResponseFormat::Json => (self.status, Json(body)).into_response(),
            ResponseFormat::Text => {
                let text = match body.error {
                    Some(error) => format!("{}:\n\n{}\n", body.cause, error),
                    None => format!("{}\n", body.cause),
                };
                let mut response = (self.status, text).into_response();
                let headers = response.headers_mut();
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
                if let Some(code) = body.code.and_then(|c| HeaderValue::from_str(c).ok()) {
                    headers.insert("x-error-code", code);
                }
                response
            }
        }
    }
}

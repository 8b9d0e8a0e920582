//! Error types for route registration and request handling.
//!
//! Two families live here:
//!
//! - [`RouteError`]: returned by registration calls when a pattern cannot be
//!   placed in the routing table. These never occur on the dispatch path.
//! - [`ApiError`]: returned by handlers and middleware. It carries the HTTP
//!   status it should be rendered with, so an error can travel unchanged up the
//!   middleware chain until something decides to translate it.

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::dispatcher::HandlerResponse;

/// Why a route could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// A `:` or `*` segment with nothing after the marker.
    #[error("empty parameter name in pattern {pattern:?}")]
    EmptyParamName { pattern: String },

    /// `*name` appeared somewhere other than the final segment.
    #[error("catch-all segment must be the last segment in pattern {pattern:?}")]
    WildcardNotLast { pattern: String },

    /// Two patterns use different parameter names at the same tree position
    /// and the router was configured to reject that.
    #[error(
        "parameter `{new}` conflicts with existing parameter `{existing}` at the same position in {pattern:?}"
    )]
    ParamConflict {
        pattern: String,
        existing: String,
        new: String,
    },
}

/// An error produced while serving a request.
///
/// Handlers return `Result<HandlerResponse, ApiError>`. Any error type that
/// converts into [`anyhow::Error`] converts into an `ApiError` with status 500,
/// so `?` works on arbitrary fallible calls inside a handler.
pub struct ApiError {
    status: StatusCode,
    code: Cow<'static, str>,
    message: String,
    details: Option<Value>,
    source: Option<anyhow::Error>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", "Route not found")
    }

    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "Too many requests, please try again later",
        )
    }

    pub fn gateway_timeout() -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            "The request took too long to process",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_server_error",
            message,
        )
    }

    /// Attach structured detail (e.g. per-field validation failures).
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    #[must_use]
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    /// Render the error as a JSON [`ErrorResponse`] body with the error's status.
    #[must_use]
    pub fn to_response(&self) -> HandlerResponse {
        let body = ErrorResponse {
            error: self.code.to_string(),
            message: Some(self.message.clone()),
            code: self.status.as_u16(),
            details: self.details.clone(),
        };
        HandlerResponse::json(
            self.status,
            serde_json::to_value(body).unwrap_or(Value::Null),
        )
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self::internal(err.to_string()).with_source(err)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.code, self.message)
    }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("status", &self.status)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("details", &self.details)
            .field("source", &self.source)
            .finish()
    }
}

/// Standard JSON error envelope.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Standard JSON success envelope used by typed handlers.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct SuccessResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

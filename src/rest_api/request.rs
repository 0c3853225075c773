//! The HTTP request as seen by the executor and the compiler.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};

use super::errors::{ApiError, ApiResult};

/// `Prefer` request header
pub const PREFER: HeaderName = HeaderName::from_static("prefer");

/// Methods the data API executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ApiMethod {
    /// Accept only the five data methods; anything else is a 400
    pub fn parse(method: &Method) -> ApiResult<Self> {
        match *method {
            Method::GET => Ok(ApiMethod::Get),
            Method::POST => Ok(ApiMethod::Post),
            Method::PUT => Ok(ApiMethod::Put),
            Method::PATCH => Ok(ApiMethod::Patch),
            Method::DELETE => Ok(ApiMethod::Delete),
            _ => Err(ApiError::MethodNotAllowed(method.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Put => "PUT",
            ApiMethod::Patch => "PATCH",
            ApiMethod::Delete => "DELETE",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, ApiMethod::Get)
    }
}

/// A data API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,

    /// Full path, prefix included
    pub path: String,

    /// Query parameters in arrival order
    pub query: Vec<(String, String)>,

    pub headers: HeaderMap,

    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether any `Prefer` header asks for `return=representation`
    pub fn prefers_representation(&self) -> bool {
        self.headers
            .get_all(PREFER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|pref| pref.trim() == "return=representation")
    }
}

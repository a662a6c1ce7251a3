//! Request and response types plus the `Transport` seam.
//!
//! The engine never talks to the network directly. A `Transport` turns a
//! [`Request`] into a future; the [`RequestClient`](crate::client::RequestClient)
//! wraps every call with registration, timeout, cancellation, and
//! connection-loss classification.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::errors::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifetime tag for a tracked request.
///
/// `Global` requests survive navigation between unrelated sections. Every
/// other group is cancelled when the user leaves the section that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RequestGroup {
    Global,
    View(String),
    #[default]
    Ungrouped,
}

impl RequestGroup {
    pub fn view(name: impl Into<String>) -> Self {
        RequestGroup::View(name.into())
    }
}

impl fmt::Display for RequestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestGroup::Global => f.write_str("global"),
            RequestGroup::View(name) => f.write_str(name),
            RequestGroup::Ungrouped => f.write_str("ungrouped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`, the admin API's default for writes.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<RequestBody>,
    pub group: RequestGroup,
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
    /// For POSTs: abort an identical POST still in flight before sending.
    pub cancel_previous: bool,
    /// Skip the pending-request registry entirely.
    pub untracked: bool,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            group: RequestGroup::default(),
            timeout: None,
            cancel_previous: false,
            untracked: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn in_group(mut self, group: RequestGroup) -> Self {
        self.group = group;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_previous(mut self) -> Self {
        self.cancel_previous = true;
        self
    }

    pub fn untracked(mut self) -> Self {
        self.untracked = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Response {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    /// Deserialize the body into a typed payload.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_value(self.body.clone()).map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })
    }
}

/// Issues requests against the cluster.
///
/// Implementations report a failure to reach the server at all as
/// [`FetchError::Connectivity`] and return every HTTP response, whatever its
/// status, as `Ok`. Dropping the returned future must abort the request.
pub trait Transport: Send + Sync + 'static {
    fn issue(&self, request: &Request) -> BoxFuture<'static, Result<Response, FetchError>>;
}

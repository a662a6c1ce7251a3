//! reqwest-backed transport for the engine.

use futures::future::BoxFuture;
use serde_json::Value;

use pulse_config::HttpConfig;
use pulse_core::{FetchError, Method, Request, RequestBody, Response, Transport};

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

impl Transport for ReqwestTransport {
    fn issue(&self, request: &Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        let url = self.resolve(&request.url);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, password.as_ref());
        }
        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Json(body)) => builder.json(body),
            None => builder,
        };

        Box::pin(async move {
            // No HTTP status at all means the cluster could not be reached.
            let response = builder
                .send()
                .await
                .map_err(|e| FetchError::connectivity(e.to_string()))?;
            let status = response.status().as_u16();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::connectivity(e.to_string()))?;
            Ok(Response {
                status,
                body: parse_body(&bytes),
            })
        })
    }
}

/// JSON when the body parses, otherwise the raw text.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base_url: &str) -> ReqwestTransport {
        let config = HttpConfig {
            base_url: Some(base_url.to_string()),
            ..HttpConfig::default()
        };
        ReqwestTransport::new(&config).unwrap()
    }

    #[test]
    fn test_resolve_joins_base_and_path() {
        let t = transport("http://node-a:8091/");
        assert_eq!(t.resolve("/pools/default"), "http://node-a:8091/pools/default");
        assert_eq!(t.resolve("pools"), "http://node-a:8091/pools");
    }

    #[test]
    fn test_resolve_keeps_absolute_urls() {
        let t = transport("http://node-a:8091");
        assert_eq!(
            t.resolve("https://node-b:18091/pools"),
            "https://node-b:18091/pools"
        );
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#)["a"], 1);
        assert_eq!(
            parse_body(b"Requested resource not found."),
            Value::String("Requested resource not found.".to_string())
        );
    }

    #[test]
    fn test_credentials_from_config() {
        let config = HttpConfig {
            username: Some("Administrator".to_string()),
            password: Some("password".to_string()),
            ..HttpConfig::default()
        };
        let t = ReqwestTransport::new(&config).unwrap();
        assert_eq!(
            t.credentials,
            Some(("Administrator".to_string(), Some("password".to_string())))
        );
    }
}

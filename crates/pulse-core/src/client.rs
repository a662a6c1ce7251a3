//! Request interceptor.
//!
//! Every request issued through `RequestClient` is registered in the
//! [`PendingRequests`] registry for its lifetime, raced against its cancel
//! handle and timeout, classified, and reported to the
//! [`ConnectionMonitor`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::connection::ConnectionMonitor;
use crate::errors::{CancelReason, FetchError};
use crate::registry::{InFlightRequest, PendingRequests};
use crate::transport::{Method, Request, Response, Transport};

#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    registry: Arc<PendingRequests>,
    monitor: Arc<ConnectionMonitor>,
    default_timeout: Option<Duration>,
}

/// Removes the registry entry however the request settles, including when
/// the caller drops the future.
struct Registration<'a> {
    registry: &'a PendingRequests,
    request: Arc<InFlightRequest>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.request);
    }
}

impl RequestClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<PendingRequests>,
        monitor: Arc<ConnectionMonitor>,
    ) -> Self {
        Self {
            transport,
            registry,
            monitor,
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<PendingRequests> {
        &self.registry
    }

    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        self.send(Request::get(url)).await
    }

    pub async fn send(&self, request: Request) -> Result<Response, FetchError> {
        let outcome = if request.untracked {
            self.transport
                .issue(&request)
                .await
                .and_then(check_status)
        } else {
            self.send_tracked(&request).await
        };

        if let Err(e) = &outcome {
            debug!(
                event = "core.client.request_failed",
                method = %request.method,
                url = %request.url,
                error = %e
            );
        }
        self.monitor.observe(&request.url, &outcome);
        outcome
    }

    async fn send_tracked(&self, request: &Request) -> Result<Response, FetchError> {
        if request.method == Method::Post && request.cancel_previous {
            if let Some(previous) = self.registry.find_in_flight(Method::Post, &request.url) {
                debug!(
                    event = "core.client.cancel_previous",
                    url = %request.url,
                    id = ?previous.id()
                );
                previous.cancel();
            }
        }

        let in_flight = InFlightRequest::new(request.method, &request.url, request.group.clone());
        self.registry.register(in_flight.clone());
        let _registration = Registration {
            registry: &self.registry,
            request: in_flight.clone(),
        };

        let timeout = request.timeout.or(self.default_timeout);
        let response = self.transport.issue(request);

        tokio::select! {
            biased;
            _ = in_flight.cancelled() => Err(FetchError::Cancelled {
                reason: CancelReason::Cancelled,
            }),
            _ = sleep_or_forever(timeout) => {
                in_flight.cancel();
                Err(FetchError::Cancelled {
                    reason: CancelReason::Timeout,
                })
            }
            result = response => result.and_then(check_status),
        }
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn check_status(response: Response) -> Result<Response, FetchError> {
    if response.status < 400 {
        Ok(response)
    } else {
        Err(FetchError::Application {
            status: response.status,
            body: response.body,
        })
    }
}

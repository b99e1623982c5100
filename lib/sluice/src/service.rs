//! Tower services as adapters.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use sluice_core::{Adapter, AdapterRequest, PoolOptions, ResponseContext, TransportError};
use tower::ServiceExt;
use tower_service::Service;

/// [`Adapter`] backed by any tower [`Service`] of [`AdapterRequest`]s.
///
/// Use it to put tower layers (concurrency limits, timeouts, ...) between the
/// pipeline and the transport. Pool options are not forwarded; the service
/// decides how to connect.
///
/// # Example
///
/// ```
/// use sluice::{HyperAdapter, ServiceAdapter};
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .concurrency_limit(8)
///     .service(HyperAdapter::new());
/// let adapter = ServiceAdapter::new(service);
/// ```
pub struct ServiceAdapter<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> ServiceAdapter<S> {
    /// Wrap a service.
    #[must_use]
    pub fn new(service: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }
}

impl<S> Clone for ServiceAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for ServiceAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAdapter").finish_non_exhaustive()
    }
}

impl<S> Adapter for ServiceAdapter<S>
where
    S: Service<AdapterRequest, Response = ResponseContext, Error = TransportError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    fn perform(
        &self,
        request: AdapterRequest,
        _pool: &PoolOptions,
    ) -> impl Future<Output = Result<ResponseContext, TransportError>> + Send {
        // Lock, clone the service, and release the lock immediately
        let service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        async move { service.oneshot(request).await }
    }
}

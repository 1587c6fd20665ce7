//! One bounded generation call.
//!
//! Every provider call made by the router, direct or inside a reasoning
//! pass, goes through [`bounded_generate`]: the call runs on its own Tokio
//! task and is abandoned after the configured timeout. A timeout, a backend
//! error, or a panicking backend all come back as
//! [`RouterError::ProviderCall`].

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{GenerationBackend, GenerationParams};
use crate::RouterError;

/// Run `backend.generate(params)` on a spawned task with a timeout.
///
/// On timeout the spawned task is aborted.
///
/// # Errors
///
/// Returns [`RouterError::ProviderCall`] against the backend's provider on
/// backend failure, timeout, or task panic.
///
/// # Panics
///
/// This function never panics.
pub async fn bounded_generate(
    backend: Arc<dyn GenerationBackend>,
    params: GenerationParams,
    timeout: Duration,
) -> Result<String, RouterError> {
    let provider = backend.provider();
    let mut handle = tokio::spawn(async move { backend.generate(&params).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result.map_err(|e| e.into_provider_call(provider)),
        Ok(Err(join_err)) => Err(RouterError::ProviderCall {
            provider,
            message: if join_err.is_panic() {
                "backend task panicked".to_string()
            } else {
                format!("backend task failed: {join_err}")
            },
        }),
        Err(_) => {
            handle.abort();
            Err(RouterError::ProviderCall {
                provider,
                message: format!("timed out after {}ms", timeout.as_millis()),
            })
        }
    }
}

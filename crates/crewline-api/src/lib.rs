pub mod channels;
pub mod compliance;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crewline_db::Store;
use crewline_gateway::{Broadcaster, ConnectionRegistry};

use crate::error::{ApiError, ApiResult};

pub struct AppStateInner {
    pub store: Arc<dyn Store>,
    pub broadcaster: Broadcaster,
    pub registry: ConnectionRegistry,
    pub jwt_secret: String,
}

pub type AppState = Arc<AppStateInner>;

/// Upper bound on a single store pass; past it the request fails with a
/// retryable 503 instead of wedging the handler.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run store work off the async runtime. rusqlite calls are blocking and
/// serialized on the connection mutex, so handlers must not run them inline.
pub(crate) async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Store) -> ApiResult<T> + Send + 'static,
{
    let store = state.store.clone();
    let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
    match tokio::time::timeout(STORE_TIMEOUT, task).await {
        Ok(joined) => joined.map_err(|e| {
            error!("spawn_blocking join error: {e}");
            ApiError::Internal
        })?,
        Err(_) => {
            error!("store call exceeded {STORE_TIMEOUT:?}");
            Err(ApiError::Unavailable)
        }
    }
}

pub mod analyzer;
pub mod digest;
pub mod email;
pub mod error;
pub mod mailer;
pub mod normalize;
pub mod processor;
pub mod sync;
pub mod twitter;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::sync::Arc;

use bookspark_db::Database;

pub use error::{Result, ServiceError};

/// Run a blocking store call off the async runtime.
pub async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
        .map_err(ServiceError::from)
}

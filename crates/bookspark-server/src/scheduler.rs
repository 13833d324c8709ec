use std::time::Duration;
use tracing::{info, warn};

use bookspark_api::auth::AppState;

/// Background task that sends due digests.
///
/// Each tick runs a full digest batch; users whose digest hour has not come
/// yet are skipped by the generator itself.
pub async fn run_digest_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.digest.generate_for_all_users().await {
            Ok(stats) => {
                if stats.sent > 0 || stats.failed > 0 {
                    info!(
                        "Digest run: {} sent, {} failed, {} skipped",
                        stats.sent, stats.failed, stats.skipped
                    );
                }
            }
            Err(e) => {
                warn!("Digest run error: {}", e);
            }
        }
    }
}

//! Background job: periodic digest runs inside `serve`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::api::AppState;
use crate::digest::DigestOrchestrator;

/// Spawn the periodic digest task. The first run happens one full interval
/// after startup.
pub fn spawn(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // interval fires immediately once; skip it
        interval.tick().await;
        loop {
            interval.tick().await;
            run_once(&state).await;
        }
    })
}

async fn run_once(state: &AppState) {
    match DigestOrchestrator::from_config(&state.config, state.store.clone()) {
        Ok(orchestrator) => {
            let report = orchestrator.run().await;
            if !report.success {
                tracing::warn!(errors = ?report.errors, "scheduled digest run finished with errors");
            }
        }
        Err(e) => tracing::error!("scheduled digest run skipped: {}", e),
    }
}

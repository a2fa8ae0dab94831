use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::state::AppState;
use crate::service::refresh::refresh_client_state;

const STATISTICS_FLUSH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// The three periodic loops driving the proxy.
///
/// Every loop observes the shutdown channel before each sleep, logs errors
/// and keeps running; no error terminates a loop. The statistics loop
/// performs one final flush after cancellation.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> Self {
        let handles = vec![
            spawn_peer_poll(state.clone(), shutdown.clone()),
            spawn_statistics_flush(state.clone(), shutdown.clone()),
            spawn_tracker_refresh(state, shutdown),
        ];
        Self { handles }
    }

    /// Wait for every loop to finish. Call after signalling shutdown.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Torrent + peer snapshot poll on the configured refresh interval.
fn spawn_peer_poll(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.infra.tr.request_interval);
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "state refresh loop started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let interval = state.config.infra.tr.request_interval as i64;
                    if let Err(err) = refresh_client_state(
                        &state.tr,
                        &state.snapshot,
                        &state.peer_cache,
                        interval,
                    )
                    .await
                    {
                        error!(error = %err, "state refresh failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("state refresh loop stopped");
                    return;
                }
            }
        }
    })
}

/// Historical totals write-through every ten minutes, plus one final write
/// on shutdown.
fn spawn_statistics_flush(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("statistics flush loop started");
        let mut ticker = tokio::time::interval(STATISTICS_FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush_statistics(&state);
                }
                _ = shutdown.changed() => {
                    flush_statistics(&state);
                    debug!("statistics flush loop stopped");
                    return;
                }
            }
        }
    })
}

fn flush_statistics(state: &AppState) {
    let persisted = state.snapshot.persistable();
    if let Err(err) = state.history.save(&persisted) {
        error!(error = %err, "failed to persist statistics");
    }
}

/// Tracker list refresh: once immediately at boot, then on the refresh
/// interval. Each tick runs in a child task and is allowed to overlap a
/// slow predecessor; the keeper publishes complete lists, so the last
/// writer wins.
fn spawn_tracker_refresh(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.infra.tr.request_interval);
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "tracker refresh loop started");
        run_tracker_tick(state.clone()).await;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = state.clone();
                    tokio::spawn(run_tracker_tick(state));
                }
                _ = shutdown.changed() => {
                    debug!("tracker refresh loop stopped");
                    return;
                }
            }
        }
    })
}

async fn run_tracker_tick(state: Arc<AppState>) {
    match state.trackers.refresh().await {
        Ok(count) => debug!(count, "tracker list refreshed"),
        Err(err) => {
            error!(error = %err, "tracker refresh failed");
            return;
        }
    }
    if let Err(err) = state.trackers.push_all(&state.tr).await {
        error!(error = %err, "tracker push failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use crate::models::torrent::HistoricalStatistics;

    #[tokio::test]
    async fn test_shutdown_triggers_final_statistics_flush() {
        let state = testing::state();
        state.snapshot.install_historical(HistoricalStatistics {
            total_downloaded: 100,
            total_uploaded: 200,
        });
        state.snapshot.apply_tick(1_048_576, 0, 0, 0);

        let (tx, rx) = watch::channel(false);
        let scheduler = Scheduler::spawn(state.clone(), rx);
        tx.send(true).unwrap();
        scheduler.join().await;

        let persisted = state.history.load_or_init().unwrap();
        assert_eq!(persisted.total_downloaded, 100 + 1_048_576);
        assert_eq!(persisted.total_uploaded, 200);
    }

    #[tokio::test]
    async fn test_loops_stop_on_shutdown() {
        let state = testing::state();
        let (tx, rx) = watch::channel(false);
        let scheduler = Scheduler::spawn(state, rx);
        tx.send(true).unwrap();
        // join must complete promptly once the channel flips
        tokio::time::timeout(Duration::from_secs(5), scheduler.join())
            .await
            .expect("scheduler loops did not observe shutdown");
    }
}

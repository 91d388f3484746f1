use crate::metrics::SWEEP_DURATION_SECONDS;
use crate::registry::Registry;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const SWEEP_INTERVAL: Duration = Duration::from_millis(5000);

pub async fn run_sweeper(registry: Arc<Registry>, sweep_interval: Duration, stale_after: TimeDelta) {
    info!(
        "Starting sweeper with interval={}ms, stale_after={}ms",
        sweep_interval.as_millis(),
        stale_after.num_milliseconds()
    );

    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep_once(&registry, stale_after);
    }
}

/// One pass over the registry, using the wall clock as "now".
pub fn sweep_once(registry: &Registry, stale_after: TimeDelta) -> Vec<String> {
    let start = Instant::now();
    let now = Utc::now();

    let demoted = registry.sweep(now, stale_after);

    SWEEP_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
    if demoted.is_empty() {
        debug!("Sweep found no stale devices");
    } else {
        info!("Marked {} device(s) offline: {}", demoted.len(), demoted.join(", "));
    }
    demoted
}

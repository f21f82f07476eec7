// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize telemetry (logs + metric descriptions).
///
/// Logs go to stderr so command output on stdout stays machine readable.
/// Metrics are recorded through the `metrics` facade and are no-ops unless
/// the embedding process installs a recorder.
pub fn init_telemetry() {
    // 1. Tracing (logs)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lore_node=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    // 2. Metric descriptions
    metrics::describe_counter!("lore_events_appended_total", "Events appended to the knowledge log");
    metrics::describe_histogram!("lore_replay_duration_seconds", "Time taken to rebuild state on open");
    metrics::describe_counter!("lore_snapshot_saves_total", "Snapshot files written");
    metrics::describe_counter!("lore_compactions_total", "Completed log compactions");
    metrics::describe_histogram!("lore_lock_wait_seconds", "Time spent waiting for the write lock");
    metrics::describe_counter!("lore_stale_locks_reclaimed_total", "Abandoned write locks removed");
}

// Lock metrics
// Counters and a wait-time histogram, labeled by lock name. Recording is a
// no-op until the application installs a `metrics` recorder.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const LOCK_ACQUIRED_TOTAL: &str = "dsync_lock_acquired_total";
pub const LOCK_CONTENDED_TOTAL: &str = "dsync_lock_contended_total";
pub const LOCK_TIMEOUT_TOTAL: &str = "dsync_lock_timeout_total";
pub const LOCK_RELEASED_TOTAL: &str = "dsync_lock_released_total";
pub const LOCK_WAIT_SECONDS: &str = "dsync_lock_wait_seconds";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(LOCK_ACQUIRED_TOTAL, "Total number of successful lock acquisitions");
    describe_counter!(
        LOCK_CONTENDED_TOTAL,
        "Total number of acquisition attempts rejected because another session held the lock"
    );
    describe_counter!(LOCK_TIMEOUT_TOTAL, "Total number of lock calls that timed out");
    describe_counter!(LOCK_RELEASED_TOTAL, "Total number of successful unlocks");
    describe_histogram!(LOCK_WAIT_SECONDS, "Time spent in lock() before acquiring, in seconds");
}

pub(crate) fn record_acquired(name: &str, waited: Duration) {
    counter!(LOCK_ACQUIRED_TOTAL, "lock" => name.to_string()).increment(1);
    histogram!(LOCK_WAIT_SECONDS, "lock" => name.to_string()).record(waited.as_secs_f64());
}

pub(crate) fn record_contended(name: &str) {
    counter!(LOCK_CONTENDED_TOTAL, "lock" => name.to_string()).increment(1);
}

pub(crate) fn record_timeout(name: &str) {
    counter!(LOCK_TIMEOUT_TOTAL, "lock" => name.to_string()).increment(1);
}

pub(crate) fn record_released(name: &str) {
    counter!(LOCK_RELEASED_TOTAL, "lock" => name.to_string()).increment(1);
}

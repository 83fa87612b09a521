//! Metric names and descriptions.
//!
//! The ledger only emits through the `metrics` facade. Whichever recorder the
//! host process installs (Prometheus, statsd, none) receives them; call
//! [`describe_metrics`] once after installing it to attach help text.

use metrics::{Unit, describe_counter, describe_histogram};

/// Commands received, labelled by `command`
pub const COMMANDS_TOTAL: &str = "market.commands.total";
/// Commands rejected, labelled by `command` and error `kind`
pub const COMMANDS_REJECTED: &str = "market.commands.rejected";
/// Completed sales, labelled by `channel`
pub const SALES_TOTAL: &str = "market.sales.total";
/// Journal appends that failed
pub const JOURNAL_FAILURES: &str = "market.journal.failures";
/// Time from journal append to applied state
pub const COMMIT_DURATION: &str = "market.commit.duration_seconds";

/// Register descriptions for every ledger metric.
pub fn describe_metrics() {
    describe_counter!(COMMANDS_TOTAL, "Total number of commands received by the market");
    describe_counter!(
        COMMANDS_REJECTED,
        "Commands that failed validation or could not be persisted"
    );
    describe_counter!(SALES_TOTAL, "Completed card sales by channel");
    describe_counter!(JOURNAL_FAILURES, "Journal appends that did not become durable");
    describe_histogram!(
        COMMIT_DURATION,
        Unit::Seconds,
        "Time taken to journal and apply a command"
    );
}

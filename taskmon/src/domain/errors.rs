//! Structured error types for taskmon
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every variant here is fatal: recoverable conditions (a single bad netlink
//! reply, a duplicate registry create) never surface as errors, they are
//! logged at debug level where they happen.

use super::types::Tid;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("bitmap overflow: id {id} outside universe of {universe}")]
    BitmapOverflow { id: u32, universe: u32 },

    #[error("could not resolve the {0} netlink family id")]
    FamilyResolutionFailed(&'static str),

    #[error("counter regression for {tid}: {field} went from {old} to {new}")]
    CounterRegression { tid: Tid, field: &'static str, old: u64, new: u64 },

    #[error(
        "measurement interval too short: sampling took {elapsed:?} of a {target:?} interval"
    )]
    IntervalTooShort { elapsed: Duration, target: Duration },

    #[error("malformed counter line in {source_file}: {line:?}")]
    MalformedCounterLine { source_file: &'static str, line: String },

    #[error("process event channel closed by the kernel")]
    EventChannelClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_overflow_display() {
        let err = MonitorError::BitmapOverflow { id: 40000, universe: 32768 };
        assert_eq!(err.to_string(), "bitmap overflow: id 40000 outside universe of 32768");
    }

    #[test]
    fn test_counter_regression_display() {
        let err = MonitorError::CounterRegression {
            tid: Tid(42),
            field: "utime",
            old: 1500,
            new: 1000,
        };
        assert!(err.to_string().contains("TID:42"));
        assert!(err.to_string().contains("utime"));
        assert!(err.to_string().contains("1500"));
    }
}

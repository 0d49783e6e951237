//! Debug assertion macros for dispatcher invariants.
//!
//! Only active in debug builds, so release builds pay nothing for them.

// =============================================================================
// Send count never exceeds the plan
// =============================================================================

/// Assert that the aggregator has not accounted for more sends than planned.
///
/// Used in: `Dispatcher::run_phase()` after each recorded outcome
macro_rules! debug_assert_within_plan {
    ($sent:expr, $planned:expr) => {
        debug_assert!(
            $sent <= $planned,
            "sent {} batches but the plan allows only {}",
            $sent,
            $planned
        )
    };
}

// =============================================================================
// Producer and aggregator agree at drain
// =============================================================================

/// Assert that every batch the producer enqueued was either sent or dropped
/// unsent because the phase was halted.
///
/// Used in: `Dispatcher::run_phase()` after all tasks are joined
macro_rules! debug_assert_drained {
    ($enqueued:expr, $sent:expr, $halted:expr) => {
        debug_assert!(
            $sent == $enqueued || ($halted && $sent <= $enqueued),
            "drain mismatch: enqueued {} batches, accounted {} (halted: {})",
            $enqueued,
            $sent,
            $halted
        )
    };
}

pub(crate) use debug_assert_drained;
pub(crate) use debug_assert_within_plan;

//! Error taxonomy for the dispatch pipeline.
//!
//! Only configuration problems and cancellation surface as errors. Transient
//! mapping-service failures are absorbed at the provider boundary, and
//! capacity exhaustion is a reportable outcome inside the dispatch result,
//! never an error.

use thiserror::Error;

use crate::model::MfuId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A unit with this identity is already registered in the fleet.
    #[error("unit {0} is already registered")]
    DuplicateUnit(MfuId),

    /// Units must be able to carry at least one order.
    #[error("unit {0} registered with zero capacity")]
    InvalidCapacity(MfuId),

    /// Orders were submitted against an empty fleet snapshot; the cycle is
    /// rejected before any work is applied.
    #[error("{pending_orders} orders submitted but the fleet snapshot is empty")]
    EmptyFleet { pending_orders: usize },

    /// The cycle was cancelled before completing.
    #[error("dispatch cycle cancelled")]
    Cancelled,
}

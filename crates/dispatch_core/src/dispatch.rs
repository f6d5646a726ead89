//! Dispatch orchestration: the single external entry point for one cycle of
//! batch → sequence → allocate over a snapshot of orders and fleet state.
//!
//! Sequencing over distinct batches shares no mutable state and runs in
//! parallel on a rayon pool bounded by the configured thread cap; results are
//! collected in batch-index order before the allocator's single-writer
//! assignment loop runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::batching::{BatchBuild, BatchBuilder, BatchConfig};
use crate::error::DispatchError;
use crate::fleet::{FleetAllocator, RouteAssignment, DEFAULT_LOAD_PENALTY};
use crate::geo::{self, GeoPoint};
use crate::model::{Batch, MobileFulfillmentUnit, Order, RejectedOrder, Route, RouteId};
use crate::routing::{build_distance_provider, DistanceProvider, DistanceProviderKind};
use crate::sequencing::RouteSequencer;

/// Default depot used as a sequencing start point when no unit positions are
/// available (Manhattan center).
pub const DEFAULT_DEPOT: GeoPoint = GeoPoint::new(40.7128, -74.0060);

/// Cooperative cancellation flag for one dispatch cycle, checked at batch and
/// route granularity. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Parameters for one dispatch cycle.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub batch: BatchConfig,
    /// Allocator bias against already-loaded units.
    pub load_penalty: f64,
    /// Fallback sequencing start point when the fleet has no usable position.
    pub depot: GeoPoint,
    /// Cap on concurrent sequencing tasks. `None` uses the global rayon pool.
    pub sequencing_threads: Option<usize>,
    /// Which distance backend to build for the cycle.
    pub distance_provider: DistanceProviderKind,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            load_penalty: DEFAULT_LOAD_PENALTY,
            depot: DEFAULT_DEPOT,
            sequencing_threads: None,
            distance_provider: DistanceProviderKind::default(),
        }
    }
}

impl DispatchConfig {
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_load_penalty(mut self, load_penalty: f64) -> Self {
        self.load_penalty = load_penalty;
        self
    }

    pub fn with_depot(mut self, depot: GeoPoint) -> Self {
        self.depot = depot;
        self
    }

    pub fn with_sequencing_threads(mut self, threads: usize) -> Self {
        self.sequencing_threads = Some(threads.max(1));
        self
    }

    pub fn with_distance_provider(mut self, kind: DistanceProviderKind) -> Self {
        self.distance_provider = kind;
        self
    }
}

/// Fleet-wide metrics for one cycle. Field names follow the documented
/// metrics schema for external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMetrics {
    pub total_distance_km: f64,
    pub total_time_minutes: f64,
    pub total_orders: usize,
    pub avg_distance_per_order: f64,
    pub avg_time_per_order: f64,
    /// Assigned units over total units.
    pub fleet_utilization: f64,
}

/// Everything one cycle produced. Every sequenced route appears exactly once:
/// either in `assignments` or in `unassigned_routes`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub batches: Vec<Batch>,
    pub routes: Vec<Route>,
    pub assignments: Vec<RouteAssignment>,
    /// Under-capacity signal for the caller: routes no unit could take.
    pub unassigned_routes: Vec<RouteId>,
    pub rejected_orders: Vec<RejectedOrder>,
    pub metrics: DispatchMetrics,
}

/// Orchestrates the pipeline; the sole external entry point.
pub struct DispatchCoordinator {
    config: DispatchConfig,
    provider: Arc<dyn DistanceProvider>,
    pool: Option<ThreadPool>,
}

impl DispatchCoordinator {
    pub fn new(config: DispatchConfig) -> Self {
        let provider = build_distance_provider(&config.distance_provider);
        Self::with_provider(config, provider)
    }

    /// Build a coordinator around an externally constructed provider (used by
    /// tests to inject fakes).
    pub fn with_provider(config: DispatchConfig, provider: Arc<dyn DistanceProvider>) -> Self {
        let pool = config.sequencing_threads.map(|threads| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads.max(1))
                .build()
                .expect("failed to build sequencing thread pool")
        });
        Self {
            config,
            provider,
            pool,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one dispatch cycle to completion.
    pub fn dispatch(
        &self,
        orders: Vec<Order>,
        fleet: Vec<MobileFulfillmentUnit>,
    ) -> Result<DispatchResult, DispatchError> {
        self.dispatch_with_cancel(orders, fleet, &CancelToken::new())
    }

    /// Run one dispatch cycle, checking `cancel` at batch and route
    /// granularity. Cancellation never leaves a half-applied assignment.
    pub fn dispatch_with_cancel(
        &self,
        orders: Vec<Order>,
        fleet: Vec<MobileFulfillmentUnit>,
        cancel: &CancelToken,
    ) -> Result<DispatchResult, DispatchError> {
        if !orders.is_empty() && fleet.is_empty() {
            return Err(DispatchError::EmptyFleet {
                pending_orders: orders.len(),
            });
        }

        let mut allocator = FleetAllocator::with_load_penalty(self.config.load_penalty);
        for unit in fleet {
            allocator.register(unit)?;
        }
        info!(
            orders = orders.len(),
            units = allocator.len(),
            "dispatch cycle started"
        );

        let BatchBuild { batches, rejected } = BatchBuilder::new(self.config.batch).build(orders);

        let starts: Vec<GeoPoint> = batches
            .iter()
            .map(|batch| self.start_point(&allocator, batch.centroid))
            .collect();

        let sequencer = RouteSequencer::new(Arc::clone(&self.provider));
        let run = || {
            (0..batches.len())
                .into_par_iter()
                .map(|i| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    sequencer.sequence(&batches[i], RouteId(i as u32), starts[i])
                })
                .collect::<Vec<Option<Route>>>()
        };
        let sequenced = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };

        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        // Collected in batch-index order; empty batches are never emitted by
        // the builder, so every slot holds a route here.
        let routes: Vec<Route> = sequenced.into_iter().flatten().collect();

        let outcome = allocator.assign(routes, Some(cancel));
        if outcome.cancelled {
            return Err(DispatchError::Cancelled);
        }

        let metrics = compute_metrics(&outcome.routes, outcome.assignments.len(), allocator.len());
        info!(
            routes = outcome.routes.len(),
            assigned = outcome.assignments.len(),
            unassigned = outcome.unassigned.len(),
            total_distance_km = metrics.total_distance_km,
            "dispatch cycle complete"
        );

        Ok(DispatchResult {
            batches,
            routes: outcome.routes,
            assignments: outcome.assignments,
            unassigned_routes: outcome.unassigned,
            rejected_orders: rejected,
            metrics,
        })
    }

    /// Best-guess sequencing start for a batch: the nearest idle unit, then
    /// the nearest unit of any state, then the configured depot.
    fn start_point(&self, allocator: &FleetAllocator, centroid: GeoPoint) -> GeoPoint {
        nearest_location(allocator.units().iter().filter(|u| u.is_idle()), centroid)
            .or_else(|| nearest_location(allocator.units().iter(), centroid))
            .unwrap_or(self.config.depot)
    }
}

/// Position of the unit nearest to `to`; earliest registered wins ties.
fn nearest_location<'a>(
    units: impl Iterator<Item = &'a MobileFulfillmentUnit>,
    to: GeoPoint,
) -> Option<GeoPoint> {
    let mut best: Option<(f64, GeoPoint)> = None;
    for unit in units {
        let d = geo::distance_km(unit.location, to);
        if best.map_or(true, |(best_d, _)| d < best_d) {
            best = Some((d, unit.location));
        }
    }
    best.map(|(_, location)| location)
}

fn compute_metrics(routes: &[Route], assigned_units: usize, total_units: usize) -> DispatchMetrics {
    let total_distance_km: f64 = routes.iter().map(|r| r.total_distance_km).sum();
    let total_time_minutes: f64 = routes.iter().map(|r| r.total_time_minutes).sum();
    let total_orders: usize = routes.iter().map(|r| r.orders.len()).sum();

    let per_order = |total: f64| {
        if total_orders > 0 {
            total / total_orders as f64
        } else {
            0.0
        }
    };
    let fleet_utilization = if total_units > 0 {
        assigned_units as f64 / total_units as f64
    } else {
        0.0
    };

    DispatchMetrics {
        total_distance_km,
        total_time_minutes,
        total_orders,
        avg_distance_per_order: per_order(total_distance_km),
        avg_time_per_order: per_order(total_time_minutes),
        fleet_utilization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_zero_safe() {
        let metrics = compute_metrics(&[], 0, 0);
        assert_eq!(metrics.total_orders, 0);
        assert_eq!(metrics.avg_distance_per_order, 0.0);
        assert_eq!(metrics.avg_time_per_order, 0.0);
        assert_eq!(metrics.fleet_utilization, 0.0);
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}

//! Fleet allocation: owns MFU state for the duration of one dispatch cycle
//! and assigns each sequenced route to the best available unit.
//!
//! Assignment is inherently sequential: every decision depends on the load
//! and position state mutated by the previous one, so the allocator runs
//! single-writer. Each assignment applies atomically per route; a unit is
//! either fully updated or untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::CancelToken;
use crate::error::DispatchError;
use crate::geo;
use crate::model::{ActiveAssignment, MfuId, MobileFulfillmentUnit, Route, RouteId};

/// Score penalty per unit of existing load, biasing assignment away from
/// already-loaded units.
pub const DEFAULT_LOAD_PENALTY: f64 = 10.0;

/// One route→unit pairing from an allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAssignment {
    pub route: RouteId,
    pub mfu: MfuId,
}

/// Result of one allocation pass. Partial allocation is a normal outcome:
/// routes that no unit can take are listed in `unassigned`, never dropped.
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    /// Every input route, in input order, with `mfu` set where assigned.
    pub routes: Vec<Route>,
    /// Pairings in decision order (shortest route first).
    pub assignments: Vec<RouteAssignment>,
    /// Routes no eligible unit could take, in input order.
    pub unassigned: Vec<RouteId>,
    /// True when a cancellation stopped the pass early; routes not yet
    /// decided are reported unassigned.
    pub cancelled: bool,
}

/// Owns the fleet for one dispatch cycle.
pub struct FleetAllocator {
    units: Vec<MobileFulfillmentUnit>,
    index: HashMap<MfuId, usize>,
    load_penalty: f64,
}

impl Default for FleetAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetAllocator {
    pub fn new() -> Self {
        Self::with_load_penalty(DEFAULT_LOAD_PENALTY)
    }

    pub fn with_load_penalty(load_penalty: f64) -> Self {
        Self {
            units: Vec::new(),
            index: HashMap::new(),
            load_penalty,
        }
    }

    /// Add a unit to the managed fleet.
    ///
    /// Rejects duplicate identities and zero-capacity units; a rejected
    /// registration leaves the fleet unchanged.
    pub fn register(&mut self, unit: MobileFulfillmentUnit) -> Result<(), DispatchError> {
        if unit.capacity == 0 {
            return Err(DispatchError::InvalidCapacity(unit.id));
        }
        if self.index.contains_key(&unit.id) {
            return Err(DispatchError::DuplicateUnit(unit.id));
        }
        self.index.insert(unit.id.clone(), self.units.len());
        self.units.push(unit);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[MobileFulfillmentUnit] {
        &self.units
    }

    pub fn unit(&self, id: &MfuId) -> Option<&MobileFulfillmentUnit> {
        self.index.get(id).map(|&i| &self.units[i])
    }

    /// Greedily assign routes to units.
    ///
    /// Routes are taken shortest total time first so urgent routes get first
    /// pick of the best unit; ties keep the input order. A unit takes at most
    /// one route per pass, and candidates are scored by distance to the
    /// route's first stop plus the load penalty, earliest registered unit
    /// winning ties.
    pub fn assign(&mut self, mut routes: Vec<Route>, cancel: Option<&CancelToken>) -> AssignmentOutcome {
        let mut order: Vec<usize> = (0..routes.len()).collect();
        order.sort_by(|&a, &b| {
            routes[a]
                .total_time_minutes
                .total_cmp(&routes[b].total_time_minutes)
                .then(a.cmp(&b))
        });

        let mut assignments = Vec::new();
        let mut taken_this_cycle = vec![false; self.units.len()];
        let mut cancelled = false;

        for route_idx in order {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                cancelled = true;
                break;
            }

            let Some(first_stop) = routes[route_idx].orders.first().map(|o| o.location) else {
                continue;
            };
            let order_count = routes[route_idx].orders.len() as u32;

            let mut best: Option<(usize, f64)> = None;
            for (unit_idx, unit) in self.units.iter().enumerate() {
                if taken_this_cycle[unit_idx] || !unit.is_idle() {
                    continue;
                }
                if unit.load + order_count > unit.capacity {
                    continue;
                }
                let score = geo::distance_km(unit.location, first_stop)
                    + f64::from(unit.load) * self.load_penalty;
                // Strict less-than keeps the earliest registered unit on ties.
                if best.map_or(true, |(_, best_score)| score < best_score) {
                    best = Some((unit_idx, score));
                }
            }

            if let Some((unit_idx, score)) = best {
                let mfu_id = self.units[unit_idx].id.clone();
                routes[route_idx].mfu = Some(mfu_id.clone());
                let unit = &mut self.units[unit_idx];
                unit.load += order_count;
                unit.assignment = Some(ActiveAssignment::new(routes[route_idx].clone()));
                taken_this_cycle[unit_idx] = true;
                debug!(route = %routes[route_idx].id, mfu = %mfu_id, score, "route assigned");
                assignments.push(RouteAssignment {
                    route: routes[route_idx].id,
                    mfu: mfu_id,
                });
            }
        }

        let unassigned: Vec<RouteId> = routes
            .iter()
            .filter(|r| r.mfu.is_none())
            .map(|r| r.id)
            .collect();
        if !unassigned.is_empty() && !cancelled {
            warn!(
                count = unassigned.len(),
                "routes left unassigned: fleet under capacity"
            );
        }

        AssignmentOutcome {
            routes,
            assignments,
            unassigned,
            cancelled,
        }
    }

    /// Simulate one step of physical movement: every unit with an active
    /// assignment drives to its first remaining stop and delivers it. A unit
    /// whose route is exhausted is released back to idle.
    pub fn advance(&mut self) {
        for unit in &mut self.units {
            let Some(assignment) = unit.assignment.as_mut() else {
                continue;
            };
            if let Some(order) = assignment.next_order() {
                unit.location = order.location;
                unit.load = unit.load.saturating_sub(1);
                assignment.next_stop += 1;
            }
            if assignment.next_order().is_none() {
                unit.assignment = None;
            }
        }
    }
}

//! Core data model: orders, fulfillment units, batches, and routes.
//!
//! Orders and fleet snapshots are supplied by external collaborators and are
//! never mutated by the pipeline; batches and routes are produced inside one
//! dispatch cycle. Unit load and the active assignment are the only mutable
//! fields, and only [`crate::fleet::FleetAllocator`] touches them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// External identity of a delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// External identity of a mobile fulfillment unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MfuId(pub String);

impl std::fmt::Display for MfuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cycle-local route identity, derived from the originating batch index so
/// identical inputs always produce identical ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(pub u32);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// An incoming delivery order. Immutable once created; the pipeline consumes
/// it but never rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Customer address, carried opaquely for downstream collaborators.
    pub address: String,
    pub location: GeoPoint,
    pub products: Vec<String>,
    /// Priority rank; lower is more urgent.
    pub priority: i32,
    pub placed_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

impl Order {
    /// Check the order for nonsense that would poison a batch. Rejection is
    /// per-order; the rest of the cycle proceeds.
    pub fn validate(&self) -> Result<(), RejectionReason> {
        if !self.location.is_valid() {
            return Err(RejectionReason::InvalidCoordinates {
                lat: self.location.lat,
                lng: self.location.lng,
            });
        }
        if self.priority < 0 {
            return Err(RejectionReason::NegativePriority(self.priority));
        }
        Ok(())
    }
}

/// Why an order was excluded from the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RejectionReason {
    #[error("coordinates ({lat}, {lng}) are outside the valid range")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("priority {0} is negative")]
    NegativePriority(i32),
}

/// An order excluded from the cycle, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedOrder {
    pub order: Order,
    pub reason: RejectionReason,
}

/// A route a unit is currently working through, with a cursor over the stops
/// already delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAssignment {
    pub route: Route,
    /// Index of the next undelivered stop in `route.orders`.
    pub next_stop: usize,
}

impl ActiveAssignment {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            next_stop: 0,
        }
    }

    /// The next stop to visit, if any remain.
    pub fn next_order(&self) -> Option<&Order> {
        self.route.orders.get(self.next_stop)
    }
}

/// A mobile fulfillment unit: a vehicle carrying a capacity-bounded set of
/// orders. Owned by the allocator for the duration of one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileFulfillmentUnit {
    pub id: MfuId,
    pub location: GeoPoint,
    /// Total capacity in order units.
    pub capacity: u32,
    /// Orders currently on board.
    pub load: u32,
    pub assignment: Option<ActiveAssignment>,
}

impl MobileFulfillmentUnit {
    pub fn new(id: MfuId, location: GeoPoint, capacity: u32) -> Self {
        Self {
            id,
            location,
            capacity,
            load: 0,
            assignment: None,
        }
    }

    /// A unit is idle when it has no route in progress.
    pub fn is_idle(&self) -> bool {
        self.assignment.is_none()
    }
}

/// An ephemeral grouping of orders intended to ride on one route. Produced by
/// the batch builder, consumed once by the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub orders: Vec<Order>,
    pub centroid: GeoPoint,
    /// Tightest delivery deadline among members, if any carry one.
    pub earliest_deadline: Option<DateTime<Utc>>,
}

impl Batch {
    /// Build a batch from its members, computing the centroid and deadline
    /// bound. Callers guarantee `orders` is nonempty.
    pub fn from_orders(orders: Vec<Order>) -> Self {
        let centroid = centroid_of(&orders);
        let earliest_deadline = orders.iter().filter_map(|o| o.deadline).min();
        Self {
            orders,
            centroid,
            earliest_deadline,
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Arithmetic mean of the member coordinates. Adequate at delivery-zone scale;
/// batches are bounded to a few kilometres of spread.
pub fn centroid_of(orders: &[Order]) -> GeoPoint {
    if orders.is_empty() {
        return GeoPoint::new(0.0, 0.0);
    }
    let n = orders.len() as f64;
    let lat = orders.iter().map(|o| o.location.lat).sum::<f64>() / n;
    let lng = orders.iter().map(|o| o.location.lng).sum::<f64>() / n;
    GeoPoint::new(lat, lng)
}

/// A drivable visiting sequence over one batch's orders. Created by the
/// sequencer; the allocator sets `mfu` exactly once on assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    /// Orders in visiting order; always a permutation of the source batch.
    pub orders: Vec<Order>,
    pub total_distance_km: f64,
    pub total_time_minutes: f64,
    /// Stop coordinates in visiting order.
    pub waypoints: Vec<GeoPoint>,
    /// Owning unit, set by the allocator.
    pub mfu: Option<MfuId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order_at(id: &str, lat: f64, lng: f64) -> Order {
        Order {
            id: OrderId(id.to_string()),
            address: String::new(),
            location: GeoPoint::new(lat, lng),
            products: vec!["item".to_string()],
            priority: 1,
            placed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            deadline: None,
        }
    }

    #[test]
    fn centroid_is_mean_of_member_coordinates() {
        let orders = vec![order_at("a", 40.0, -74.0), order_at("b", 42.0, -72.0)];
        let c = centroid_of(&orders);
        assert!((c.lat - 41.0).abs() < 1e-9);
        assert!((c.lng - -73.0).abs() < 1e-9);
    }

    #[test]
    fn batch_tracks_earliest_deadline() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut a = order_at("a", 40.0, -74.0);
        a.deadline = Some(t0 + chrono::Duration::hours(2));
        let mut b = order_at("b", 40.0, -74.0);
        b.deadline = Some(t0 + chrono::Duration::hours(1));
        let batch = Batch::from_orders(vec![a, b]);
        assert_eq!(batch.earliest_deadline, Some(t0 + chrono::Duration::hours(1)));
    }

    #[test]
    fn validate_rejects_bad_coordinates_and_priority() {
        let good = order_at("a", 40.0, -74.0);
        assert!(good.validate().is_ok());

        let bad_coords = order_at("b", 95.0, -74.0);
        assert!(matches!(
            bad_coords.validate(),
            Err(RejectionReason::InvalidCoordinates { .. })
        ));

        let mut bad_priority = order_at("c", 40.0, -74.0);
        bad_priority.priority = -1;
        assert!(matches!(
            bad_priority.validate(),
            Err(RejectionReason::NegativePriority(-1))
        ));
    }
}

//! Route sequencing: orders the stops within one batch into a drivable
//! sequence via the nearest-neighbour heuristic.
//!
//! Intentionally a greedy approximation, not an optimal tour: O(n²) worst
//! case and deterministic given identical input ordering. Stop selection uses
//! the pure haversine metric so the visiting order is identical in live and
//! degraded mode; leg distances and times are accumulated through the
//! configured [`DistanceProvider`].

use std::sync::Arc;

use crate::geo::{self, GeoPoint};
use crate::model::{Batch, Route, RouteId};
use crate::routing::DistanceProvider;

/// Sequences one batch at a time. Cheap to clone across sequencing tasks;
/// holds only the shared provider handle.
#[derive(Clone)]
pub struct RouteSequencer {
    provider: Arc<dyn DistanceProvider>,
}

impl RouteSequencer {
    pub fn new(provider: Arc<dyn DistanceProvider>) -> Self {
        Self { provider }
    }

    /// Order the batch's stops starting from `start`, accumulating total
    /// distance and time over every leg including the first one out of
    /// `start`.
    ///
    /// Ties on equal nearest distance keep the earlier batch position, so
    /// co-located orders come out in their original relative order. An empty
    /// batch produces no route.
    pub fn sequence(&self, batch: &Batch, id: RouteId, start: GeoPoint) -> Option<Route> {
        if batch.is_empty() {
            return None;
        }

        let mut remaining: Vec<usize> = (0..batch.orders.len()).collect();
        let mut sequence = Vec::with_capacity(batch.orders.len());
        let mut waypoints = Vec::with_capacity(batch.orders.len());
        let mut total_distance_km = 0.0;
        let mut total_time_minutes = 0.0;
        let mut position = start;

        while !remaining.is_empty() {
            // Strict less-than keeps the earliest batch position on ties.
            let mut nearest_slot = 0;
            let mut nearest_km = f64::INFINITY;
            for (slot, &idx) in remaining.iter().enumerate() {
                let d = geo::distance_km(position, batch.orders[idx].location);
                if d < nearest_km {
                    nearest_km = d;
                    nearest_slot = slot;
                }
            }

            let idx = remaining.remove(nearest_slot);
            let order = &batch.orders[idx];
            let leg = self.provider.leg(position, order.location);
            total_distance_km += leg.distance_km;
            total_time_minutes += leg.duration_minutes;
            waypoints.push(order.location);
            position = order.location;
            sequence.push(order.clone());
        }

        Some(Route {
            id,
            orders: sequence,
            total_distance_km,
            total_time_minutes,
            waypoints,
            mfu: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Order, OrderId};
    use crate::routing::HaversineEstimator;
    use chrono::{TimeZone, Utc};

    fn order(id: &str, lat: f64, lng: f64) -> Order {
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

    fn sequencer() -> RouteSequencer {
        RouteSequencer::new(Arc::new(HaversineEstimator::default()))
    }

    #[test]
    fn empty_batch_produces_no_route() {
        let batch = Batch {
            orders: Vec::new(),
            centroid: GeoPoint::new(0.0, 0.0),
            earliest_deadline: None,
        };
        assert!(sequencer()
            .sequence(&batch, RouteId(0), GeoPoint::new(0.0, 0.0))
            .is_none());
    }

    #[test]
    fn visits_stops_nearest_first() {
        // Stops strung north along a meridian; starting south of them the
        // greedy walk must visit them in latitude order.
        let batch = Batch::from_orders(vec![
            order("far", 40.80, -74.0),
            order("near", 40.72, -74.0),
            order("mid", 40.76, -74.0),
        ]);
        let route = sequencer()
            .sequence(&batch, RouteId(0), GeoPoint::new(40.70, -74.0))
            .expect("route");
        let ids: Vec<&str> = route.orders.iter().map(|o| o.id.0.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[test]
    fn route_is_a_permutation_of_the_batch() {
        let batch = Batch::from_orders(vec![
            order("a", 40.71, -74.00),
            order("b", 40.73, -74.02),
            order("c", 40.72, -73.98),
        ]);
        let route = sequencer()
            .sequence(&batch, RouteId(0), GeoPoint::new(40.70, -74.0))
            .expect("route");

        let mut batch_ids: Vec<&str> = batch.orders.iter().map(|o| o.id.0.as_str()).collect();
        let mut route_ids: Vec<&str> = route.orders.iter().map(|o| o.id.0.as_str()).collect();
        batch_ids.sort_unstable();
        route_ids.sort_unstable();
        assert_eq!(batch_ids, route_ids);
        assert_eq!(route.waypoints.len(), route.orders.len());
    }

    #[test]
    fn co_located_orders_keep_original_relative_order() {
        let p = GeoPoint::new(40.7128, -74.0060);
        let batch = Batch::from_orders(vec![
            order("first", p.lat, p.lng),
            order("second", p.lat, p.lng),
            order("third", p.lat, p.lng),
        ]);
        let route = sequencer().sequence(&batch, RouteId(0), p).expect("route");
        let ids: Vec<&str> = route.orders.iter().map(|o| o.id.0.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert_eq!(route.total_distance_km, 0.0);
        assert_eq!(route.total_time_minutes, 0.0);
    }

    #[test]
    fn totals_include_the_leg_from_the_start_point() {
        let stop = GeoPoint::new(40.7589, -73.9851);
        let start = GeoPoint::new(40.7128, -74.0060);
        let batch = Batch::from_orders(vec![order("only", stop.lat, stop.lng)]);
        let route = sequencer().sequence(&batch, RouteId(0), start).expect("route");
        let expected = geo::distance_km(start, stop);
        assert!((route.total_distance_km - expected).abs() < 1e-9);
        assert!(route.total_time_minutes > 0.0);
    }
}

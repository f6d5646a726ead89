//! Test helpers for common scenario setup and fixtures.
//!
//! This module provides shared builders to reduce duplication across test
//! files and examples. Timestamps are pinned to a fixed epoch so scenarios
//! are reproducible run to run.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo::GeoPoint;
use crate::model::{MfuId, MobileFulfillmentUnit, Order, OrderId};

/// Standard test locations in the demo service area.
pub const MANHATTAN_CENTER: GeoPoint = GeoPoint::new(40.7128, -74.0060);
pub const MIDTOWN: GeoPoint = GeoPoint::new(40.7505, -73.9934);
pub const TIMES_SQUARE: GeoPoint = GeoPoint::new(40.7589, -73.9851);

/// Fixed scenario epoch, used as the placement time of the first order.
pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .expect("fixed epoch should be valid")
}

/// A plain order at the given coordinate with neutral priority and no
/// deadline.
pub fn test_order(id: &str, lat: f64, lng: f64) -> Order {
    Order {
        id: OrderId(id.to_string()),
        address: format!("{id} delivery address"),
        location: GeoPoint::new(lat, lng),
        products: vec!["product-1".to_string()],
        priority: 1,
        placed_at: base_time(),
        deadline: None,
    }
}

/// Like [`test_order`], with a deadline offset from the scenario epoch.
pub fn test_order_with_deadline(id: &str, lat: f64, lng: f64, deadline_hours: i64) -> Order {
    let mut order = test_order(id, lat, lng);
    order.deadline = Some(base_time() + Duration::hours(deadline_hours));
    order
}

/// An idle unit with no load.
pub fn test_unit(id: &str, location: GeoPoint, capacity: u32) -> MobileFulfillmentUnit {
    MobileFulfillmentUnit::new(MfuId(id.to_string()), location, capacity)
}

/// The demo order book: ten orders strung diagonally across the service
/// area, each three products, two-hour deadlines, placed a minute apart.
pub fn sample_orders() -> Vec<Order> {
    (0..10)
        .map(|i| {
            let i_f = i as f64;
            Order {
                id: OrderId(format!("order-{}", i + 1)),
                address: format!("{} Example St, New York, NY", 100 + i),
                location: GeoPoint::new(
                    MANHATTAN_CENTER.lat + i_f * 0.01,
                    MANHATTAN_CENTER.lng + i_f * 0.01,
                ),
                products: (1..=3).map(|j| format!("product-{j}")).collect(),
                priority: 1,
                placed_at: base_time() + Duration::minutes(i),
                deadline: Some(base_time() + Duration::hours(2)),
            }
        })
        .collect()
}

/// The demo fleet: three units at well-known locations, capacity 20 each.
pub fn sample_fleet() -> Vec<MobileFulfillmentUnit> {
    vec![
        test_unit("mfu-1", MANHATTAN_CENTER, 20),
        test_unit("mfu-2", MIDTOWN, 20),
        test_unit("mfu-3", TIMES_SQUARE, 20),
    ]
}

/// Seeded random orders scattered uniformly over the demo bounding box, for
/// load-shaped tests and benchmarks.
pub fn scattered_orders(count: usize, seed: u64) -> Vec<Order> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let lat = rng.gen_range(40.60..40.90);
            let lng = rng.gen_range(-74.05..-73.90);
            let mut order = test_order(&format!("order-{i}"), lat, lng);
            order.placed_at = base_time() + Duration::seconds(i as i64);
            order
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_orders_are_valid_and_distinct() {
        let orders = sample_orders();
        assert_eq!(orders.len(), 10);
        assert!(orders.iter().all(|o| o.validate().is_ok()));
        let ids: std::collections::HashSet<_> = orders.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn scattered_orders_are_reproducible_for_a_seed() {
        assert_eq!(scattered_orders(25, 42), scattered_orders(25, 42));
        assert_ne!(scattered_orders(25, 42), scattered_orders(25, 43));
    }

    #[test]
    fn sample_fleet_units_are_idle() {
        assert!(sample_fleet().iter().all(|u| u.is_idle() && u.load == 0));
    }
}

//! Order batching: groups a pending order queue into batches bounded by
//! size, spatial spread, and deadline compatibility.
//!
//! Admission is greedy over the orders sorted by (priority, placement time),
//! so urgent and older orders get first claim on batch slots. Membership
//! decisions use the pure haversine metric, never the live provider, which
//! keeps batching identical whether or not the mapping service is reachable.

use tracing::{debug, warn};

use crate::geo::{self, GeoPoint};
use crate::model::{centroid_of, Batch, Order, RejectedOrder};

/// Limits applied while accumulating a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchConfig {
    /// Hard cap on orders per batch.
    pub max_batch_size: usize,
    /// Maximum member-to-centroid spread in kilometres.
    pub max_radius_km: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_radius_km: 5.0,
        }
    }
}

impl BatchConfig {
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_max_radius_km(mut self, max_radius_km: f64) -> Self {
        self.max_radius_km = max_radius_km;
        self
    }
}

/// Outcome of one batching pass: the batches plus the orders excluded from
/// the cycle with their reasons.
#[derive(Debug, Clone)]
pub struct BatchBuild {
    pub batches: Vec<Batch>,
    pub rejected: Vec<RejectedOrder>,
}

/// Groups orders into delivery batches.
#[derive(Debug, Clone, Default)]
pub struct BatchBuilder {
    config: BatchConfig,
}

impl BatchBuilder {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Group `orders` into batches.
    ///
    /// Malformed orders are rejected individually and reported; the rest of
    /// the queue still batches. Ties in (priority, placement time) keep the
    /// original relative order, so identical inputs give identical batches.
    pub fn build(&self, orders: Vec<Order>) -> BatchBuild {
        let mut valid = Vec::with_capacity(orders.len());
        let mut rejected = Vec::new();
        for order in orders {
            match order.validate() {
                Ok(()) => valid.push(order),
                Err(reason) => {
                    warn!(order = %order.id, %reason, "rejecting malformed order");
                    rejected.push(RejectedOrder { order, reason });
                }
            }
        }

        // Stable sort: urgent (low priority rank) and older orders first.
        valid.sort_by(|a, b| (a.priority, a.placed_at).cmp(&(b.priority, b.placed_at)));

        let mut batches = Vec::new();
        let mut current: Vec<Order> = Vec::new();

        for order in valid {
            if current.is_empty() || self.can_admit(&current, &order) {
                current.push(order);
            } else {
                batches.push(Batch::from_orders(std::mem::take(&mut current)));
                current.push(order);
            }
        }
        if !current.is_empty() {
            batches.push(Batch::from_orders(current));
        }

        debug!(batches = batches.len(), rejected = rejected.len(), "batching pass complete");
        BatchBuild { batches, rejected }
    }

    /// Whether `candidate` fits the in-progress batch without breaking the
    /// size, spread, or deadline constraints.
    fn can_admit(&self, batch: &[Order], candidate: &Order) -> bool {
        if batch.len() >= self.config.max_batch_size {
            return false;
        }

        if self.tentative_spread_km(batch, candidate) > self.config.max_radius_km {
            return false;
        }

        // A candidate with a tighter deadline than the batch has already
        // committed to would invalidate the existing members' schedule.
        if let Some(deadline) = candidate.deadline {
            if let Some(earliest) = batch.iter().filter_map(|o| o.deadline).min() {
                if deadline < earliest {
                    return false;
                }
            }
        }

        true
    }

    /// Max member-to-centroid distance after tentatively admitting the
    /// candidate. The centroid is recomputed over the full tentative
    /// membership, so the check does not depend on admission history.
    fn tentative_spread_km(&self, batch: &[Order], candidate: &Order) -> f64 {
        let n = (batch.len() + 1) as f64;
        let lat = (batch.iter().map(|o| o.location.lat).sum::<f64>() + candidate.location.lat) / n;
        let lng = (batch.iter().map(|o| o.location.lng).sum::<f64>() + candidate.location.lng) / n;
        let centroid = GeoPoint::new(lat, lng);

        batch
            .iter()
            .map(|o| o.location)
            .chain(std::iter::once(candidate.location))
            .map(|p| geo::distance_km(p, centroid))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderId;
    use chrono::{TimeZone, Utc};

    fn order(id: &str, lat: f64, lng: f64, minute: i64) -> Order {
        Order {
            id: OrderId(id.to_string()),
            address: String::new(),
            location: GeoPoint::new(lat, lng),
            products: vec!["item".to_string()],
            priority: 1,
            placed_at: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
            deadline: None,
        }
    }

    #[test]
    fn single_order_opens_a_batch() {
        let build = BatchBuilder::default().build(vec![order("a", 40.71, -74.0, 0)]);
        assert_eq!(build.batches.len(), 1);
        assert_eq!(build.batches[0].len(), 1);
        assert!(build.rejected.is_empty());
    }

    #[test]
    fn empty_input_produces_no_batches() {
        let build = BatchBuilder::default().build(Vec::new());
        assert!(build.batches.is_empty());
        assert!(build.rejected.is_empty());
    }

    #[test]
    fn size_cap_closes_the_batch() {
        let config = BatchConfig::default().with_max_batch_size(2);
        let orders = (0..5)
            .map(|i| order(&format!("o{i}"), 40.71, -74.0, i))
            .collect();
        let build = BatchBuilder::new(config).build(orders);
        assert_eq!(build.batches.len(), 3);
        assert_eq!(
            build.batches.iter().map(Batch::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
    }

    #[test]
    fn spread_check_recomputes_the_centroid_with_the_candidate() {
        // Two orders 0.02 degrees apart batch together; a third far to the
        // north pulls the tentative centroid enough to break the radius.
        let config = BatchConfig::default().with_max_radius_km(2.0);
        let orders = vec![
            order("a", 40.70, -74.0, 0),
            order("b", 40.71, -74.0, 1),
            order("c", 40.90, -74.0, 2),
        ];
        let build = BatchBuilder::new(config).build(orders);
        assert_eq!(build.batches.len(), 2);
        assert_eq!(build.batches[0].len(), 2);
        assert_eq!(build.batches[1].len(), 1);
    }

    #[test]
    fn tighter_deadline_is_refused() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut a = order("a", 40.71, -74.0, 0);
        a.deadline = Some(t0 + chrono::Duration::hours(2));
        let mut b = order("b", 40.71, -74.0, 1);
        b.deadline = Some(t0 + chrono::Duration::hours(1));

        let build = BatchBuilder::default().build(vec![a, b]);
        assert_eq!(build.batches.len(), 2);
    }

    #[test]
    fn later_deadline_is_admitted() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut a = order("a", 40.71, -74.0, 0);
        a.deadline = Some(t0 + chrono::Duration::hours(1));
        let mut b = order("b", 40.71, -74.0, 1);
        b.deadline = Some(t0 + chrono::Duration::hours(2));

        let build = BatchBuilder::default().build(vec![a, b]);
        assert_eq!(build.batches.len(), 1);
        assert_eq!(build.batches[0].len(), 2);
    }

    #[test]
    fn urgent_orders_claim_slots_first() {
        let mut low = order("low", 40.71, -74.0, 0);
        low.priority = 5;
        let mut high = order("high", 40.71, -74.0, 1);
        high.priority = 0;

        let build = BatchBuilder::default().build(vec![low, high]);
        assert_eq!(build.batches[0].orders[0].id.0, "high");
    }

    #[test]
    fn malformed_orders_are_rejected_without_aborting() {
        let mut bad = order("bad", 40.71, -74.0, 0);
        bad.priority = -3;
        let good = order("good", 40.71, -74.0, 1);

        let build = BatchBuilder::default().build(vec![bad, good]);
        assert_eq!(build.batches.len(), 1);
        assert_eq!(build.batches[0].orders[0].id.0, "good");
        assert_eq!(build.rejected.len(), 1);
        assert_eq!(build.rejected[0].order.id.0, "bad");
    }
}

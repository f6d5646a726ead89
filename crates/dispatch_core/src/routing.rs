//! Pluggable distance providers: trait abstraction for distance/duration
//! estimation backends.
//!
//! Two implementations, selectable via [`DistanceProviderKind`]:
//!
//! - **`HaversineEstimator`**: Offline great-circle estimate with a
//!   distance-proportional travel-time model. Zero dependencies, never fails.
//! - **`LiveMapsProvider`** (feature `live-maps`): Calls a distance-matrix
//!   HTTP endpoint with a short per-call timeout; any transport, status, or
//!   payload problem degrades to the offline estimate for that element.
//!
//! Callers hold an `Arc<dyn DistanceProvider>` and never observe which mode
//! served a given request; both report kilometres and minutes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoPoint};

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Default average speed for the travel-time model (km/h).
pub const DEFAULT_AVG_SPEED_KMH: f64 = 30.0;

/// Distance and estimated travel time for one origin→destination leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

/// Batched distance/duration grid: `rows[i][j]` is origin `i` → destination `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    pub rows: Vec<Vec<LegEstimate>>,
}

impl DistanceMatrix {
    pub fn get(&self, origin: usize, destination: usize) -> Option<LegEstimate> {
        self.rows.get(origin)?.get(destination).copied()
    }
}

/// Which distance backend to use. Serializes into the cycle configuration so
/// an external caller can select the backend per deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum DistanceProviderKind {
    /// Offline haversine estimate at the given average speed.
    Offline { speed_kmh: f64 },
    /// Distance-matrix HTTP endpoint (e.g. a Google-Maps-compatible service).
    #[cfg(feature = "live-maps")]
    LiveMaps { endpoint: String, api_key: String },
}

impl Default for DistanceProviderKind {
    fn default() -> Self {
        Self::Offline {
            speed_kmh: DEFAULT_AVG_SPEED_KMH,
        }
    }
}

/// Trait for distance backends. Implementations must be `Send + Sync` so one
/// provider can serve concurrent sequencing tasks.
///
/// The contract is infallible: a backend that cannot answer a query from its
/// primary source must degrade to an offline estimate internally rather than
/// surface an error to the dispatch critical path.
pub trait DistanceProvider: Send + Sync {
    /// Distance and travel time for a single leg.
    fn leg(&self, from: GeoPoint, to: GeoPoint) -> LegEstimate;

    /// Point-to-point distance in kilometres.
    fn distance_km(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        self.leg(from, to).distance_km
    }

    /// Point-to-point travel-time estimate in minutes.
    fn duration_minutes(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        self.leg(from, to).duration_minutes
    }

    /// Batched form of [`DistanceProvider::leg`]. The default implementation
    /// queries pairwise; backends with a native matrix call can override.
    fn matrix(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> DistanceMatrix {
        let rows = origins
            .iter()
            .map(|&o| destinations.iter().map(|&d| self.leg(o, d)).collect())
            .collect();
        DistanceMatrix { rows }
    }
}

// ---------------------------------------------------------------------------
// Offline estimator (always available)
// ---------------------------------------------------------------------------

/// Great-circle distance with a distance-proportional duration at a fixed
/// average speed. Deterministic and pure.
#[derive(Debug, Clone, Copy)]
pub struct HaversineEstimator {
    speed_kmh: f64,
}

impl HaversineEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self {
            speed_kmh: speed_kmh.max(1.0),
        }
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }
}

impl Default for HaversineEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_AVG_SPEED_KMH)
    }
}

impl DistanceProvider for HaversineEstimator {
    fn leg(&self, from: GeoPoint, to: GeoPoint) -> LegEstimate {
        let distance_km = geo::distance_km(from, to);
        LegEstimate {
            distance_km,
            duration_minutes: geo::duration_minutes(distance_km, self.speed_kmh),
        }
    }
}

// ---------------------------------------------------------------------------
// Live provider (behind `live-maps` feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "live-maps")]
pub mod live {
    use super::*;
    use reqwest::blocking::Client;
    use std::time::Duration;
    use tracing::warn;

    /// Per-call timeout. Kept short so a hanging upstream degrades to the
    /// offline estimate instead of stalling unrelated batches.
    const DEFAULT_TIMEOUT_MS: u64 = 2_000;

    /// Distance-matrix HTTP backend with offline degradation.
    ///
    /// One attempt per call; no retries. Every failure path falls through to
    /// the embedded [`HaversineEstimator`] and logs the degradation.
    pub struct LiveMapsProvider {
        client: Client,
        endpoint: String,
        api_key: String,
        fallback: HaversineEstimator,
    }

    impl LiveMapsProvider {
        pub fn new(endpoint: &str, api_key: &str) -> Self {
            Self::with_timeout(endpoint, api_key, DEFAULT_TIMEOUT_MS)
        }

        pub fn with_timeout(endpoint: &str, api_key: &str, timeout_ms: u64) -> Self {
            let client = Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .expect("failed to build HTTP client");
            Self {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
                fallback: HaversineEstimator::default(),
            }
        }

        fn fetch_matrix(
            &self,
            origins: &[GeoPoint],
            destinations: &[GeoPoint],
        ) -> Option<MatrixResponse> {
            let join = |points: &[GeoPoint]| {
                points
                    .iter()
                    .map(|p| format!("{},{}", p.lat, p.lng))
                    .collect::<Vec<_>>()
                    .join("|")
            };
            let url = format!("{}/distancematrix/json", self.endpoint);

            let response = match self
                .client
                .get(&url)
                .query(&[
                    ("origins", join(origins)),
                    ("destinations", join(destinations)),
                    ("mode", "driving".to_string()),
                    ("key", self.api_key.clone()),
                ])
                .send()
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "distance matrix request failed; using offline estimate");
                    return None;
                }
            };

            if !response.status().is_success() {
                warn!(status = %response.status(), "distance matrix returned non-OK status; using offline estimate");
                return None;
            }

            let parsed: MatrixResponse = match response.json() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "malformed distance matrix payload; using offline estimate");
                    return None;
                }
            };

            if parsed.status != "OK" {
                warn!(status = %parsed.status, "distance matrix rejected the query; using offline estimate");
                return None;
            }

            Some(parsed)
        }

        /// Convert one response element, degrading per-element when the
        /// upstream could not resolve that particular pair.
        fn element_to_leg(&self, element: &MatrixElement, from: GeoPoint, to: GeoPoint) -> LegEstimate {
            match (&element.distance, &element.duration) {
                (Some(d), Some(t)) if element.status == "OK" => LegEstimate {
                    distance_km: d.value / 1000.0,
                    duration_minutes: t.value / 60.0,
                },
                _ => {
                    warn!(status = %element.status, "unresolvable matrix element; using offline estimate");
                    self.fallback.leg(from, to)
                }
            }
        }
    }

    /// Minimal distance-matrix JSON response structures.
    #[derive(Deserialize)]
    struct MatrixResponse {
        status: String,
        rows: Vec<MatrixRow>,
    }

    #[derive(Deserialize)]
    struct MatrixRow {
        elements: Vec<MatrixElement>,
    }

    #[derive(Deserialize)]
    struct MatrixElement {
        status: String,
        distance: Option<ValueField>,
        duration: Option<ValueField>,
    }

    #[derive(Deserialize)]
    struct ValueField {
        /// Metres for distance, seconds for duration.
        value: f64,
    }

    impl DistanceProvider for LiveMapsProvider {
        fn leg(&self, from: GeoPoint, to: GeoPoint) -> LegEstimate {
            match self.fetch_matrix(&[from], &[to]) {
                Some(parsed) => match parsed.rows.first().and_then(|r| r.elements.first()) {
                    Some(element) => self.element_to_leg(element, from, to),
                    None => self.fallback.leg(from, to),
                },
                None => self.fallback.leg(from, to),
            }
        }

        fn matrix(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> DistanceMatrix {
            let Some(parsed) = self.fetch_matrix(origins, destinations) else {
                return self.fallback.matrix(origins, destinations);
            };
            if parsed.rows.len() != origins.len()
                || parsed.rows.iter().any(|r| r.elements.len() != destinations.len())
            {
                warn!("distance matrix shape mismatch; using offline estimate");
                return self.fallback.matrix(origins, destinations);
            }
            let rows = origins
                .iter()
                .enumerate()
                .map(|(i, &o)| {
                    destinations
                        .iter()
                        .enumerate()
                        .map(|(j, &d)| self.element_to_leg(&parsed.rows[i].elements[j], o, d))
                        .collect()
                })
                .collect();
            DistanceMatrix { rows }
        }
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default leg cache capacity for remote-backed providers.
const DEFAULT_LEG_CACHE_CAPACITY: usize = 20_000;

/// LRU-cached wrapper around any [`DistanceProvider`].
///
/// Cache key is the directional pair of coordinate bit patterns; live
/// backends may report asymmetric durations, so legs are not mirrored.
pub struct CachedDistanceProvider {
    inner: Box<dyn DistanceProvider>,
    cache: Mutex<LruCache<((u64, u64), (u64, u64)), LegEstimate>>,
}

impl CachedDistanceProvider {
    pub fn new(inner: Box<dyn DistanceProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("cache capacity must be > 0"),
            )),
        }
    }

    fn cache_key(from: GeoPoint, to: GeoPoint) -> ((u64, u64), (u64, u64)) {
        (
            (from.lat.to_bits(), from.lng.to_bits()),
            (to.lat.to_bits(), to.lng.to_bits()),
        )
    }
}

impl DistanceProvider for CachedDistanceProvider {
    fn leg(&self, from: GeoPoint, to: GeoPoint) -> LegEstimate {
        let key = Self::cache_key(from, to);

        // Fast path: cache hit
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return *cached;
            }
        }

        let result = self.inner.leg(from, to);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, result);
        }

        result
    }

    fn matrix(&self, origins: &[GeoPoint], destinations: &[GeoPoint]) -> DistanceMatrix {
        // Delegate so a backend with a native matrix call keeps its single
        // round trip, then warm the leg cache from the grid.
        let matrix = self.inner.matrix(origins, destinations);
        if let Ok(mut cache) = self.cache.lock() {
            for (i, &origin) in origins.iter().enumerate() {
                for (j, &destination) in destinations.iter().enumerate() {
                    if let Some(leg) = matrix.get(i, j) {
                        cache.put(Self::cache_key(origin, destination), leg);
                    }
                }
            }
        }
        matrix
    }
}

// ---------------------------------------------------------------------------
// Factory: build a provider from DistanceProviderKind
// ---------------------------------------------------------------------------

/// Construct a shared [`DistanceProvider`] from a [`DistanceProviderKind`]
/// descriptor.
///
/// - `Offline` is returned without a leg cache (the haversine itself is
///   cached globally and the duration conversion is trivial).
/// - `LiveMaps` is wrapped in a [`CachedDistanceProvider`] so repeated pairs
///   inside one cycle cost a single HTTP round trip.
pub fn build_distance_provider(kind: &DistanceProviderKind) -> Arc<dyn DistanceProvider> {
    match kind {
        DistanceProviderKind::Offline { speed_kmh } => Arc::new(HaversineEstimator::new(*speed_kmh)),

        #[cfg(feature = "live-maps")]
        DistanceProviderKind::LiveMaps { endpoint, api_key } => {
            let inner = Box::new(live::LiveMapsProvider::new(endpoint, api_key));
            Arc::new(CachedDistanceProvider::new(inner, DEFAULT_LEG_CACHE_CAPACITY))
        }
    }
}

//! Geographic primitives: coordinates, haversine distance, and the
//! distance-to-duration conversion used by the offline estimator.
//!
//! Distances are cached in a global LRU keyed by the coordinate bit patterns,
//! so repeated lookups for the same pair (batch admission checks, nearest
//! neighbour scans) stay cheap.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Bit-pattern key for cache maps (f64 is not hashable directly).
    fn key(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lng.to_bits())
    }
}

/// Uncached haversine distance (internal use).
fn distance_km_uncached(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lng1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lng2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlng = (dlng * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Global distance cache (50,000 entries).
fn get_distance_cache() -> &'static Mutex<LruCache<((u64, u64), (u64, u64)), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<((u64, u64), (u64, u64)), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(50_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Haversine distance in kilometres between two points, with LRU caching.
///
/// Uses a symmetric key (smaller bit pattern first) to maximise cache hits.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (ka, kb) = (a.key(), b.key());
    let key = if ka <= kb { (ka, kb) } else { (kb, ka) };

    let mut cache = match get_distance_cache().lock() {
        Ok(guard) => guard,
        Err(_) => return distance_km_uncached(a, b), // Fallback: compute without cache if mutex poisoned
    };

    *cache.get_or_insert(key, || distance_km_uncached(a, b))
}

/// Convert a distance to an estimated travel time in minutes at the given
/// average speed. Speeds at or below zero are clamped to walking pace.
pub fn duration_minutes(distance_km: f64, speed_kmh: f64) -> f64 {
    if distance_km <= 0.0 {
        return 0.0;
    }
    (distance_km / speed_kmh.max(1.0)) * 60.0
}

pub mod batching;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod model;
pub mod routing;
pub mod sequencing;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

//! Run one dispatch cycle over the demo order book and print the results.
//!
//! Run with: cargo run -p dispatch_core --example dispatch_run

use dispatch_core::dispatch::{DispatchConfig, DispatchCoordinator};
use dispatch_core::test_helpers::{sample_fleet, sample_orders};

fn main() {
    let orders = sample_orders();
    let fleet = sample_fleet();
    let coordinator = DispatchCoordinator::new(DispatchConfig::default());

    let result = match coordinator.dispatch(orders, fleet) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("dispatch rejected: {e}");
            return;
        }
    };

    println!("--- Dispatch cycle (demo order book, 3 units) ---");
    println!("Batches created: {}", result.batches.len());
    println!("Routes sequenced: {}", result.routes.len());
    println!("Orders served: {}", result.metrics.total_orders);
    println!("Total distance: {:.2} km", result.metrics.total_distance_km);
    println!("Total time: {:.2} min", result.metrics.total_time_minutes);
    println!(
        "Average per order: {:.2} km / {:.2} min",
        result.metrics.avg_distance_per_order, result.metrics.avg_time_per_order
    );
    println!(
        "Fleet utilization: {:.0}%",
        result.metrics.fleet_utilization * 100.0
    );

    println!("\nRoutes:");
    for route in &result.routes {
        println!(
            "  {}  {} orders  {:.2} km  {:.2} min",
            route.id,
            route.orders.len(),
            route.total_distance_km,
            route.total_time_minutes,
        );
    }

    println!("\nAssignments:");
    for assignment in &result.assignments {
        println!("  {} -> {}", assignment.route, assignment.mfu);
    }
    if !result.unassigned_routes.is_empty() {
        println!("\nUnassigned routes (fleet under capacity):");
        for id in &result.unassigned_routes {
            println!("  {id}");
        }
    }
}

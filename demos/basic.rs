//! Basic usage examples for Pool

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use ttlpool::{Pool, PoolConfiguration, PoolError, Scheduler};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== ttlpool - Basic Examples ===\n");

    let scheduler = Scheduler::new();
    let _driver = scheduler
        .spawn_thread(Duration::from_millis(50))
        .expect("failed to start scheduler thread");

    // Example 1: Simple pool
    simple_pool(&scheduler);

    // Example 2: Constructor fallback
    constructor_fallback(&scheduler);

    // Example 3: TTL with destructor
    ttl_with_destructor(&scheduler);

    // Example 4: Close and drain
    close_and_drain(&scheduler);
}

fn simple_pool(scheduler: &Scheduler) {
    println!("1. Simple Pool:");
    let pool = Pool::new(PoolConfiguration::new().with_name("simple"), scheduler);

    pool.put(1).unwrap();
    println!("   Size after put: {}", pool.size());
    println!("   Got: {}", pool.get().unwrap());

    match pool.get() {
        Err(PoolError::PoolEmpty) => println!("   Second get: pool empty\n"),
        other => println!("   Second get: {other:?}\n"),
    }
}

fn constructor_fallback(scheduler: &Scheduler) {
    println!("2. Constructor Fallback:");
    let next = Arc::new(AtomicUsize::new(100));
    let counter = Arc::clone(&next);
    let config = PoolConfiguration::new()
        .with_name("constructed")
        .with_new_fn(move || Ok(counter.fetch_add(1, Ordering::Relaxed)));
    let pool = Pool::new(config, scheduler);

    {
        let conn = pool.get_pooled().unwrap();
        println!("   Constructed: {}", *conn);
        // Returned when dropped
    }
    println!("   Size after drop: {}\n", pool.size());
}

fn ttl_with_destructor(scheduler: &Scheduler) {
    println!("3. TTL with Destructor:");
    let config = PoolConfiguration::new()
        .with_name("short-lived")
        .with_ttl(Duration::from_millis(200))
        .with_sweep_interval(Duration::from_millis(100))
        .with_expire_fn(|conn: String| println!("   Closing {conn}"));
    let pool = Pool::new(config, scheduler);

    pool.put("conn-a".to_string()).unwrap();
    pool.put("conn-b".to_string()).unwrap();
    thread::sleep(Duration::from_millis(500));
    println!("   Size after expiry: {}\n", pool.size());
}

fn close_and_drain(scheduler: &Scheduler) {
    println!("4. Close and Drain:");
    let config = PoolConfiguration::new()
        .with_name("closing")
        .with_sweep_interval(Duration::from_millis(100))
        .with_expire_fn(|v: i32| println!("   Destroyed {v}"));
    let pool = Pool::new(config, scheduler);

    pool.put(1).unwrap();
    pool.put(2).unwrap();
    pool.close();
    println!("   Put after close: {:?}", pool.put(3));

    thread::sleep(Duration::from_millis(300));
    println!("   Sweep still registered: {}", pool.is_sweep_registered());

    let health = pool.get_health_status();
    println!("   Healthy: {}, warnings: {:?}", health.is_healthy(), health.warnings);

    println!("\n   Metrics:");
    for (key, value) in pool.export_metrics() {
        println!("     {}: {}", key, value);
    }
}

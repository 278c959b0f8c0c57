//! Async usage examples

use std::time::Duration;

use ttlpool::{Pool, PoolConfiguration, Scheduler};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== ttlpool - Async Examples ===\n");

    let scheduler = Scheduler::new();
    let driver = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_tokio(Duration::from_millis(50)).await })
    };

    let config = PoolConfiguration::new()
        .with_name("async")
        .with_ttl(Duration::from_millis(300))
        .with_sweep_interval(Duration::from_millis(100))
        .with_new_fn(|| Ok(String::from("fresh")))
        .with_expire_fn(|s: String| println!("   Expired {s}"));
    let pool = Pool::new(config, &scheduler);

    // Concurrent access
    println!("1. Concurrent Access:");
    let mut handles = Vec::new();
    for i in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let value = pool.get().unwrap();
            pool.put(format!("{value}-{i}")).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    println!("   Size after tasks: {}\n", pool.size());

    // Background expiry
    println!("2. Background Expiry:");
    tokio::time::sleep(Duration::from_millis(600)).await;
    println!("   Size after sweep: {}\n", pool.size());

    #[cfg(feature = "metrics")]
    match pool.export_metrics_prometheus(None) {
        Ok(text) => println!("3. Prometheus:\n{text}"),
        Err(err) => println!("3. Prometheus export failed: {err}"),
    }

    scheduler.shutdown();
    driver.await.unwrap();
}

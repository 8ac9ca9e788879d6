//! Load testing for the gateway.

use std::time::{Duration, Instant};

use gateway_sdk::GatewayClient;

mod common;

#[tokio::test]
async fn test_load_performance() {
    // 1. Setup mock backends
    let users = common::start_mock_backend(r#"[{"id":1,"name":"Ann"}]"#).await;
    let orders = common::start_mock_backend(r#"[{"id":1,"userId":1}]"#).await;

    // 2. Start gateway with the limiter off so only the breaker is exercised
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    // 3. Run load test
    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for i in 0..concurrency {
        let client = client.clone();
        // Half the tasks hit the composite endpoint, half a plain route.
        let url = if i % 2 == 0 {
            gateway.url("/users")
        } else {
            gateway.url("/users/1/details")
        };
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let mut failures = 0usize;
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                match client.get(&url).send().await {
                    Ok(res) if res.status().is_success() => latencies.push(req_start.elapsed()),
                    _ => failures += 1,
                }
            }
            (latencies, failures)
        }));
    }

    let mut all_latencies = Vec::new();
    let mut failures = 0;
    for task in tasks {
        let (latencies, failed) = task.await.unwrap();
        all_latencies.extend(latencies);
        failures += failed;
    }

    let duration = start.elapsed();
    all_latencies.sort();

    println!("Load test: {} requests in {:?}", total_requests, duration);
    println!(
        "Throughput: {:.2} req/s",
        total_requests as f64 / duration.as_secs_f64()
    );
    if let Some(p99) = all_latencies.get(all_latencies.len() * 99 / 100) {
        println!("p99 latency: {:?}", p99);
    }

    assert_eq!(failures, 0, "all requests should succeed");
    assert_eq!(all_latencies.len(), total_requests);

    // 4. Breakers saw every call and stayed closed
    let health = GatewayClient::new(&format!("http://{}", gateway.addr))
        .health()
        .await
        .unwrap();
    let users_circuit = &health.circuits["users"];
    assert_eq!(users_circuit.state, "closed");
    assert_eq!(users_circuit.stats.failures, 0);
    // Plain calls plus the primary branch of every composite call.
    assert_eq!(users_circuit.stats.requests as usize, total_requests);
    assert_eq!(
        health.circuits["orders"].stats.requests as usize,
        total_requests / 2
    );

    gateway.shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway.task).await;
}

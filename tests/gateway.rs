//! End-to-end tests: real gateway, real sockets, mock backends.

use std::time::Duration;

use gateway_sdk::GatewayClient;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_passthrough_forwards_path_query_and_request_id() {
    let users = common::start_programmable_backend(|req| async move {
        assert_eq!(req.path_and_query, "/users/7?expand=true");
        (200, r#"{"id":7,"name":"Ann"}"#.to_string())
    })
    .await;
    let orders = common::start_mock_backend("[]").await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client()
        .get(gateway.url("/users/7?expand=true"))
        .header("x-request-id", "corr-42")
        .header("cookie", "session=secret")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.headers()["x-request-id"], "corr-42");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"id": 7, "name": "Ann"}));

    let seen = users.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].headers["x-request-id"], "corr-42");
    assert_eq!(seen[0].headers["content-type"], "application/json");
    assert!(seen[0].headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_generated_request_id_reaches_backend() {
    let users = common::start_mock_backend("[]").await;
    let orders = common::start_mock_backend("[]").await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client().get(gateway.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    let echoed = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let forwarded = users.requests()[0].headers["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(echoed, forwarded);
}

#[tokio::test]
async fn test_backend_error_status_is_passed_through() {
    let users = common::start_mock_backend("[]").await;
    let orders = common::start_programmable_backend(|_| async {
        (404, r#"{"error": "Order not found"}"#.to_string())
    })
    .await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client().get(gateway.url("/orders/99")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), r#"{"error": "Order not found"}"#);
}

#[tokio::test]
async fn test_details_filters_orders_for_user() {
    let users = common::start_programmable_backend(|req| async move {
        assert_eq!(req.path_and_query, "/users/2");
        (200, r#"{"id":2,"name":"Ann","email":"ann@example.com"}"#.to_string())
    })
    .await;
    let orders = common::start_mock_backend(
        r#"[{"id":1,"userId":2,"name":"Book"},{"id":2,"userId":5,"name":"Pen"},{"id":3,"userId":2,"name":"Lamp"}]"#,
    )
    .await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let details = GatewayClient::new(&format!("http://{}", gateway.addr))
        .user_details("2")
        .await
        .unwrap();

    assert_eq!(details["user"]["name"], "Ann");
    assert_eq!(
        details["orders"],
        json!([
            {"id": 1, "userId": 2, "name": "Book"},
            {"id": 3, "userId": 2, "name": "Lamp"}
        ])
    );
    assert_eq!(orders.requests()[0].path_and_query, "/orders");
}

/// Start users and orders backends where one side answers after `delay`.
async fn details_with_delays(
    users_delay: Duration,
    orders_delay: Duration,
) -> (common::MockBackend, common::MockBackend) {
    let users = common::start_programmable_backend(move |_| async move {
        tokio::time::sleep(users_delay).await;
        (200, r#"{"id":2,"name":"Ann"}"#.to_string())
    })
    .await;
    let orders = common::start_programmable_backend(move |_| async move {
        tokio::time::sleep(orders_delay).await;
        (
            200,
            r#"[{"id":1,"userId":2},{"id":2,"userId":5},{"id":3,"userId":"2"}]"#.to_string(),
        )
    })
    .await;
    (users, orders)
}

#[tokio::test]
async fn test_details_result_is_independent_of_completion_order() {
    let mut results = Vec::new();
    for (users_delay, orders_delay) in [
        (Duration::from_millis(300), Duration::ZERO),
        (Duration::ZERO, Duration::from_millis(300)),
    ] {
        let (users, orders) = details_with_delays(users_delay, orders_delay).await;
        let gateway =
            common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

        let res = common::client()
            .get(gateway.url("/users/2/details"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        results.push(res.json::<Value>().await.unwrap());
    }

    assert_eq!(
        results[0],
        json!({
            "user": {"id": 2, "name": "Ann"},
            "orders": [{"id": 1, "userId": 2}, {"id": 3, "userId": "2"}]
        })
    );
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_details_user_not_found_passes_body_through() {
    let users = common::start_programmable_backend(|_| async {
        (404, r#"{"error": "User not found"}"#.to_string())
    })
    .await;
    let orders = common::start_mock_backend("[]").await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client()
        .get(gateway.url("/users/2/details"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), r#"{"error": "User not found"}"#);
}

#[tokio::test]
async fn test_details_orders_failure_is_bad_gateway() {
    let users = common::start_mock_backend(r#"{"id":2}"#).await;
    let orders = common::start_programmable_backend(|_| async {
        (500, r#"{"error": "Server error"}"#.to_string())
    })
    .await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client()
        .get(gateway.url("/users/2/details"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), r#"{"error": "Server error"}"#);
}

#[tokio::test]
async fn test_details_rejects_non_numeric_id() {
    let users = common::start_mock_backend("{}").await;
    let orders = common::start_mock_backend("[]").await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client()
        .get(gateway.url("/users/abc/details"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert!(users.requests().is_empty());
    assert!(orders.requests().is_empty());
}

#[tokio::test]
async fn test_rate_limit_rejects_burst_overflow() {
    let users = common::start_mock_backend("[]").await;
    let orders = common::start_mock_backend("[]").await;
    let mut config = common::config_for(&users.url(), &orders.url());
    config.rate_limit.enabled = true;
    config.rate_limit.burst_size = 3;
    config.rate_limit.requests_per_second = 0.01;
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..3 {
        let res = client.get(gateway.url("/status")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client.get(gateway.url("/status")).send().await.unwrap();
    assert_eq!(res.status(), 429);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"error": "rate limit exceeded"}));

    // A different forwarded client has its own bucket.
    let res = client
        .get(gateway.url("/status"))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_bearer_token_is_verified_and_forwarded() {
    let users = common::start_mock_backend("[]").await;
    let orders = common::start_mock_backend("[]").await;
    let mut config = common::config_for(&users.url(), &orders.url());
    config.auth.enabled = true;
    config.auth.secret = "integration-secret".into();
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let res = client.get(gateway.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(gateway.url("/users"))
        .header("authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid Authorization header format");

    let token = encode(
        &Header::default(),
        &json!({"user_id": 2, "exp": 4_102_444_800u64}),
        &EncodingKey::from_secret(b"integration-secret"),
    )
    .unwrap();
    let res = client
        .get(gateway.url("/users"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        users.requests()[0].headers["authorization"],
        format!("Bearer {}", token).as_str()
    );

    // Health stays public.
    let res = client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_create_order_validation_and_forwarding() {
    let users = common::start_mock_backend("[]").await;
    let orders = common::start_programmable_backend(|req| async move {
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        (201, json!({"id": 10, "name": body["name"]}).to_string())
    })
    .await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;
    let sdk = GatewayClient::new(&format!("http://{}", gateway.addr));

    let res = sdk
        .post_json("/orders", &json!({"name": "Book", "status": "new"}))
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert!(orders.requests().is_empty());

    let res = sdk
        .post_json("/orders", &json!({"name": "Book", "status": "new", "userId": 2}))
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"id": 10, "name": "Book"}));
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let users = common::start_mock_backend("[]").await;
    let orders = common::start_mock_backend("[]").await;
    let gateway = common::start_gateway(common::config_for(&users.url(), &orders.url())).await;

    let res = common::client().get(gateway.url("/status")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    gateway.shutdown.trigger();
    let finished = tokio::time::timeout(Duration::from_secs(5), gateway.task)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(finished.is_ok());
}

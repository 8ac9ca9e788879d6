use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type SdkResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// One backend breaker as reported by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitReport {
    pub state: String,
    pub stats: CircuitStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitStats {
    pub requests: u32,
    pub successes: u32,
    pub failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub circuits: std::collections::BTreeMap<String, CircuitReport>,
}

/// A non-2xx reply from the gateway.
#[derive(Debug)]
pub struct GatewayFailure {
    pub status: StatusCode,
    pub body: String,
}

impl std::fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gateway returned {}: {}", self.status, self.body)
    }
}

impl std::error::Error for GatewayFailure {}

pub struct GatewayClient {
    client: Client,
    gateway_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> Self {
        let client = Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Liveness and breaker snapshot.
    pub async fn health(&self) -> SdkResult<HealthReport> {
        let resp = self.get("/health").await?;
        Ok(expect_success(resp).await?.json().await?)
    }

    pub async fn status(&self) -> SdkResult<Value> {
        let resp = self.get("/status").await?;
        Ok(expect_success(resp).await?.json().await?)
    }

    /// The composite `{"user": .., "orders": [..]}` document.
    pub async fn user_details(&self, user_id: &str) -> SdkResult<Value> {
        let resp = self.get(&format!("/users/{}/details", user_id)).await?;
        Ok(expect_success(resp).await?.json().await?)
    }

    /// Raw GET through the gateway.
    pub async fn get(&self, path: &str) -> Result<Response, reqwest::Error> {
        let mut req = self.client.get(format!("{}{}", self.gateway_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req.send().await
    }

    /// Raw JSON POST through the gateway.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        let mut req = self
            .client
            .post(format!("{}{}", self.gateway_url, path))
            .json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req.send().await
    }
}

async fn expect_success(resp: Response) -> SdkResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Box::new(GatewayFailure { status, body }))
}

//! HTTP API client for the work-order REST endpoints.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use trackmint_shared::{ApiError, WorkOrder, WorkOrderStatusChange};

/// HTTP client for making authenticated API requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn read_json<TRes: DeserializeOwned>(resp: Response) -> Result<TRes, ApiError> {
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read_json(resp).await
    }

    /// Make a PUT request with JSON body
    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let body_bytes = serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let rb = self
            .authorize(self.client.put(self.url(path)))
            .body(body_bytes)
            .header("Content-Type", "application/json");
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read_json(resp).await
    }

    // --- Work orders ---

    /// List work orders
    pub async fn list_work_orders(&self) -> Result<Vec<WorkOrder>, ApiError> {
        self.get_json("/work-orders").await
    }

    /// Get a single work order
    pub async fn get_work_order(&self, id: &str) -> Result<WorkOrder, ApiError> {
        self.get_json(&format!("/work-orders/{}", urlencoding::encode(id)))
            .await
    }

    /// Persist a work-order status transition
    pub async fn update_work_order_status(
        &self,
        id: &str,
        change: &WorkOrderStatusChange,
    ) -> Result<WorkOrder, ApiError> {
        self.put_json(&format!("/work-orders/{}/status", urlencoding::encode(id)), change)
            .await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackmint_shared::WorkOrderStatus;

    #[test]
    fn url_joins_base_and_path() {
        let api = ApiClient::new().with_base_url("http://localhost:8000/api/");
        assert_eq!(api.url("/work-orders"), "http://localhost:8000/api/work-orders");
        assert_eq!(api.url("work-orders/wo-1"), "http://localhost:8000/api/work-orders/wo-1");
    }

    #[test]
    fn url_without_base_is_rooted() {
        let api = ApiClient::new();
        assert_eq!(api.url("work-orders"), "/work-orders");
        assert_eq!(api.url("https://other.example/x"), "https://other.example/x");
    }

    /// Answer a single HTTP request with a canned JSON response.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    #[tokio::test]
    async fn list_work_orders_decodes_the_array() {
        let base = serve_once(
            "200 OK",
            r#"[{"id":"wo-1","status":"Started","elapsedTime":30},{"id":"wo-2"}]"#,
        )
        .await;
        let orders = ApiClient::new().with_base_url(base).list_work_orders().await.unwrap();

        let ids: Vec<_> = orders.iter().map(|wo| wo.id.as_str()).collect();
        assert_eq!(ids, vec!["wo-1", "wo-2"]);
        assert_eq!(orders[0].status, WorkOrderStatus::Started);
        assert_eq!(orders[0].elapsed_time, 30);
        assert_eq!(orders[1].status, WorkOrderStatus::Ready);
    }

    #[tokio::test]
    async fn error_status_surfaces_detail() {
        let base = serve_once("404 Not Found", r#"{"detail":"Work order not found"}"#).await;
        let err = ApiClient::new().with_base_url(base).get_work_order("wo-9").await.unwrap_err();

        assert!(err.is_not_found(), "got {err:?}");
        assert_eq!(err.user_message(), "Work order not found");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let api = ApiClient::new().with_base_url("http://127.0.0.1:1");
        let err = api.get_work_order("wo-1").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    }
}

use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::Client;
use serde_json::Value;

use crate::gateways::{GatewayError, RefundRequest, RefundResponse};

/// Delivers refund requests to the payment gateways.
#[allow(async_fn_in_trait)]
pub trait RefundTransport {
    /// Sends the request and returns whatever the gateway answered. Only failures to get an answer at all (timeouts,
    /// connection errors) are errors; interpreting the answer is up to the adapter.
    async fn send(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError>;
}

/// [`RefundTransport`] over HTTPS, posting the request body as JSON.
#[derive(Clone)]
pub struct HttpRefundTransport {
    client: Arc<Client>,
}

impl HttpRefundTransport {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client: Arc::new(client) })
    }
}

impl RefundTransport for HttpRefundTransport {
    async fn send(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError> {
        if request.url.is_empty() {
            return Err(GatewayError::Transport(format!("No refund URL is configured for {}", request.method)));
        }
        trace!("💳️ POST {}", request.url);
        let response = self
            .client
            .post(request.url.as_str())
            .json(&request.body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        trace!("💳️ Refund response. HTTP {status}: {body}");
        Ok(RefundResponse::new(status, body))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::db_types::PaymentMethod;

    #[tokio::test]
    async fn missing_url_is_a_transport_error() {
        let transport = HttpRefundTransport::new(Duration::from_secs(1)).unwrap();
        let request = RefundRequest { method: PaymentMethod::Card, url: String::new(), body: json!({}) };
        let err = transport.send(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_error() {
        let transport = HttpRefundTransport::new(Duration::from_millis(500)).unwrap();
        let request =
            RefundRequest { method: PaymentMethod::Wallet, url: "http://127.0.0.1:9/refund".into(), body: json!({}) };
        let err = transport.send(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}

use kpg_payment_engine::gateways::{GatewayError, RefundRequest, RefundResponse, RefundTransport};
use mockall::mock;
use serde_json::json;

mock! {
    pub Transport {}
    impl RefundTransport for Transport {
        async fn send(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError>;
    }
}

/// A transport that must never be used. Any refund call fails the test.
pub fn no_refunds() -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_send().never();
    transport
}

/// A transport that accepts `times` wallet refunds.
pub fn accepting_wallet_refunds(times: usize) -> MockTransport {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(times)
        .returning(|_| Ok(RefundResponse::new(200, json!({"return_code": "SUCCESS", "result_code": "SUCCESS"}))));
    transport
}

/// A transport that accepts any number of refunds, whichever gateway asks.
pub fn accepting_refunds() -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_send().returning(|_| {
        Ok(RefundResponse::new(200, json!({"result_code": "SUCCESS", "code": "10000", "resp_code": "00"})))
    });
    transport
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::OfflineConfig,
    db_types::{Money, Order, PaymentMethod},
    gateways::{GatewayAdapter, GatewayError, InitiationParams, RefundRequest, RefundResponse},
};

/// What a user needs to know to pay in person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineInstructions {
    pub order_no: String,
    pub amount: Money,
    pub contact: String,
    pub location: String,
    pub deadline: DateTime<Utc>,
    pub instructions: String,
}

/// Offline payments are confirmed by staff, so there are no credentials to build and no callbacks to parse.
/// Refunds are handed back in cash and settle without a gateway.
pub struct OfflineGateway {
    config: OfflineConfig,
}

impl OfflineGateway {
    pub fn new(config: OfflineConfig) -> Self {
        Self { config }
    }
}

impl GatewayAdapter for OfflineGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Offline
    }

    fn build_initiation_params(
        &self,
        order: &Order,
        _return_url: &str,
        _notify_url: &str,
    ) -> Result<InitiationParams, GatewayError> {
        let contact = order.offline_contact.clone().unwrap_or_else(|| self.config.contact.clone());
        let location = order.offline_location.clone().unwrap_or_else(|| self.config.location.clone());
        let deadline = order.offline_deadline.unwrap_or(order.created_at + self.config.payment_window);
        let instructions = format!(
            "Please pay {} for order {} at {location} before {}. Contact: {contact}.",
            order.final_amount,
            order.order_no,
            deadline.format("%Y-%m-%d %H:%M UTC")
        );
        Ok(InitiationParams::Offline(OfflineInstructions {
            order_no: order.order_no.to_string(),
            amount: order.final_amount,
            contact,
            location,
            deadline,
            instructions,
        }))
    }

    fn extract_paid_amount(&self, _payload: &Value) -> Result<Money, GatewayError> {
        Err(GatewayError::Unsupported { method: PaymentMethod::Offline, operation: "payment callbacks" })
    }

    fn extract_transaction_id(&self, _payload: &Value) -> Option<String> {
        None
    }

    fn refund_request(
        &self,
        _order: &Order,
        _amount: Money,
        _reason: &str,
    ) -> Result<Option<RefundRequest>, GatewayError> {
        Ok(None)
    }

    fn refund_succeeded(&self, _response: &RefundResponse) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::gateways::test_order::order;

    #[test]
    fn instructions_fall_back_to_configured_defaults() {
        let gw = OfflineGateway::new(OfflineConfig {
            contact: "Ms. Li, 555-0100".into(),
            location: "Front desk".into(),
            payment_window: Duration::hours(24),
        });
        let order = order(PaymentMethod::Offline);
        let InitiationParams::Offline(params) = gw.build_initiation_params(&order, "", "").unwrap() else {
            panic!("Expected offline instructions");
        };
        assert_eq!(params.contact, "Ms. Li, 555-0100");
        assert_eq!(params.deadline, Utc.with_ymd_and_hms(2024, 10, 17, 9, 30, 15).unwrap());
        assert_eq!(params.amount, Money::from_major(80));
        assert!(params.instructions.contains("80.00"));
        assert!(params.instructions.contains("Front desk"));
    }

    #[test]
    fn order_details_take_precedence() {
        let gw = OfflineGateway::new(OfflineConfig::default());
        let mut order = order(PaymentMethod::Offline);
        order.offline_location = Some("Room 101".into());
        let InitiationParams::Offline(params) = gw.build_initiation_params(&order, "", "").unwrap() else {
            panic!("Expected offline instructions");
        };
        assert_eq!(params.location, "Room 101");
    }

    #[test]
    fn no_callbacks_and_no_gateway_refunds() {
        let gw = OfflineGateway::new(OfflineConfig::default());
        let order = order(PaymentMethod::Offline);
        assert!(matches!(gw.extract_paid_amount(&json!({"amount": "80.00"})), Err(GatewayError::Unsupported { .. })));
        assert_eq!(gw.refund_request(&order, order.final_amount, "cash").unwrap(), None);
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::CardConfig,
    db_types::{Money, Order, PaymentMethod},
    gateways::{
        major_units,
        refund_no,
        signing::{fields, sign_fields},
        string_field,
        subject,
        GatewayAdapter,
        GatewayError,
        InitiationParams,
        RefundRequest,
        RefundResponse,
    },
};

const PAY_METHOD: &str = "trade.page.pay";
const REFUND_METHOD: &str = "trade.refund";
const CHARSET: &str = "utf-8";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SUCCESS_CODE: &str = "10000";

/// Card payment parameters. Amounts are decimal strings in major units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayParams {
    pub app_id: String,
    pub method: String,
    pub charset: String,
    pub timestamp: String,
    pub out_trade_no: String,
    pub total_amount: String,
    pub subject: String,
    pub return_url: String,
    pub notify_url: String,
    pub sign: String,
}

pub struct CardGateway {
    config: CardConfig,
}

impl CardGateway {
    pub fn new(config: CardConfig) -> Self {
        Self { config }
    }
}

impl GatewayAdapter for CardGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn build_initiation_params(
        &self,
        order: &Order,
        return_url: &str,
        notify_url: &str,
    ) -> Result<InitiationParams, GatewayError> {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let total_amount = order.final_amount.to_string();
        let subject = subject(order);
        let to_sign = fields(&[
            ("app_id", self.config.app_id.as_str()),
            ("method", PAY_METHOD),
            ("charset", CHARSET),
            ("timestamp", timestamp.as_str()),
            ("out_trade_no", order.order_no.as_str()),
            ("total_amount", total_amount.as_str()),
            ("subject", subject.as_str()),
            ("return_url", return_url),
            ("notify_url", notify_url),
        ]);
        let sign = sign_fields(&to_sign, &self.config.signing_key)?;
        Ok(InitiationParams::Card(CardPayParams {
            app_id: self.config.app_id.clone(),
            method: PAY_METHOD.to_string(),
            charset: CHARSET.to_string(),
            timestamp,
            out_trade_no: order.order_no.to_string(),
            total_amount,
            subject,
            return_url: return_url.to_string(),
            notify_url: notify_url.to_string(),
            sign,
        }))
    }

    /// `total_amount` in major units, e.g. `"80.00"`.
    fn extract_paid_amount(&self, payload: &Value) -> Result<Money, GatewayError> {
        let amount = payload
            .get("total_amount")
            .ok_or_else(|| GatewayError::InvalidPayload("card callback has no total_amount".into()))?;
        major_units(amount)
    }

    fn extract_transaction_id(&self, payload: &Value) -> Option<String> {
        string_field(payload, &["/trade_no", "/transaction_id"])
    }

    fn refund_request(
        &self,
        order: &Order,
        amount: Money,
        reason: &str,
    ) -> Result<Option<RefundRequest>, GatewayError> {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let mut body = fields(&[
            ("app_id", self.config.app_id.as_str()),
            ("method", REFUND_METHOD),
            ("charset", CHARSET),
            ("timestamp", timestamp.as_str()),
            ("out_trade_no", order.order_no.as_str()),
            ("out_request_no", refund_no(order).as_str()),
            ("refund_amount", amount.to_string().as_str()),
            ("refund_reason", reason),
        ]);
        if let Some(txid) = &order.transaction_id {
            body.insert("trade_no".into(), txid.clone());
        }
        let sign = sign_fields(&body, &self.config.signing_key)?;
        body.insert("sign".into(), sign);
        let body = serde_json::to_value(body).map_err(|e| GatewayError::Signing(e.to_string()))?;
        Ok(Some(RefundRequest { method: PaymentMethod::Card, url: self.config.refund_url.clone(), body }))
    }

    /// Accepted when the gateway answers with `code` `10000`.
    fn refund_succeeded(&self, response: &RefundResponse) -> bool {
        response.is_http_success() && response.field("code") == Some(SUCCESS_CODE)
    }
}

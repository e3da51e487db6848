use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::WalletConfig,
    db_types::{Money, Order, PaymentMethod},
    gateways::{
        minor_units,
        refund_no,
        signing::{fields, random_nonce, sign_fields},
        string_field,
        GatewayAdapter,
        GatewayError,
        InitiationParams,
        RefundRequest,
        RefundResponse,
    },
};

/// Mobile wallet payment parameters. The wallet works in minor units (`total_fee` is in cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPayParams {
    pub app_id: String,
    pub merchant_id: String,
    pub out_trade_no: String,
    pub total_fee: i64,
    pub notify_url: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub pay_sign: String,
}

pub struct WalletGateway {
    config: WalletConfig,
}

impl WalletGateway {
    pub fn new(config: WalletConfig) -> Self {
        Self { config }
    }
}

impl GatewayAdapter for WalletGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wallet
    }

    fn build_initiation_params(
        &self,
        order: &Order,
        _return_url: &str,
        notify_url: &str,
    ) -> Result<InitiationParams, GatewayError> {
        let time_stamp = Utc::now().timestamp().to_string();
        let nonce_str = random_nonce();
        let total_fee = order.final_amount.value();
        let to_sign = fields(&[
            ("app_id", self.config.app_id.as_str()),
            ("merchant_id", self.config.merchant_id.as_str()),
            ("out_trade_no", order.order_no.as_str()),
            ("total_fee", total_fee.to_string().as_str()),
            ("notify_url", notify_url),
            ("time_stamp", time_stamp.as_str()),
            ("nonce_str", nonce_str.as_str()),
        ]);
        let pay_sign = sign_fields(&to_sign, &self.config.api_key)?;
        Ok(InitiationParams::Wallet(WalletPayParams {
            app_id: self.config.app_id.clone(),
            merchant_id: self.config.merchant_id.clone(),
            out_trade_no: order.order_no.to_string(),
            total_fee,
            notify_url: notify_url.to_string(),
            time_stamp,
            nonce_str,
            pay_sign,
        }))
    }

    /// The wallet reports `amount.total` (or the older flat `total_fee`) in minor units.
    fn extract_paid_amount(&self, payload: &Value) -> Result<Money, GatewayError> {
        let amount = payload
            .pointer("/amount/total")
            .or_else(|| payload.get("total_fee"))
            .ok_or_else(|| GatewayError::InvalidPayload("wallet callback has no amount.total or total_fee".into()))?;
        minor_units(amount)
    }

    fn extract_transaction_id(&self, payload: &Value) -> Option<String> {
        string_field(payload, &["/transaction_id"])
    }

    fn refund_request(
        &self,
        order: &Order,
        amount: Money,
        reason: &str,
    ) -> Result<Option<RefundRequest>, GatewayError> {
        let mut body = fields(&[
            ("app_id", self.config.app_id.as_str()),
            ("merchant_id", self.config.merchant_id.as_str()),
            ("out_trade_no", order.order_no.as_str()),
            ("out_refund_no", refund_no(order).as_str()),
            ("total_fee", order.final_amount.value().to_string().as_str()),
            ("refund_fee", amount.value().to_string().as_str()),
            ("refund_desc", reason),
            ("nonce_str", random_nonce().as_str()),
        ]);
        if let Some(txid) = &order.transaction_id {
            body.insert("transaction_id".into(), txid.clone());
        }
        let sign = sign_fields(&body, &self.config.api_key)?;
        body.insert("sign".into(), sign);
        let body = serde_json::to_value(body).map_err(|e| GatewayError::Signing(e.to_string()))?;
        Ok(Some(RefundRequest { method: PaymentMethod::Wallet, url: self.config.refund_url.clone(), body }))
    }

    /// Accepted when the gateway answers with `result_code` of `SUCCESS`.
    fn refund_succeeded(&self, response: &RefundResponse) -> bool {
        response.is_http_success() && response.field("result_code") == Some("SUCCESS")
    }
}

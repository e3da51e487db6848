use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::BankConfig,
    db_types::{Money, Order, PaymentMethod},
    gateways::{
        compact_timestamp,
        major_units,
        refund_no,
        signing::{fields, sign_fields},
        string_field,
        GatewayAdapter,
        GatewayError,
        InitiationParams,
        RefundRequest,
        RefundResponse,
    },
};

const SUCCESS_CODE: &str = "00";

/// Online bank transfer parameters. Amounts are decimal strings in major units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankPayParams {
    pub mer_id: String,
    pub order_id: String,
    pub txn_amt: String,
    pub currency_code: String,
    pub front_url: String,
    pub back_url: String,
    pub txn_time: String,
    pub signature: String,
}

pub struct BankGateway {
    config: BankConfig,
}

impl BankGateway {
    pub fn new(config: BankConfig) -> Self {
        Self { config }
    }
}

impl GatewayAdapter for BankGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Bank
    }

    fn build_initiation_params(
        &self,
        order: &Order,
        return_url: &str,
        notify_url: &str,
    ) -> Result<InitiationParams, GatewayError> {
        let txn_time = compact_timestamp(Utc::now());
        let txn_amt = order.final_amount.to_string();
        let to_sign = fields(&[
            ("mer_id", self.config.merchant_id.as_str()),
            ("order_id", order.order_no.as_str()),
            ("txn_amt", txn_amt.as_str()),
            ("currency_code", self.config.currency_code.as_str()),
            ("front_url", return_url),
            ("back_url", notify_url),
            ("txn_time", txn_time.as_str()),
        ]);
        let signature = sign_fields(&to_sign, &self.config.signing_key)?;
        Ok(InitiationParams::Bank(BankPayParams {
            mer_id: self.config.merchant_id.clone(),
            order_id: order.order_no.to_string(),
            txn_amt,
            currency_code: self.config.currency_code.clone(),
            front_url: return_url.to_string(),
            back_url: notify_url.to_string(),
            txn_time,
            signature,
        }))
    }

    /// `amount` in major units, as a decimal string or a number.
    fn extract_paid_amount(&self, payload: &Value) -> Result<Money, GatewayError> {
        let amount =
            payload.get("amount").ok_or_else(|| GatewayError::InvalidPayload("bank callback has no amount".into()))?;
        major_units(amount)
    }

    fn extract_transaction_id(&self, payload: &Value) -> Option<String> {
        string_field(payload, &["/query_id", "/transaction_id"])
    }

    fn refund_request(
        &self,
        order: &Order,
        amount: Money,
        reason: &str,
    ) -> Result<Option<RefundRequest>, GatewayError> {
        let mut body = fields(&[
            ("mer_id", self.config.merchant_id.as_str()),
            ("order_id", refund_no(order).as_str()),
            ("orig_order_id", order.order_no.as_str()),
            ("txn_amt", amount.to_string().as_str()),
            ("currency_code", self.config.currency_code.as_str()),
            ("txn_time", compact_timestamp(Utc::now()).as_str()),
            ("reason", reason),
        ]);
        if let Some(txid) = &order.transaction_id {
            body.insert("orig_query_id".into(), txid.clone());
        }
        let signature = sign_fields(&body, &self.config.signing_key)?;
        body.insert("signature".into(), signature);
        let body = serde_json::to_value(body).map_err(|e| GatewayError::Signing(e.to_string()))?;
        Ok(Some(RefundRequest { method: PaymentMethod::Bank, url: self.config.refund_url.clone(), body }))
    }

    /// Accepted when the gateway answers with `resp_code` `00`.
    fn refund_succeeded(&self, response: &RefundResponse) -> bool {
        response.is_http_success() && response.field("resp_code") == Some(SUCCESS_CODE)
    }
}

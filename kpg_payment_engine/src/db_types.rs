use std::{fmt::Display, str::FromStr, sync::OnceLock};

use chrono::{DateTime, Utc};
pub use kpg_common::Money;
use rand::{thread_rng, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order has been created, and no confirmed payment has been received yet.
    Pending,
    /// Payment has been received in full.
    Paid,
    /// The order was cancelled by the user or staff, or the payment failed.
    Cancelled,
    /// The payment was returned to the user.
    Refunded,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 4] = [Self::Pending, Self::Paid, Self::Cancelled, Self::Refunded];

    /// The order state machine.
    ///
    /// | From \ To | Pending | Paid | Cancelled | Refunded |
    /// |-----------|---------|------|-----------|----------|
    /// | Pending   | Err     | Ok   | Ok        | Err      |
    /// | Paid      | Err     | Err  | Err       | Ok       |
    /// | Cancelled | Err     | Err  | Err       | Err      |
    /// | Refunded  | Err     | Err  | Err       | Err      |
    pub fn can_transition_to(self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!((self, next), (Pending, Paid) | (Pending, Cancelled) | (Paid, Refunded))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------      OrderType        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Payment for an activity registration
    Registration,
    /// Payment for a share in a group-buy deal
    GroupBuy,
    /// Payment attached to a reward-collection activity
    CollectReward,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::GroupBuy => "group_buy",
            Self::CollectReward => "collect_reward",
        }
    }
}

impl Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "group_buy" => Ok(Self::GroupBuy),
            "collect_reward" => Ok(Self::CollectReward),
            s => Err(ConversionError(format!("Invalid order type: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Mobile wallet payments. Amounts on the wire are in minor units.
    Wallet,
    /// Card payments. Amounts on the wire are decimal major units.
    Card,
    /// Online bank transfer. Amounts on the wire are decimal major units.
    Bank,
    /// Cash or transfer settled outside any gateway and confirmed by staff.
    Offline,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [Self::Wallet, Self::Card, Self::Bank, Self::Offline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Card => "card",
            Self::Bank => "bank",
            Self::Offline => "offline",
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(Self::Wallet),
            "card" => Ok(Self::Card),
            "bank" => Ok(Self::Bank),
            "offline" => Ok(Self::Offline),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------        OrderNo        ---------------------------------------------------------
/// The externally visible order number, e.g. `KG20241016093015123456`: a `KG` prefix, the UTC creation time to the
/// second, and six random digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNo(String);

fn order_no_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^KG\d{20}$").expect("order number regex is valid"))
}

impl OrderNo {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = thread_rng().gen_range(0..1_000_000u32);
        Self(format!("KG{}{suffix:06}", now.format("%Y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNo {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if order_no_regex().is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ConversionError(format!("Invalid order number: {s}")))
        }
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------    OrderReference     ---------------------------------------------------------
/// The business object an order pays for. The variant always agrees with the order's [`OrderType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum OrderReference {
    Registration(i64),
    GroupBuy(i64),
    CollectReward(i64),
}

impl OrderReference {
    pub fn order_type(&self) -> OrderType {
        match self {
            Self::Registration(_) => OrderType::Registration,
            Self::GroupBuy(_) => OrderType::GroupBuy,
            Self::CollectReward(_) => OrderType::CollectReward,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Registration(id) | Self::GroupBuy(id) | Self::CollectReward(id) => *id,
        }
    }

    /// Rebuilds the reference from its column representation. Returns `None` unless exactly the column matching
    /// `order_type` is set.
    pub fn from_columns(
        order_type: OrderType,
        registration_id: Option<i64>,
        group_buy_id: Option<i64>,
        collect_activity_id: Option<i64>,
    ) -> Option<Self> {
        match (order_type, registration_id, group_buy_id, collect_activity_id) {
            (OrderType::Registration, Some(id), None, None) => Some(Self::Registration(id)),
            (OrderType::GroupBuy, None, Some(id), None) => Some(Self::GroupBuy(id)),
            (OrderType::CollectReward, None, None, Some(id)) => Some(Self::CollectReward(id)),
            _ => None,
        }
    }

    /// `(registration_id, group_buy_id, collect_activity_id)`
    pub fn columns(&self) -> (Option<i64>, Option<i64>, Option<i64>) {
        match self {
            Self::Registration(id) => (Some(*id), None, None),
            Self::GroupBuy(id) => (None, Some(*id), None),
            Self::CollectReward(id) => (None, None, Some(*id)),
        }
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub user_id: i64,
    pub activity_id: i64,
    pub order_type: OrderType,
    pub registration_id: Option<i64>,
    pub group_buy_id: Option<i64>,
    pub collect_activity_id: Option<i64>,
    pub original_amount: Money,
    pub discount_amount: Money,
    /// Always `original_amount - discount_amount`. Set when the order is created and never changed.
    pub final_amount: Money,
    pub payment_method: PaymentMethod,
    pub status: OrderStatusType,
    /// Free-form note. Failed and cancelled orders record the reason here.
    pub remark: Option<String>,
    /// The gateway's reference for the successful payment
    pub transaction_id: Option<String>,
    pub offline_contact: Option<String>,
    pub offline_location: Option<String>,
    pub offline_deadline: Option<DateTime<Utc>>,
    /// The staff member that confirmed an offline payment
    pub confirmed_by: Option<i64>,
    pub payment_proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_time: Option<DateTime<Utc>>,
    pub refund_time: Option<DateTime<Utc>>,
    pub refund_amount: Option<Money>,
    pub refund_reason: Option<String>,
}

impl Order {
    pub fn is_offline(&self) -> bool {
        self.payment_method == PaymentMethod::Offline
    }
}

//--------------------------------------    OfflineDetails     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineDetails {
    /// Who to pay, e.g. the front desk phone number
    pub contact: String,
    /// Where to pay
    pub location: String,
    /// Unpaid offline orders are cancelled after this time
    pub deadline: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// A validated order, ready to be inserted into the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: OrderNo,
    pub user_id: i64,
    pub activity_id: i64,
    pub reference: OrderReference,
    pub original_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub payment_method: PaymentMethod,
    pub remark: Option<String>,
    pub offline: Option<OfflineDetails>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(
        order_no: OrderNo,
        user_id: i64,
        activity_id: i64,
        reference: OrderReference,
        original_amount: Money,
        discount_amount: Money,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            order_no,
            user_id,
            activity_id,
            reference,
            original_amount,
            discount_amount,
            final_amount: original_amount - discount_amount,
            payment_method,
            remark: None,
            offline: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_remark(mut self, remark: String) -> Self {
        self.remark = Some(remark);
        self
    }

    pub fn with_offline_details(mut self, details: OfflineDetails) -> Self {
        self.offline = Some(details);
        self
    }
}

//--------------------------------------    OrderTransition    ---------------------------------------------------------
/// A status change plus the fields that are written together with it.
///
/// Transitions are applied with a compare-and-swap on the current status (see
/// [`crate::OrderStore::conditional_update_status`]), so the side fields are only ever written by the caller that won
/// the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTransition {
    pub new_status: OrderStatusType,
    pub remark: Option<String>,
    pub payment_time: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub confirmed_by: Option<i64>,
    pub payment_proof: Option<String>,
    pub refund_time: Option<DateTime<Utc>>,
    pub refund_amount: Option<Money>,
    pub refund_reason: Option<String>,
}

impl OrderTransition {
    /// A bare status change
    pub fn to(new_status: OrderStatusType) -> Self {
        Self {
            new_status,
            remark: None,
            payment_time: None,
            transaction_id: None,
            confirmed_by: None,
            payment_proof: None,
            refund_time: None,
            refund_amount: None,
            refund_reason: None,
        }
    }

    pub fn paid(at: DateTime<Utc>) -> Self {
        Self { payment_time: Some(at), ..Self::to(OrderStatusType::Paid) }
    }

    pub fn cancelled<S: Into<String>>(remark: S) -> Self {
        Self { remark: Some(remark.into()), ..Self::to(OrderStatusType::Cancelled) }
    }

    pub fn refunded<S: Into<String>>(amount: Money, reason: S, at: DateTime<Utc>) -> Self {
        Self {
            refund_time: Some(at),
            refund_amount: Some(amount),
            refund_reason: Some(reason.into()),
            ..Self::to(OrderStatusType::Refunded)
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: Option<String>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_confirmed_by(mut self, staff_id: i64) -> Self {
        self.confirmed_by = Some(staff_id);
        self
    }

    pub fn with_payment_proof(mut self, proof: Option<String>) -> Self {
        self.payment_proof = proof;
        self
    }
}

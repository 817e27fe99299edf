//! User account (user-data stream) event types.
//!
//! Order fields that carry trading semantics (side, type, status) are kept as
//! the exchange's strings; this crate only routes them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Free and locked amounts of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Asset (e.g. "BTC").
    pub asset: String,
    /// Free amount.
    pub free: Decimal,
    /// Locked amount.
    pub locked: Decimal,
}

/// Account position update (`outboundAccountPosition`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// Event time.
    pub event_time: DateTime<Utc>,
    /// Time of the last account update.
    pub last_update_time: DateTime<Utc>,
    /// Balances that changed.
    pub balances: Vec<Balance>,
}

/// Balance delta from a deposit, withdrawal or transfer (`balanceUpdate`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    /// Event time.
    pub event_time: DateTime<Utc>,
    /// Asset.
    pub asset: String,
    /// Balance delta.
    pub delta: Decimal,
    /// Clear time.
    pub clear_time: DateTime<Utc>,
}

/// Order execution report (`executionReport`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Event time.
    pub event_time: DateTime<Utc>,
    /// Symbol.
    pub symbol: String,
    /// Client order ID.
    pub client_order_id: String,
    /// Side ("BUY" / "SELL").
    pub side: String,
    /// Order type.
    pub order_type: String,
    /// Time in force.
    pub time_in_force: String,
    /// Order quantity.
    pub quantity: Decimal,
    /// Order price.
    pub price: Decimal,
    /// Execution type of this report.
    pub execution_type: String,
    /// Current order status.
    pub status: String,
    /// Reject reason ("NONE" when accepted).
    pub reject_reason: String,
    /// Exchange order ID.
    pub order_id: u64,
    /// Quantity filled by the last execution.
    pub last_executed_quantity: Decimal,
    /// Cumulative filled quantity.
    pub cumulative_quantity: Decimal,
    /// Price of the last execution.
    pub last_executed_price: Decimal,
    /// Commission amount.
    pub commission: Decimal,
    /// Commission asset, if any commission was charged.
    pub commission_asset: Option<String>,
    /// Transaction time.
    pub transaction_time: DateTime<Utc>,
    /// Trade ID (-1 when the report is not a fill).
    pub trade_id: i64,
}

/// Event raised by a user-data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserDataEvent {
    /// Account position changed.
    Account(AccountUpdate),
    /// Balance delta.
    Balance(BalanceUpdate),
    /// Order execution report.
    Order(OrderUpdate),
}

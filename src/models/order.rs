use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_side", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Ask,
    Bid,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Ask => Side::Bid,
            Side::Bid => Side::Ask,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ask => write!(f, "ask"),
            Side::Bid => write!(f, "bid"),
        }
    }
}

/// A persisted order row.
///
/// A null `price` marks a market order; such orders are always
/// immediate-or-cancel by the time they are persisted, so they never rest.
/// `active` is true only while un-traded quantity is resting in the book.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: i64,
    pub security_symbol: String,
    pub side: Side,
    pub size: i64,
    pub price: Option<Decimal>,
    pub all_or_none: bool,
    pub immediate_or_cancel: bool,
    pub active: bool,
    pub parent_order_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub cancelled_dttm: Option<DateTime<Utc>>,
    pub create_dttm: DateTime<Utc>,
}

impl Order {
    /// Build the residual of a partially filled order: same terms, reduced
    /// size, linked to this order via `parent_order_id`.
    pub fn suborder(&self, size: i64, now: DateTime<Utc>) -> NewOrder {
        NewOrder {
            security_symbol: self.security_symbol.clone(),
            side: self.side,
            size,
            price: self.price,
            all_or_none: self.all_or_none,
            immediate_or_cancel: self.immediate_or_cancel,
            active: false,
            parent_order_id: Some(self.order_id),
            owner_id: self.owner_id,
            cancelled_dttm: None,
            create_dttm: now,
        }
    }

    pub fn is_market(&self) -> bool {
        self.price.is_none()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order(id={}, symbol={}, side={}, size={}, price={})",
            self.order_id,
            self.security_symbol,
            self.side,
            self.size,
            self.price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "market".to_string()),
        )
    }
}

/// An order that has not been assigned an `order_id` yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub security_symbol: String,
    pub side: Side,
    pub size: i64,
    pub price: Option<Decimal>,
    pub all_or_none: bool,
    pub immediate_or_cancel: bool,
    pub active: bool,
    pub parent_order_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub cancelled_dttm: Option<DateTime<Utc>>,
    pub create_dttm: DateTime<Utc>,
}

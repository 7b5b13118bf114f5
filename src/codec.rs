//! Order Codec
//!
//! Self-describing JSON payload for orders travelling through the work
//! queue. The payload covers the full order attribute set; nullable fields
//! are encoded as explicit `null`s and datetimes as RFC 3339 UTC, so a
//! payload produced by any engine version stays readable by later ones.
//! Unknown fields are rejected on decode.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{NewOrder, Order, Side};

/// The on-wire shape of an order.
///
/// `order_id` is null for orders that have not been persisted by the
/// submitter yet; the engine registers those itself before matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OrderMessage {
    #[serde(default)]
    pub order_id: Option<i64>,
    pub security_symbol: String,
    pub side: Side,
    #[validate(range(min = 1))]
    pub size: i64,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub all_or_none: bool,
    #[serde(default)]
    pub immediate_or_cancel: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub parent_order_id: Option<i64>,
    #[serde(default)]
    pub cancelled_dttm: Option<DateTime<Utc>>,
    #[serde(default)]
    pub create_dttm: Option<DateTime<Utc>>,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("price_not_positive"));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed order payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid order payload: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Serialize an order message for the queue.
pub fn encode(message: &OrderMessage) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(message)?)
}

/// Parse and validate a queue payload.
pub fn decode(payload: &[u8]) -> Result<OrderMessage, CodecError> {
    let message: OrderMessage = serde_json::from_slice(payload)?;
    message.validate()?;
    Ok(message)
}

impl From<&Order> for OrderMessage {
    fn from(order: &Order) -> Self {
        Self {
            order_id: Some(order.order_id),
            security_symbol: order.security_symbol.clone(),
            side: order.side,
            size: order.size,
            price: order.price,
            all_or_none: order.all_or_none,
            immediate_or_cancel: order.immediate_or_cancel,
            active: order.active,
            owner_id: order.owner_id,
            parent_order_id: order.parent_order_id,
            cancelled_dttm: order.cancelled_dttm,
            create_dttm: Some(order.create_dttm),
        }
    }
}

impl OrderMessage {
    /// Turn the message into an insertable row. Market orders are forced to
    /// immediate-or-cancel so that a price-less order can never rest.
    pub fn into_new_order(self, now: DateTime<Utc>) -> NewOrder {
        let market = self.price.is_none();
        NewOrder {
            security_symbol: self.security_symbol,
            side: self.side,
            size: self.size,
            price: self.price,
            all_or_none: self.all_or_none,
            immediate_or_cancel: self.immediate_or_cancel || market,
            active: false,
            parent_order_id: self.parent_order_id,
            owner_id: self.owner_id,
            cancelled_dttm: self.cancelled_dttm,
            create_dttm: self.create_dttm.unwrap_or(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn message() -> OrderMessage {
        OrderMessage {
            order_id: Some(42),
            security_symbol: "ACME".to_string(),
            side: Side::Bid,
            size: 120,
            price: Some(dec!(101)),
            all_or_none: false,
            immediate_or_cancel: false,
            active: false,
            owner_id: Some(7),
            parent_order_id: None,
            cancelled_dttm: None,
            create_dttm: Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()),
        }
    }

    #[test]
    fn test_round_trip() {
        let original = message();
        let bytes = encode(&original).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_nullable_fields_encode_as_explicit_nulls() {
        let bytes = encode(&OrderMessage {
            price: None,
            parent_order_id: None,
            cancelled_dttm: None,
            ..message()
        })
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"price\":null"));
        assert!(text.contains("\"parent_order_id\":null"));
        assert!(text.contains("\"cancelled_dttm\":null"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let payload = br#"{
            "security_symbol": "ACME", "side": "bid", "size": 10,
            "price": null, "stop_price": 5
        }"#;
        assert!(matches!(decode(payload), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_missing_flags_default_to_false() {
        let payload = br#"{"security_symbol": "ACME", "side": "ask", "size": 3, "price": "9.5"}"#;
        let decoded = decode(payload).unwrap();
        assert!(!decoded.all_or_none);
        assert!(!decoded.immediate_or_cancel);
        assert!(!decoded.active);
        assert_eq!(decoded.order_id, None);
        assert_eq!(decoded.price, Some(dec!(9.5)));
    }

    #[test]
    fn test_non_positive_size_rejected() {
        let payload = br#"{"security_symbol": "ACME", "side": "ask", "size": 0, "price": "1"}"#;
        assert!(matches!(decode(payload), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let payload = br#"{"security_symbol": "ACME", "side": "ask", "size": 5, "price": "-2"}"#;
        assert!(matches!(decode(payload), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_market_order_forced_ioc() {
        let mut msg = message();
        msg.price = None;
        msg.immediate_or_cancel = false;
        let row = msg.into_new_order(Utc::now());
        assert!(row.immediate_or_cancel);
        assert!(!row.active);
    }
}

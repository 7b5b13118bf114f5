use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// A settled trade between one ask and one bid.
///
/// `aggressor_order_id` is the order that triggered the match;
/// `resting_order_id` is the book-side order it consumed. A resting order is
/// consumed by at most one transaction, so `resting_order_id` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub transaction_id: i64,
    pub security_symbol: String,
    pub size: i64,
    pub price: Decimal,
    pub ask_id: i64,
    pub bid_id: i64,
    pub aggressor_order_id: i64,
    pub resting_order_id: i64,
    pub transact_dttm: DateTime<Utc>,
}

impl Transaction {
    /// Cash changing hands for this trade.
    pub fn cash_volume(&self) -> Decimal {
        self.price * Decimal::from(self.size)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction(id={}, symbol={}, size={}, price={}, ask={}, bid={})",
            self.transaction_id,
            self.security_symbol,
            self.size,
            self.price,
            self.ask_id,
            self.bid_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cash_volume() {
        let tr = Transaction {
            transaction_id: 1,
            security_symbol: "ACME".to_string(),
            size: 40,
            price: dec!(2.5),
            ask_id: 1,
            bid_id: 2,
            aggressor_order_id: 2,
            resting_order_id: 1,
            transact_dttm: Utc::now(),
        };
        assert_eq!(tr.cash_volume(), dec!(100));
    }
}

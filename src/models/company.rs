use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A listed security. `market_price` tracks the price of the latest
/// transaction on the company's stock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub symbol: String,
    pub name: String,
    pub initial_value: Decimal,
    pub initial_size: i64,
    pub founder_id: Option<i64>,
    pub market_price: Decimal,
    pub create_dttm: DateTime<Utc>,
}

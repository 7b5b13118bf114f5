use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Symbol of the cash balance row in the assets table.
pub const CASH_SYMBOL: &str = "_CASH";

/// One holding of one user: either cash (`_CASH`) or shares of a security.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub owner_id: i64,
    pub asset_symbol: String,
    pub asset_amount: Decimal,
}

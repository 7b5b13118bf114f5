//! Committer
//!
//! Persists everything one match cycle decided as a single unit of work:
//! order status changes, new sub-orders, transaction rows, asset transfers,
//! the market-price update, the immediate-or-cancel sell refund, and the
//! heartbeat log row. The caller owns the surrounding transaction; any
//! error here rolls the whole unit back and the engine loop retries or
//! dead-letters the message.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::debug;

use super::cycle::MatchResult;
use super::error::EngineError;
use crate::codec::OrderMessage;
use crate::db;
use crate::models::{Order, Side, CASH_SYMBOL, HEARTBEAT_FINISHED};

/// Identity stamped onto engine log rows.
#[derive(Debug, Clone)]
pub struct EngineIdentity {
    pub hostname: String,
    pub pid: i32,
}

impl EngineIdentity {
    pub fn detect() -> Self {
        Self {
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id() as i32,
        }
    }
}

/// Resolve the incoming message to a persisted order row.
///
/// The canonical path is an order the submitter already committed, looked
/// up by id. Payloads without a known id (direct publishes, test drivers)
/// are registered here, market orders normalized to immediate-or-cancel
/// before the row is written.
pub async fn register_incoming(
    conn: &mut PgConnection,
    message: &OrderMessage,
    now: DateTime<Utc>,
) -> Result<Order, EngineError> {
    if let Some(order_id) = message.order_id {
        if let Some(order) = db::fetch_order(&mut *conn, order_id).await? {
            return Ok(order);
        }
        debug!(order_id, "Order id from payload not in store; registering a fresh row");
    }

    let row = message.clone().into_new_order(now);
    Ok(db::insert_order(&mut *conn, &row).await?)
}

/// Reject orders that reference a company or user the store does not know.
pub async fn verify_references(
    conn: &mut PgConnection,
    incoming: &Order,
) -> Result<(), EngineError> {
    let listed: Option<(String,)> =
        sqlx::query_as("SELECT symbol FROM companies WHERE symbol = $1")
            .bind(&incoming.security_symbol)
            .fetch_optional(&mut *conn)
            .await?;
    if listed.is_none() {
        return Err(EngineError::Referential(format!(
            "no company listed under symbol {}",
            incoming.security_symbol
        )));
    }

    if let Some(owner_id) = incoming.owner_id {
        let owner: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM users WHERE user_id = $1")
            .bind(owner_id)
            .fetch_optional(&mut *conn)
            .await?;
        if owner.is_none() {
            return Err(EngineError::Referential(format!(
                "order owner {owner_id} does not exist"
            )));
        }
    }

    Ok(())
}

/// Apply a match result to the store. Runs inside the caller's transaction.
pub async fn apply(
    conn: &mut PgConnection,
    result: &MatchResult,
    identity: &EngineIdentity,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    persist_incoming(&mut *conn, &result.incoming).await?;

    if let Some(residual) = &result.spawned {
        db::insert_order(&mut *conn, residual).await?;
    }

    if !result.deactivated.is_empty() {
        let updated = sqlx::query("UPDATE orders SET active = FALSE WHERE order_id = ANY($1)")
            .bind(&result.deactivated)
            .execute(&mut *conn)
            .await?;
        if updated.rows_affected() != result.deactivated.len() as u64 {
            return Err(EngineError::Invariant(format!(
                "expected to deactivate {} resting orders, store updated {}",
                result.deactivated.len(),
                updated.rows_affected()
            )));
        }
    }

    if let Some(residual) = &result.reactivated {
        db::insert_order(&mut *conn, residual).await?;
    }

    for fill in &result.trades {
        if fill.size <= 0 {
            return Err(EngineError::Invariant(format!(
                "non-positive fill size {} between ask {} and bid {}",
                fill.size, fill.ask_id, fill.bid_id
            )));
        }

        let seller = fill.ask_owner_id.ok_or_else(|| {
            EngineError::Referential(format!("ask order {} has no owner", fill.ask_id))
        })?;
        let buyer = fill.bid_owner_id.ok_or_else(|| {
            EngineError::Referential(format!("bid order {} has no owner", fill.bid_id))
        })?;

        sqlx::query(
            r#"
            INSERT INTO transactions
                (security_symbol, size, price, ask_id, bid_id,
                 aggressor_order_id, resting_order_id, transact_dttm)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&fill.security_symbol)
        .bind(fill.size)
        .bind(fill.price)
        .bind(fill.ask_id)
        .bind(fill.bid_id)
        .bind(fill.aggressor_order_id)
        .bind(fill.resting_order_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let cash = fill.cash_volume();

        // Seller gains cash; the shares were debited at order submission.
        credit_asset(&mut *conn, seller, CASH_SYMBOL, cash).await?;

        // Buyer gains shares (creating the holding on first trade) and
        // pays cash.
        sqlx::query(
            r#"
            INSERT INTO assets (owner_id, asset_symbol, asset_amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id, asset_symbol)
            DO UPDATE SET asset_amount = assets.asset_amount + EXCLUDED.asset_amount
            "#,
        )
        .bind(buyer)
        .bind(&fill.security_symbol)
        .bind(Decimal::from(fill.size))
        .execute(&mut *conn)
        .await?;

        credit_asset(&mut *conn, buyer, CASH_SYMBOL, -cash).await?;

        let updated = sqlx::query("UPDATE companies SET market_price = $2 WHERE symbol = $1")
            .bind(&fill.security_symbol)
            .bind(fill.price)
            .execute(&mut *conn)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(EngineError::Referential(format!(
                "no company listed under symbol {}",
                fill.security_symbol
            )));
        }
    }

    // An immediate-or-cancel sell remainder returns its shares: they were
    // debited when the order was submitted and never traded.
    if let Some(remainder) = result.cancelled_remainder() {
        if remainder.side == Side::Ask {
            let owner = remainder.owner_id.ok_or_else(|| {
                EngineError::Referential("cancelled ask remainder has no owner".to_string())
            })?;
            debug!(
                owner,
                symbol = %remainder.security_symbol,
                size = remainder.size,
                "Refunding cancelled sell remainder"
            );
            credit_asset(
                &mut *conn,
                owner,
                &remainder.security_symbol,
                Decimal::from(remainder.size),
            )
            .await?;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO engine_logs (hostname, pid, log_dttm, log_msg, ext_ref, ext_ref_id)
        VALUES ($1, $2, $3, $4, 'orders', $5)
        "#,
    )
    .bind(&identity.hostname)
    .bind(identity.pid)
    .bind(now)
    .bind(HEARTBEAT_FINISHED)
    .bind(result.incoming.order_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn persist_incoming(conn: &mut PgConnection, incoming: &Order) -> Result<(), EngineError> {
    let updated = sqlx::query(
        "UPDATE orders SET active = $2, cancelled_dttm = $3 WHERE order_id = $1",
    )
    .bind(incoming.order_id)
    .bind(incoming.active)
    .bind(incoming.cancelled_dttm)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() != 1 {
        return Err(EngineError::Invariant(format!(
            "incoming order {} vanished mid-commit",
            incoming.order_id
        )));
    }
    Ok(())
}

/// Add `amount` (possibly negative) to an existing asset row. A missing row
/// is a referential failure: balances are created at submission or by the
/// buyer-side upsert, never here.
async fn credit_asset(
    conn: &mut PgConnection,
    owner_id: i64,
    symbol: &str,
    amount: Decimal,
) -> Result<(), EngineError> {
    let updated = sqlx::query(
        r#"
        UPDATE assets SET asset_amount = asset_amount + $3
        WHERE owner_id = $1 AND asset_symbol = $2
        "#,
    )
    .bind(owner_id)
    .bind(symbol)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(EngineError::Referential(format!(
            "user {owner_id} has no {symbol} asset row"
        )));
    }
    Ok(())
}

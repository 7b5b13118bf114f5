//! Order Submitter
//!
//! Intake discipline for new orders, the same one the trading front end
//! applies before the engine ever sees a message: sellers part with their
//! shares at submission time (the engine refunds a cancelled remainder),
//! market orders become immediate-or-cancel, and the row is committed
//! `active = false` before the payload is published.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use crate::codec::OrderMessage;
use crate::db;
use crate::models::{Order, Side};
use crate::queue::publisher::PublishError;
use crate::queue::OrderPublisher;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid order: {0}")]
    Invalid(String),

    #[error("no company listed under symbol {0}")]
    UnknownCompany(String),

    #[error("user {user_id} holds {held} {symbol}, cannot sell {requested}")]
    InsufficientAssets {
        user_id: i64,
        symbol: String,
        held: Decimal,
        requested: i64,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// A not-yet-submitted order as its owner describes it.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub security_symbol: String,
    pub side: Side,
    pub size: i64,
    /// `None` submits a market order, executed at whatever prices are
    /// available and cancelled for the rest.
    pub price: Option<Decimal>,
    pub all_or_none: bool,
    pub immediate_or_cancel: bool,
    pub owner_id: i64,
}

pub(crate) fn validate(draft: &OrderDraft) -> Result<(), SubmitError> {
    if draft.size < 1 {
        return Err(SubmitError::Invalid(format!(
            "order size must be at least 1, got {}",
            draft.size
        )));
    }
    if let Some(price) = draft.price {
        if price <= Decimal::ZERO {
            return Err(SubmitError::Invalid(format!(
                "order price must be positive, got {price}"
            )));
        }
    }
    Ok(())
}

/// Validate, persist, and publish one order.
///
/// The inventory debit and the order insert commit together; the publish
/// happens after, so a crash between the two leaves a dormant
/// `active = false` row but never an un-backed sell on the queue.
pub async fn submit(
    pool: &PgPool,
    publisher: &OrderPublisher,
    draft: OrderDraft,
) -> Result<Order, SubmitError> {
    validate(&draft)?;

    let mut tx = pool.begin().await?;

    let listed: Option<(String,)> = sqlx::query_as("SELECT symbol FROM companies WHERE symbol = $1")
        .bind(&draft.security_symbol)
        .fetch_optional(&mut *tx)
        .await?;
    if listed.is_none() {
        return Err(SubmitError::UnknownCompany(draft.security_symbol));
    }

    if draft.side == Side::Ask {
        let held: Option<(Decimal,)> = sqlx::query_as(
            r#"
            SELECT asset_amount FROM assets
            WHERE owner_id = $1 AND asset_symbol = $2
            FOR UPDATE
            "#,
        )
        .bind(draft.owner_id)
        .bind(&draft.security_symbol)
        .fetch_optional(&mut *tx)
        .await?;

        let held = held.map(|(amount,)| amount).unwrap_or(Decimal::ZERO);
        if held < Decimal::from(draft.size) {
            return Err(SubmitError::InsufficientAssets {
                user_id: draft.owner_id,
                symbol: draft.security_symbol,
                held,
                requested: draft.size,
            });
        }

        sqlx::query(
            r#"
            UPDATE assets SET asset_amount = asset_amount - $3
            WHERE owner_id = $1 AND asset_symbol = $2
            "#,
        )
        .bind(draft.owner_id)
        .bind(&draft.security_symbol)
        .bind(Decimal::from(draft.size))
        .execute(&mut *tx)
        .await?;
    }

    let message = OrderMessage {
        order_id: None,
        security_symbol: draft.security_symbol,
        side: draft.side,
        size: draft.size,
        price: draft.price,
        all_or_none: draft.all_or_none,
        immediate_or_cancel: draft.immediate_or_cancel,
        active: false,
        owner_id: Some(draft.owner_id),
        parent_order_id: None,
        cancelled_dttm: None,
        create_dttm: None,
    };
    let order = db::insert_order(&mut *tx, &message.into_new_order(Utc::now())).await?;

    tx.commit().await?;

    publisher.publish(&OrderMessage::from(&order)).await?;
    info!(%order, "Order submitted to queue");

    Ok(order)
}

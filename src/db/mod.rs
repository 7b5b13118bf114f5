//! Store Access
//!
//! Connection pooling and schema management for the PostgreSQL store. The
//! store is the single source of truth for users, assets, companies, orders,
//! transactions, and the engine activity log.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use crate::models::{NewOrder, Order};

/// Schema DDL, one statement per entry. Statements are idempotent so that
/// `initdb` can be re-run against an existing store.
const SCHEMA: &[&str] = &[
    r#"
    DO $$ BEGIN
        CREATE TYPE order_side AS ENUM ('ask', 'bid');
    EXCEPTION WHEN duplicate_object THEN NULL;
    END $$
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id         BIGSERIAL PRIMARY KEY,
        username        TEXT NOT NULL UNIQUE,
        password_hash   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assets (
        owner_id        BIGINT NOT NULL REFERENCES users (user_id) ON DELETE CASCADE,
        asset_symbol    TEXT NOT NULL,
        asset_amount    NUMERIC NOT NULL,
        PRIMARY KEY (owner_id, asset_symbol)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        symbol          TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        initial_value   NUMERIC NOT NULL,
        initial_size    BIGINT NOT NULL,
        founder_id      BIGINT REFERENCES users (user_id) ON DELETE SET NULL,
        market_price    NUMERIC NOT NULL,
        create_dttm     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_id            BIGSERIAL PRIMARY KEY,
        security_symbol     TEXT NOT NULL,
        side                order_side NOT NULL,
        size                BIGINT NOT NULL CHECK (size >= 1),
        price               NUMERIC CHECK (price IS NULL OR price > 0),
        all_or_none         BOOLEAN NOT NULL DEFAULT FALSE,
        immediate_or_cancel BOOLEAN NOT NULL DEFAULT FALSE,
        active              BOOLEAN NOT NULL DEFAULT FALSE,
        parent_order_id     BIGINT UNIQUE,
        owner_id            BIGINT REFERENCES users (user_id) ON DELETE CASCADE,
        cancelled_dttm      TIMESTAMPTZ,
        create_dttm         TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_orders_book
        ON orders (security_symbol, side) WHERE active
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        transaction_id      BIGSERIAL PRIMARY KEY,
        security_symbol     TEXT NOT NULL,
        size                BIGINT NOT NULL CHECK (size >= 1),
        price               NUMERIC NOT NULL CHECK (price > 0),
        ask_id              BIGINT NOT NULL REFERENCES orders (order_id) ON DELETE CASCADE,
        bid_id              BIGINT NOT NULL REFERENCES orders (order_id) ON DELETE CASCADE,
        aggressor_order_id  BIGINT NOT NULL REFERENCES orders (order_id) ON DELETE CASCADE,
        resting_order_id    BIGINT NOT NULL UNIQUE REFERENCES orders (order_id) ON DELETE CASCADE,
        transact_dttm       TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS engine_logs (
        log_id      BIGSERIAL PRIMARY KEY,
        hostname    TEXT NOT NULL,
        pid         INTEGER NOT NULL,
        log_dttm    TIMESTAMPTZ NOT NULL DEFAULT now(),
        log_msg     TEXT,
        ext_ref     TEXT,
        ext_ref_id  BIGINT
    )
    "#,
];

/// Handle to the relational store.
#[derive(Debug, Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connect to the store at the given URI.
    pub async fn connect(uri: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(uri)
            .await?;

        Ok(Self { pool })
    }

    /// Create the schema. Safe to run against an already-initialized store.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Store schema initialized");
        Ok(())
    }

    /// Round-trip check against the store.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Fetch one order row by id.
pub async fn fetch_order<'e, E>(executor: E, order_id: i64) -> Result<Option<Order>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, Order>(
        r#"
        SELECT order_id, security_symbol, side, size, price, all_or_none,
               immediate_or_cancel, active, parent_order_id, owner_id,
               cancelled_dttm, create_dttm
        FROM orders
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(executor)
    .await
}

/// Insert an order row, returning it with its assigned id.
pub async fn insert_order<'e, E>(executor: E, order: &NewOrder) -> Result<Order, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders
            (security_symbol, side, size, price, all_or_none, immediate_or_cancel,
             active, parent_order_id, owner_id, cancelled_dttm, create_dttm)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING order_id, security_symbol, side, size, price, all_or_none,
                  immediate_or_cancel, active, parent_order_id, owner_id,
                  cancelled_dttm, create_dttm
        "#,
    )
    .bind(&order.security_symbol)
    .bind(order.side)
    .bind(order.size)
    .bind(order.price)
    .bind(order.all_or_none)
    .bind(order.immediate_or_cancel)
    .bind(order.active)
    .bind(order.parent_order_id)
    .bind(order.owner_id)
    .bind(order.cancelled_dttm)
    .bind(order.create_dttm)
    .fetch_one(executor)
    .await
}

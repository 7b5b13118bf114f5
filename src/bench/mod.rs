//! Benchmark Harness
//!
//! End-to-end verification of a running engine: seed a fresh market with a
//! buyer, a seller, and a company; submit N paired (limit ask, market bid)
//! orders through the regular intake path; wait for the engine to drain the
//! queue; then check every fill and the resulting balances.
//!
//! The harness does not spawn engines. Point it at the same store and
//! broker as one or more `start_engine` processes.

pub mod verify;

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::db::Database;
use crate::models::{Asset, Company, Side, Transaction, User, CASH_SYMBOL, HEARTBEAT_FINISHED};
use crate::queue::{self, OrderPublisher};
use crate::submitter::{self, OrderDraft};
use self::verify::{AssetSnapshot, BenchmarkReport, RoundSpec};

/// Cash each side starts with, comfortably above any possible notional.
const SEED_CASH: i64 = 10_000_000;
/// Engine-log poll cadence while waiting for quiescence.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub rounds: u32,
    pub timeout: Duration,
}

pub async fn run(
    db: &Database,
    queue_config: &QueueConfig,
    config: BenchmarkConfig,
) -> anyhow::Result<BenchmarkReport> {
    let pool = &db.pool;
    let tag = Uuid::new_v4().simple().to_string();
    let symbol = format!("BENCH{}", &tag[..6].to_uppercase());

    // Seed the market.
    let buyer = add_user(pool, &format!("bench-buyer-{tag}")).await?;
    let seller = add_user(pool, &format!("bench-seller-{tag}")).await?;
    let company = add_company(pool, &symbol, seller.user_id).await?;
    inject_asset(pool, buyer.user_id, CASH_SYMBOL, Decimal::from(SEED_CASH)).await?;
    inject_asset(pool, seller.user_id, CASH_SYMBOL, Decimal::from(SEED_CASH)).await?;
    info!(
        symbol = %company.symbol,
        buyer = buyer.user_id,
        seller = seller.user_id,
        rounds = config.rounds,
        "Benchmark market seeded"
    );

    let connection = queue::connect(queue_config).await?;
    let publisher = OrderPublisher::new(&connection).await?;

    // Draw the whole order flow up front so verification has the script.
    let mut rng = rand::thread_rng();
    let rounds: Vec<RoundSpec> = (0..config.rounds)
        .map(|_| RoundSpec {
            size: rng.gen_range(1..=100),
            price: Decimal::from_f64(rng.gen_range(10.0..100.0))
                .unwrap_or(Decimal::from(10))
                .round_dp(2),
        })
        .collect();

    let started_at = Utc::now();
    let clock = Instant::now();

    for (i, round) in rounds.iter().enumerate() {
        // The seller's inventory appears just-in-time, exactly covering
        // the ask, so the final seller holding must come back to zero.
        inject_asset(pool, seller.user_id, &symbol, Decimal::from(round.size)).await?;

        submitter::submit(
            pool,
            &publisher,
            OrderDraft {
                security_symbol: symbol.clone(),
                side: Side::Ask,
                size: round.size,
                price: Some(round.price),
                all_or_none: false,
                immediate_or_cancel: false,
                owner_id: seller.user_id,
            },
        )
        .await
        .with_context(|| format!("submitting ask for round {i}"))?;

        submitter::submit(
            pool,
            &publisher,
            OrderDraft {
                security_symbol: symbol.clone(),
                side: Side::Bid,
                size: round.size,
                price: None,
                all_or_none: false,
                immediate_or_cancel: false,
                owner_id: buyer.user_id,
            },
        )
        .await
        .with_context(|| format!("submitting bid for round {i}"))?;
    }
    info!(rounds = config.rounds, "All orders submitted");

    // Two heartbeats per round: one for the ask, one for the bid.
    let expected_heartbeats = 2 * config.rounds as i64;
    await_quiescence(pool, started_at, expected_heartbeats, config.timeout).await?;
    let elapsed = clock.elapsed();

    let transactions = fetch_transactions(pool, &symbol).await?;
    let snapshot = AssetSnapshot {
        initial_cash: Decimal::from(SEED_CASH),
        buyer_cash: fetch_asset(pool, buyer.user_id, CASH_SYMBOL).await?,
        seller_cash: fetch_asset(pool, seller.user_id, CASH_SYMBOL).await?,
        buyer_shares: fetch_asset(pool, buyer.user_id, &symbol).await?,
        seller_shares: fetch_asset(pool, seller.user_id, &symbol).await?,
    };

    let report = verify::verify(&rounds, &transactions, &snapshot, elapsed);
    report.log();
    Ok(report)
}

async fn add_user(pool: &PgPool, username: &str) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash)
        VALUES ($1, $2)
        RETURNING user_id, username, password_hash
        "#,
    )
    .bind(username)
    .bind("<benchmark-no-login>")
    .fetch_one(pool)
    .await
}

async fn add_company(pool: &PgPool, symbol: &str, founder_id: i64) -> Result<Company, sqlx::Error> {
    sqlx::query_as::<_, Company>(
        r#"
        INSERT INTO companies
            (symbol, name, initial_value, initial_size, founder_id, market_price)
        VALUES ($1, $1, 10000, 10000, $2, 1)
        RETURNING symbol, name, initial_value, initial_size, founder_id,
                  market_price, create_dttm
        "#,
    )
    .bind(symbol)
    .bind(founder_id)
    .fetch_one(pool)
    .await
}

async fn inject_asset(
    pool: &PgPool,
    user_id: i64,
    symbol: &str,
    amount: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO assets (owner_id, asset_symbol, asset_amount)
        VALUES ($1, $2, $3)
        ON CONFLICT (owner_id, asset_symbol)
        DO UPDATE SET asset_amount = assets.asset_amount + EXCLUDED.asset_amount
        "#,
    )
    .bind(user_id)
    .bind(symbol)
    .bind(amount)
    .execute(pool)
    .await?;
    Ok(())
}

async fn fetch_asset(pool: &PgPool, user_id: i64, symbol: &str) -> Result<Decimal, sqlx::Error> {
    let asset: Option<Asset> = sqlx::query_as(
        "SELECT owner_id, asset_symbol, asset_amount FROM assets WHERE owner_id = $1 AND asset_symbol = $2",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    Ok(asset.map(|a| a.asset_amount).unwrap_or(Decimal::ZERO))
}

async fn fetch_transactions(pool: &PgPool, symbol: &str) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT transaction_id, security_symbol, size, price, ask_id, bid_id,
               aggressor_order_id, resting_order_id, transact_dttm
        FROM transactions
        WHERE security_symbol = $1
        ORDER BY transaction_id
        "#,
    )
    .bind(symbol)
    .fetch_all(pool)
    .await
}

/// Poll the engine log until the expected number of heartbeats since
/// `since` have landed.
async fn await_quiescence(
    pool: &PgPool,
    since: DateTime<Utc>,
    expected: i64,
    timeout: Duration,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM engine_logs WHERE log_msg = $1 AND log_dttm >= $2",
        )
        .bind(HEARTBEAT_FINISHED)
        .bind(since)
        .fetch_one(pool)
        .await?;

        if count >= expected {
            debug!(count, expected, "Engine quiescent");
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!(
                "engine not quiescent after {:?}: {count} of {expected} heartbeats; \
                 is a start_engine process running?",
                timeout
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

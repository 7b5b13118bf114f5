//! Matching Engine
//!
//! Ties the queue consumer to the match cycle and the committer. One
//! heartbeat = receive an order, register it, select candidates inside the
//! commit transaction, run the pure match cycle, and persist the result
//! atomically. The message is acknowledged only after the commit lands.
//!
//! ```text
//! OrderConsumer (prefetch=1)
//!   ↓ payload
//! codec::decode
//!   ↓ OrderMessage
//! heartbeat ──► register incoming ─► select candidates ─► cycle::run
//!   │                         (one REPEATABLE READ transaction)
//!   └──────────► committer::apply ─► commit ─► ack
//! ```

pub mod committer;
pub mod cycle;
pub mod error;
pub mod proposer;
pub mod selector;

pub use committer::EngineIdentity;
pub use error::EngineError;

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::codec::{self, OrderMessage};
use crate::config::{AppConfig, QueueConfig};
use crate::db::Database;
use crate::metrics;
use crate::queue::{self, Disposition, OrderConsumer};

/// Summary of one committed heartbeat.
#[derive(Debug, Clone)]
pub struct HeartbeatOutcome {
    pub order_id: i64,
    pub trade_count: usize,
    pub traded_size: i64,
}

pub struct MatchingEngine {
    db: Database,
    identity: EngineIdentity,
    dry_run: bool,
    max_attempts: u32,
}

impl MatchingEngine {
    pub fn new(db: Database, config: &AppConfig) -> Self {
        Self {
            db,
            identity: EngineIdentity::detect(),
            dry_run: config.dry_run,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Consume the order queue until interrupted.
    pub async fn run(&self, queue_config: &QueueConfig) -> anyhow::Result<()> {
        let connection = queue::connect(queue_config).await?;
        let consumer = OrderConsumer::new(&connection).await?;
        let consumer_tag = format!("engine-{}", Uuid::new_v4());

        info!(
            hostname = %self.identity.hostname,
            pid = self.identity.pid,
            dry_run = self.dry_run,
            "Matching engine started"
        );

        consumer
            .run(&consumer_tag, |payload| self.handle_message(payload))
            .await?;
        Ok(())
    }

    /// Decode and process one delivery, deciding its settlement.
    pub async fn handle_message(&self, payload: Vec<u8>) -> Disposition {
        let message = match codec::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "Dead-lettering malformed order payload");
                metrics::record_dead_letter("malformed");
                return Disposition::DeadLetter;
            }
        };
        metrics::record_order_consumed(&message.side.to_string());

        if self.dry_run {
            info!(
                order_id = ?message.order_id,
                symbol = %message.security_symbol,
                "Dry run: order received, match cycle skipped"
            );
            return Disposition::Ack;
        }

        match self.heartbeat(message).await {
            Ok(outcome) => {
                info!(
                    order_id = outcome.order_id,
                    trades = outcome.trade_count,
                    traded_size = outcome.traded_size,
                    "Heartbeat finished"
                );
                Disposition::Ack
            }
            Err(err) if err.requeue_on_exhaustion() => {
                error!(error = %err, "Store unavailable, requeueing order message");
                Disposition::Requeue
            }
            Err(err) => {
                error!(error = %err, "Dead-lettering order message");
                metrics::record_dead_letter(dead_letter_reason(&err));
                Disposition::DeadLetter
            }
        }
    }

    /// Process one order to completion, retrying recoverable store failures
    /// with a fresh snapshot each attempt.
    pub async fn heartbeat(&self, message: OrderMessage) -> Result<HeartbeatOutcome, EngineError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.run_heartbeat_once(&message).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    metrics::record_heartbeat_retry();
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Heartbeat failed, retrying with a fresh snapshot"
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_heartbeat_once(
        &self,
        message: &OrderMessage,
    ) -> Result<HeartbeatOutcome, EngineError> {
        let started = Instant::now();
        let now = Utc::now();

        let mut tx = self.db.pool.begin().await.map_err(EngineError::from)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let incoming = committer::register_incoming(&mut *tx, message, now).await?;
        committer::verify_references(&mut *tx, &incoming).await?;

        let resting =
            selector::fetch_resting(&mut *tx, &incoming.security_symbol, incoming.side.opposite())
                .await?;
        let candidates = selector::shortlist(&incoming, resting);

        let result = cycle::run(incoming, &candidates, now);

        committer::apply(&mut *tx, &result, &self.identity, now).await?;
        tx.commit().await.map_err(EngineError::from)?;

        metrics::record_heartbeat(started.elapsed().as_secs_f64());
        metrics::record_trades(result.trades.len() as u64);

        Ok(HeartbeatOutcome {
            order_id: result.incoming.order_id,
            trade_count: result.trades.len(),
            traded_size: result.traded_size(),
        })
    }
}

fn backoff(attempt: u32) -> Duration {
    let millis = 100u64.saturating_mul(1 << attempt.min(5));
    Duration::from_millis(millis.min(2_000))
}

fn dead_letter_reason(err: &EngineError) -> &'static str {
    match err {
        EngineError::Malformed(_) => "malformed",
        EngineError::Referential(_) => "referential",
        EngineError::Invariant(_) => "invariant",
        EngineError::Contention(_) => "contention",
        EngineError::Unavailable(_) | EngineError::Store(_) => "store",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(400));
        assert!(backoff(10) <= Duration::from_millis(2_000));
    }

    #[test]
    fn test_dead_letter_reasons() {
        assert_eq!(
            dead_letter_reason(&EngineError::Referential("x".to_string())),
            "referential"
        );
        assert_eq!(
            dead_letter_reason(&EngineError::Invariant("x".to_string())),
            "invariant"
        );
    }
}

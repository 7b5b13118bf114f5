//! Benchmark Verification
//!
//! Pure correctness checks over the rows a benchmark run produced. Every
//! submitted (ask, bid) pair must settle as exactly one transaction at the
//! ask's limit price, and the asset rows must conserve both cash and
//! shares.

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info};

use crate::models::Transaction;

/// One scripted round of the benchmark: a limit ask answered by a market
/// bid of the same size.
#[derive(Debug, Clone, Copy)]
pub struct RoundSpec {
    pub size: i64,
    pub price: Decimal,
}

/// Buyer/seller balances after the run.
#[derive(Debug, Clone)]
pub struct AssetSnapshot {
    pub initial_cash: Decimal,
    pub buyer_cash: Decimal,
    pub seller_cash: Decimal,
    pub buyer_shares: Decimal,
    pub seller_shares: Decimal,
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub rounds: usize,
    pub transactions: usize,
    pub elapsed: Duration,
    pub mismatches: Vec<String>,
}

impl BenchmarkReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn log(&self) {
        if self.passed() {
            info!(
                rounds = self.rounds,
                transactions = self.transactions,
                elapsed_secs = self.elapsed.as_secs_f64(),
                "Benchmark correctness verified"
            );
        } else {
            for mismatch in &self.mismatches {
                error!(mismatch = %mismatch, "Benchmark check failed");
            }
            error!(
                failures = self.mismatches.len(),
                rounds = self.rounds,
                "Benchmark FAILED"
            );
        }
    }
}

/// Check one run end to end.
pub fn verify(
    rounds: &[RoundSpec],
    transactions: &[Transaction],
    snapshot: &AssetSnapshot,
    elapsed: Duration,
) -> BenchmarkReport {
    let mut mismatches = Vec::new();
    mismatches.extend(verify_rounds(rounds, transactions));
    mismatches.extend(verify_conservation(rounds, snapshot));

    BenchmarkReport {
        rounds: rounds.len(),
        transactions: transactions.len(),
        elapsed,
        mismatches,
    }
}

/// Each round settles as exactly one transaction, in submission order, at
/// the round's size and ask price.
pub fn verify_rounds(rounds: &[RoundSpec], transactions: &[Transaction]) -> Vec<String> {
    let mut mismatches = Vec::new();

    if transactions.len() != rounds.len() {
        mismatches.push(format!(
            "expected {} transactions, found {}",
            rounds.len(),
            transactions.len()
        ));
    }

    for (i, (round, tr)) in rounds.iter().zip(transactions).enumerate() {
        if tr.size != round.size {
            mismatches.push(format!(
                "round {i}: {tr} size mismatches expected size {}",
                round.size
            ));
        }
        if tr.price != round.price {
            mismatches.push(format!(
                "round {i}: {tr} price mismatches expected price {}",
                round.price
            ));
        }
        if tr.ask_id == tr.bid_id {
            mismatches.push(format!("round {i}: {tr} trades an order against itself"));
        }
    }

    mismatches
}

/// Shares and cash must both be conserved: the buyer ends up with every
/// traded share, the seller with none, and the cash moved equals the
/// traded notional exactly.
pub fn verify_conservation(rounds: &[RoundSpec], snapshot: &AssetSnapshot) -> Vec<String> {
    let mut mismatches = Vec::new();

    let traded_shares: Decimal = rounds.iter().map(|r| Decimal::from(r.size)).sum();
    let notional: Decimal = rounds
        .iter()
        .map(|r| r.price * Decimal::from(r.size))
        .sum();

    if snapshot.buyer_shares != traded_shares {
        mismatches.push(format!(
            "buyer holds {} shares, expected {traded_shares}",
            snapshot.buyer_shares
        ));
    }
    if snapshot.seller_shares != Decimal::ZERO {
        mismatches.push(format!(
            "seller still holds {} shares, expected 0",
            snapshot.seller_shares
        ));
    }
    if snapshot.seller_cash != snapshot.initial_cash + notional {
        mismatches.push(format!(
            "seller cash is {}, expected {}",
            snapshot.seller_cash,
            snapshot.initial_cash + notional
        ));
    }
    if snapshot.buyer_cash != snapshot.initial_cash - notional {
        mismatches.push(format!(
            "buyer cash is {}, expected {}",
            snapshot.buyer_cash,
            snapshot.initial_cash - notional
        ));
    }

    let total = snapshot.buyer_cash + snapshot.seller_cash;
    let expected_total = snapshot.initial_cash * Decimal::TWO;
    if total != expected_total {
        mismatches.push(format!(
            "cash not conserved: buyer + seller = {total}, expected {expected_total}"
        ));
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn transaction(id: i64, size: i64, price: Decimal) -> Transaction {
        Transaction {
            transaction_id: id,
            security_symbol: "BENCH".to_string(),
            size,
            price,
            ask_id: id * 2 - 1,
            bid_id: id * 2,
            aggressor_order_id: id * 2,
            resting_order_id: id * 2 - 1,
            transact_dttm: Utc::now(),
        }
    }

    fn rounds() -> Vec<RoundSpec> {
        vec![
            RoundSpec {
                size: 40,
                price: dec!(12.5),
            },
            RoundSpec {
                size: 7,
                price: dec!(99.99),
            },
        ]
    }

    fn clean_snapshot() -> AssetSnapshot {
        // notional = 40 * 12.5 + 7 * 99.99 = 1199.93
        AssetSnapshot {
            initial_cash: dec!(10000),
            buyer_cash: dec!(8800.07),
            seller_cash: dec!(11199.93),
            buyer_shares: dec!(47),
            seller_shares: dec!(0),
        }
    }

    #[test]
    fn test_clean_run_passes() {
        let transactions = vec![transaction(1, 40, dec!(12.5)), transaction(2, 7, dec!(99.99))];
        let report = verify(
            &rounds(),
            &transactions,
            &clean_snapshot(),
            Duration::from_secs(1),
        );
        assert!(report.passed(), "unexpected mismatches: {:?}", report.mismatches);
    }

    #[test]
    fn test_missing_transaction_detected() {
        let transactions = vec![transaction(1, 40, dec!(12.5))];
        let mismatches = verify_rounds(&rounds(), &transactions);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].contains("expected 2 transactions"));
    }

    #[test]
    fn test_price_mismatch_detected() {
        let transactions = vec![transaction(1, 40, dec!(12.5)), transaction(2, 7, dec!(99.98))];
        let mismatches = verify_rounds(&rounds(), &transactions);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].contains("price mismatches"));
    }

    #[test]
    fn test_self_trade_detected() {
        let mut tr = transaction(1, 40, dec!(12.5));
        tr.bid_id = tr.ask_id;
        let mismatches = verify_rounds(&rounds()[..1], &[tr]);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].contains("against itself"));
    }

    #[test]
    fn test_leaked_shares_detected() {
        let snapshot = AssetSnapshot {
            seller_shares: dec!(3),
            ..clean_snapshot()
        };
        let mismatches = verify_conservation(&rounds(), &snapshot);
        assert!(mismatches.iter().any(|m| m.contains("seller still holds")));
    }

    #[test]
    fn test_cash_leak_detected() {
        let snapshot = AssetSnapshot {
            buyer_cash: dec!(8800.08),
            ..clean_snapshot()
        };
        let mismatches = verify_conservation(&rounds(), &snapshot);
        assert!(!mismatches.is_empty());
    }
}

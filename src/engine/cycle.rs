//! Match Cycle
//!
//! One pass of the incoming order over its candidate list. The cycle is a
//! pure function: it reads the incoming order and the pre-selected
//! candidates, and returns the full set of store mutations as a
//! [`MatchResult`] without touching the store itself. The committer applies
//! the result in a single transaction.

use chrono::{DateTime, Utc};

use super::proposer::{self, LiveOrder, TradeFill};
use crate::models::{NewOrder, Order, Side};

/// Everything one heartbeat decided, pending persistence.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The incoming order with its persistent-field mutations (`active`,
    /// `cancelled_dttm`) already decided.
    pub incoming: Order,
    /// Sub-order carrying the incoming order's unfilled remainder after a
    /// partial fill; `None` when the incoming either rests whole, was fully
    /// filled, or was reset by all-or-none.
    pub spawned: Option<NewOrder>,
    /// Resting orders consumed this cycle; their `active` flag drops.
    pub deactivated: Vec<i64>,
    /// Sub-order carrying a partially filled candidate's remainder. Under
    /// price-time iteration only the last matched candidate can be partial,
    /// so at most one exists per cycle.
    pub reactivated: Option<NewOrder>,
    /// Trades produced, in match order.
    pub trades: Vec<TradeFill>,
}

/// An immediate-or-cancel remainder the committer may need to refund.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelledRemainder {
    pub side: Side,
    pub security_symbol: String,
    pub owner_id: Option<i64>,
    pub size: i64,
}

impl MatchResult {
    /// Total quantity traded by this cycle.
    pub fn traded_size(&self) -> i64 {
        self.trades.iter().map(|fill| fill.size).sum()
    }

    /// The un-traded remainder cancelled by immediate-or-cancel, if any.
    /// The remainder is the spawned sub-order after a partial fill, or the
    /// incoming order itself when nothing traded.
    pub fn cancelled_remainder(&self) -> Option<CancelledRemainder> {
        if let Some(sub) = &self.spawned {
            sub.cancelled_dttm.map(|_| CancelledRemainder {
                side: sub.side,
                security_symbol: sub.security_symbol.clone(),
                owner_id: sub.owner_id,
                size: sub.size,
            })
        } else {
            self.incoming.cancelled_dttm.map(|_| CancelledRemainder {
                side: self.incoming.side,
                security_symbol: self.incoming.security_symbol.clone(),
                owner_id: self.incoming.owner_id,
                size: self.incoming.size,
            })
        }
    }
}

/// Run one match cycle.
///
/// `candidates` must already be shortlisted and ordered by price-time
/// priority (see [`super::selector::shortlist`]); the cycle walks them
/// front to back until the incoming order is exhausted.
pub fn run(mut incoming: Order, candidates: &[Order], now: DateTime<Utc>) -> MatchResult {
    let mut remaining = incoming.size;
    let mut trades: Vec<TradeFill> = Vec::new();
    let mut deactivated: Vec<i64> = Vec::new();
    let mut reactivated: Option<NewOrder> = None;

    for candidate in candidates {
        if remaining <= 0 {
            break;
        }

        let mut live_candidate = LiveOrder::new(candidate);
        let live_incoming = LiveOrder {
            order: &incoming,
            remaining,
        };

        if let Some(fill) = proposer::propose(&live_incoming, &live_candidate) {
            remaining -= fill.size;
            live_candidate.remaining -= fill.size;
            deactivated.push(candidate.order_id);

            if live_candidate.remaining > 0 {
                let mut residual = candidate.suborder(live_candidate.remaining, now);
                residual.active = true;
                reactivated = Some(residual);
            }

            trades.push(fill);
        }
    }

    // Decide the fate of the incoming order's remainder.
    let mut spawned: Option<NewOrder> = None;
    if remaining == incoming.size {
        // Nothing traded; the incoming order rests whole.
        incoming.active = true;
    } else if remaining > 0 {
        let mut residual = incoming.suborder(remaining, now);
        residual.active = true;
        spawned = Some(residual);
        incoming.active = false;
    } else {
        // Fully filled.
        incoming.active = false;
    }

    // All-or-none on the incoming side: a partial fill voids every effect
    // of the cycle and the incoming order rests whole, untouched.
    if incoming.all_or_none && remaining > 0 {
        trades.clear();
        deactivated.clear();
        reactivated = None;
        spawned = None;
        incoming.active = true;
    }

    // Immediate-or-cancel: whatever would have rested is cancelled instead.
    if incoming.immediate_or_cancel && remaining > 0 {
        if let Some(residual) = spawned.as_mut() {
            residual.cancelled_dttm = Some(now);
            residual.active = false;
        } else {
            incoming.cancelled_dttm = Some(now);
            incoming.active = false;
        }
    }

    MatchResult {
        incoming,
        spawned,
        deactivated,
        reactivated,
        trades,
    }
}

//! Trade Proposer
//!
//! Pure pairing of the incoming order against one candidate. The caller
//! guarantees the pair is on opposite sides with compatible prices; this
//! module decides whether a trade happens and at what size.

use rust_decimal::Decimal;

use crate::models::{Order, Side};

/// An order mid-cycle, carrying the quantity still up for matching. The
/// remainder is never persisted; it exists only while a cycle runs.
#[derive(Debug, Clone, Copy)]
pub struct LiveOrder<'a> {
    pub order: &'a Order,
    pub remaining: i64,
}

impl<'a> LiveOrder<'a> {
    pub fn new(order: &'a Order) -> Self {
        Self {
            order,
            remaining: order.size,
        }
    }
}

/// One proposed trade, not yet persisted. Owner ids ride along so the
/// committer can move assets without re-reading the order rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFill {
    pub security_symbol: String,
    pub size: i64,
    pub price: Decimal,
    pub ask_id: i64,
    pub bid_id: i64,
    pub ask_owner_id: Option<i64>,
    pub bid_owner_id: Option<i64>,
    pub aggressor_order_id: i64,
    pub resting_order_id: i64,
}

impl TradeFill {
    pub fn cash_volume(&self) -> Decimal {
        self.price * Decimal::from(self.size)
    }
}

/// Propose a trade between the incoming order and a candidate.
///
/// The trade executes at the candidate's limit price: the candidate was in
/// the book first, so price improvement accrues to the aggressor. A
/// candidate marked all-or-none trades only if it can be consumed whole;
/// the incoming side's all-or-none is enforced after the full cycle, not
/// here.
pub fn propose(incoming: &LiveOrder<'_>, candidate: &LiveOrder<'_>) -> Option<TradeFill> {
    if incoming.remaining <= 0 || candidate.remaining <= 0 {
        return None;
    }

    let (ask, bid) = match incoming.order.side {
        Side::Ask => (incoming, candidate),
        Side::Bid => (candidate, incoming),
    };
    let size = ask.remaining.min(bid.remaining);

    if candidate.order.all_or_none && size < candidate.remaining {
        return None;
    }

    let price = candidate.order.price?;

    Some(TradeFill {
        security_symbol: candidate.order.security_symbol.clone(),
        size,
        price,
        ask_id: ask.order.order_id,
        bid_id: bid.order.order_id,
        ask_owner_id: ask.order.owner_id,
        bid_owner_id: bid.order.owner_id,
        aggressor_order_id: incoming.order.order_id,
        resting_order_id: candidate.order.order_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(id: i64, side: Side, size: i64, price: Option<Decimal>) -> Order {
        Order {
            order_id: id,
            security_symbol: "ACME".to_string(),
            side,
            size,
            price,
            all_or_none: false,
            immediate_or_cancel: false,
            active: true,
            parent_order_id: None,
            owner_id: Some(id * 10),
            cancelled_dttm: None,
            create_dttm: Utc::now(),
        }
    }

    #[test]
    fn test_trades_at_resting_price() {
        let resting = order(1, Side::Ask, 100, Some(dec!(99)));
        let incoming = order(2, Side::Bid, 120, Some(dec!(101)));

        let fill = propose(&LiveOrder::new(&incoming), &LiveOrder::new(&resting)).unwrap();
        assert_eq!(fill.size, 100);
        assert_eq!(fill.price, dec!(99));
        assert_eq!(fill.ask_id, 1);
        assert_eq!(fill.bid_id, 2);
        assert_eq!(fill.aggressor_order_id, 2);
        assert_eq!(fill.resting_order_id, 1);
        assert_eq!(fill.ask_owner_id, Some(10));
        assert_eq!(fill.bid_owner_id, Some(20));
    }

    #[test]
    fn test_size_is_min_of_remainders() {
        let resting = order(1, Side::Bid, 300, Some(dec!(50)));
        let incoming = order(2, Side::Ask, 80, Some(dec!(49)));

        let fill = propose(&LiveOrder::new(&incoming), &LiveOrder::new(&resting)).unwrap();
        assert_eq!(fill.size, 80);
        assert_eq!(fill.ask_id, 2);
        assert_eq!(fill.bid_id, 1);
    }

    #[test]
    fn test_exhausted_remainder_yields_no_trade() {
        let resting = order(1, Side::Ask, 100, Some(dec!(10)));
        let incoming = order(2, Side::Bid, 100, Some(dec!(10)));

        let spent = LiveOrder {
            order: &incoming,
            remaining: 0,
        };
        assert!(propose(&spent, &LiveOrder::new(&resting)).is_none());

        let drained = LiveOrder {
            order: &resting,
            remaining: 0,
        };
        assert!(propose(&LiveOrder::new(&incoming), &drained).is_none());
    }

    #[test]
    fn test_aon_candidate_blocks_partial_fill() {
        let mut resting = order(1, Side::Ask, 100, Some(dec!(10)));
        resting.all_or_none = true;
        let incoming = order(2, Side::Bid, 60, Some(dec!(12)));

        assert!(propose(&LiveOrder::new(&incoming), &LiveOrder::new(&resting)).is_none());
    }

    #[test]
    fn test_aon_candidate_trades_when_consumed_whole() {
        let mut resting = order(1, Side::Ask, 100, Some(dec!(10)));
        resting.all_or_none = true;
        let incoming = order(2, Side::Bid, 150, Some(dec!(12)));

        let fill = propose(&LiveOrder::new(&incoming), &LiveOrder::new(&resting)).unwrap();
        assert_eq!(fill.size, 100);
    }

    #[test]
    fn test_aon_incoming_is_ignored_here() {
        let resting = order(1, Side::Ask, 100, Some(dec!(10)));
        let mut incoming = order(2, Side::Bid, 150, Some(dec!(12)));
        incoming.all_or_none = true;

        // The incoming side's all-or-none is resolved after the loop; the
        // proposer still emits the partial fill.
        let fill = propose(&LiveOrder::new(&incoming), &LiveOrder::new(&resting)).unwrap();
        assert_eq!(fill.size, 100);
    }
}

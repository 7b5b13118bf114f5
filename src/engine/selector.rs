//! Candidate Selector
//!
//! Finds the resting orders an incoming order may trade against. The fetch
//! runs inside the committer's transaction and locks the candidate rows, so
//! two engine processes racing on the same symbol serialize at the store.
//! Filtering and ordering happen in memory where they are pure and
//! testable.

use sqlx::PgConnection;

use crate::models::{Order, Side};

/// Fetch all active resting orders on `side` for `symbol`, locked for the
/// duration of the surrounding transaction.
pub async fn fetch_resting(
    conn: &mut PgConnection,
    symbol: &str,
    side: Side,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT order_id, security_symbol, side, size, price, all_or_none,
               immediate_or_cancel, active, parent_order_id, owner_id,
               cancelled_dttm, create_dttm
        FROM orders
        WHERE security_symbol = $1 AND side = $2 AND active
        FOR UPDATE
        "#,
    )
    .bind(symbol)
    .bind(side)
    .fetch_all(conn)
    .await
}

/// Narrow the fetched book down to the orders the incoming order may match,
/// in match priority order.
///
/// Rules:
/// - never match two orders of the same owner (when the incoming order has
///   an owner);
/// - a candidate must carry a limit price;
/// - when the incoming order has a limit, the candidate's price must be
///   equal or better (bids match asks at or below the limit, asks match
///   bids at or above it);
/// - priority is best price first, ties broken by oldest `create_dttm`,
///   then lowest `order_id`.
pub fn shortlist(incoming: &Order, mut resting: Vec<Order>) -> Vec<Order> {
    resting.retain(|candidate| {
        candidate.price.is_some()
            && (incoming.owner_id.is_none() || candidate.owner_id != incoming.owner_id)
            && price_compatible(incoming, candidate)
    });

    match incoming.side {
        Side::Bid => resting.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then(a.create_dttm.cmp(&b.create_dttm))
                .then(a.order_id.cmp(&b.order_id))
        }),
        Side::Ask => resting.sort_by(|a, b| {
            b.price
                .cmp(&a.price)
                .then(a.create_dttm.cmp(&b.create_dttm))
                .then(a.order_id.cmp(&b.order_id))
        }),
    }

    resting
}

fn price_compatible(incoming: &Order, candidate: &Order) -> bool {
    let Some(limit) = incoming.price else {
        // Market order: any priced candidate is acceptable.
        return true;
    };
    match (incoming.side, candidate.price) {
        (Side::Bid, Some(price)) => price <= limit,
        (Side::Ask, Some(price)) => price >= limit,
        (_, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(id: i64, side: Side, price: Option<Decimal>, age_secs: i64) -> Order {
        Order {
            order_id: id,
            security_symbol: "X".to_string(),
            side,
            size: 100,
            price,
            all_or_none: false,
            immediate_or_cancel: false,
            active: true,
            parent_order_id: None,
            owner_id: Some(id),
            cancelled_dttm: None,
            create_dttm: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_bid_gets_cheapest_asks_first() {
        let incoming = order(100, Side::Bid, Some(dec!(10)), 0);
        let book = vec![
            order(1, Side::Ask, Some(dec!(9)), 0),
            order(2, Side::Ask, Some(dec!(7)), 0),
            order(3, Side::Ask, Some(dec!(8)), 0),
        ];
        let ids: Vec<i64> = shortlist(&incoming, book).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_ask_gets_richest_bids_first() {
        let incoming = order(100, Side::Ask, Some(dec!(5)), 0);
        let book = vec![
            order(1, Side::Bid, Some(dec!(6)), 0),
            order(2, Side::Bid, Some(dec!(9)), 0),
            order(3, Side::Bid, Some(dec!(7)), 0),
        ];
        let ids: Vec<i64> = shortlist(&incoming, book).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_price_window_filters_incompatible_candidates() {
        let incoming = order(100, Side::Bid, Some(dec!(10)), 0);
        let book = vec![
            order(1, Side::Ask, Some(dec!(10)), 0),
            order(2, Side::Ask, Some(dec!(11)), 0),
        ];
        let ids: Vec<i64> = shortlist(&incoming, book).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_market_order_takes_whole_book() {
        let incoming = order(100, Side::Bid, None, 0);
        let book = vec![
            order(1, Side::Ask, Some(dec!(1)), 0),
            order(2, Side::Ask, Some(dec!(1000)), 0),
        ];
        assert_eq!(shortlist(&incoming, book).len(), 2);
    }

    #[test]
    fn test_same_owner_excluded() {
        let mut incoming = order(100, Side::Bid, Some(dec!(10)), 0);
        incoming.owner_id = Some(1);
        let book = vec![
            order(1, Side::Ask, Some(dec!(9)), 0),
            order(2, Side::Ask, Some(dec!(9)), 0),
        ];
        let ids: Vec<i64> = shortlist(&incoming, book).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_ownerless_incoming_matches_anyone() {
        let mut incoming = order(100, Side::Bid, Some(dec!(10)), 0);
        incoming.owner_id = None;
        let book = vec![order(1, Side::Ask, Some(dec!(9)), 0)];
        assert_eq!(shortlist(&incoming, book).len(), 1);
    }

    #[test]
    fn test_equal_price_ties_break_oldest_first() {
        let incoming = order(100, Side::Bid, Some(dec!(10)), 0);
        let book = vec![
            order(1, Side::Ask, Some(dec!(9)), 5),
            order(2, Side::Ask, Some(dec!(9)), 60),
            order(3, Side::Ask, Some(dec!(9)), 30),
        ];
        let ids: Vec<i64> = shortlist(&incoming, book).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_unpriced_candidates_dropped() {
        let incoming = order(100, Side::Bid, None, 0);
        let book = vec![
            order(1, Side::Ask, None, 0),
            order(2, Side::Ask, Some(dec!(2)), 0),
        ];
        let ids: Vec<i64> = shortlist(&incoming, book).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![2]);
    }
}

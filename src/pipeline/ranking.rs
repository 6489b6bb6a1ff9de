use std::cmp::Ordering;

use crate::pipeline::status::market_status;
use crate::types::{MarketStatus, MergedMarket, OrderBy, OrderDirection};

/// Sort in place. Without `order_by` the default cascade applies and yields a
/// total order; with it, markets compare on that single field with `direction`
/// and ties keep their input order.
pub fn sort_markets(
    markets: &mut [MergedMarket],
    order_by: Option<OrderBy>,
    direction: OrderDirection,
    now: u64,
) {
    match order_by {
        None => markets.sort_by(|a, b| default_cmp(a, b, now)),
        Some(field) => markets.sort_by(|a, b| {
            let ord = field_value(a, field).total_cmp(&field_value(b, field));
            if direction.sign() < 0 {
                ord.reverse()
            } else {
                ord
            }
        }),
    }
}

/// Default cascade; the first rule that discriminates decides.
///
/// Each rule reads one key per market. A key that cannot be evaluated takes the
/// non-demoting value, so the cascade stays lexicographic and transitive.
pub fn default_cmp(a: &MergedMarket, b: &MergedMarket, now: u64) -> Ordering {
    is_closed(a, now)
        .cmp(&is_closed(b, now))
        .then_with(|| is_worthless(a).cmp(&is_worthless(b)))
        .then_with(|| {
            a.verification.status.priority().cmp(&b.verification.status.priority())
        })
        .then_with(|| b.has_liquidity.cmp(&a.has_liquidity))
        .then_with(|| b.liquidity_usd.total_cmp(&a.liquidity_usd))
        .then_with(|| (a.chain_id, &a.id).cmp(&(b.chain_id, &b.id)))
}

fn field_value(m: &MergedMarket, field: OrderBy) -> f64 {
    match field {
        OrderBy::LiquidityUsd => m.liquidity_usd,
        OrderBy::CreationDate => m.block_timestamp as f64,
        OrderBy::OpeningTs => m.opening_ts as f64,
    }
}

fn is_closed(m: &MergedMarket, now: u64) -> bool {
    market_status(m, now) == Some(MarketStatus::Closed)
}

/// Parent resolved and paid nothing to the outcome this market is collateralised by.
/// An out-of-range parent outcome counts as not worthless.
fn is_worthless(m: &MergedMarket) -> bool {
    let parent = &m.parent_market;
    if parent.is_none() || !parent.payout_reported {
        return false;
    }
    usize::try_from(m.parent_outcome)
        .ok()
        .and_then(|idx| parent.payout_numerators.get(idx))
        .map_or(false, |n| n.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{closed_entity, enrichment, sample_entity, verification, worthless_child_entity};
    use crate::pipeline::merge;
    use crate::types::VerificationStatus;

    const NOW: u64 = 5_000;

    fn market(id: &str, liquidity: f64, status: VerificationStatus) -> MergedMarket {
        merge(100, &sample_entity(id), Some(&enrichment(liquidity)), Some(&verification(status)))
            .unwrap()
    }

    fn ids(markets: &[MergedMarket]) -> Vec<String> {
        markets.iter().map(|m| format!("{}:{}", m.chain_id, m.id)).collect()
    }

    fn fixtures() -> Vec<MergedMarket> {
        let closed = merge(
            100,
            &closed_entity("0x05"),
            Some(&enrichment(9_000.0)),
            Some(&verification(VerificationStatus::Verified)),
        )
        .unwrap();

        let worthless = merge(
            100,
            &worthless_child_entity("0x06"),
            Some(&enrichment(8_000.0)),
            Some(&verification(VerificationStatus::Verified)),
        )
        .unwrap();

        let mut no_questions = market("0x08", 10.0, VerificationStatus::Verifying);
        no_questions.questions.clear();

        let mut same_id_other_chain = market("0x01", 100.0, VerificationStatus::Verified);
        same_id_other_chain.chain_id = 1;

        vec![
            market("0x01", 100.0, VerificationStatus::Verified),
            market("0x02", 100.0, VerificationStatus::Verified),
            market("0x03", 0.0, VerificationStatus::Verified),
            market("0x04", 700.0, VerificationStatus::Challenged),
            closed,
            worthless,
            market("0x07", 300.0, VerificationStatus::NotVerified),
            no_questions,
            same_id_other_chain,
            market("0x09", 1_000.0, VerificationStatus::Verifying),
        ]
    }

    #[test]
    fn default_cascade_order() {
        let mut markets = fixtures();
        sort_markets(&mut markets, None, OrderDirection::Desc, NOW);
        assert_eq!(
            ids(&markets),
            vec![
                "1:0x01", "100:0x01", "100:0x02", "100:0x03", "100:0x09", "100:0x08",
                "100:0x04", "100:0x07", "100:0x06", "100:0x05",
            ]
        );
    }

    #[test]
    fn default_order_is_total_across_permutations() {
        let mut reference = fixtures();
        sort_markets(&mut reference, None, OrderDirection::Desc, NOW);
        let reference = serde_json::to_string(&reference).unwrap();

        let base = fixtures();
        for shift in 0..base.len() {
            let mut shuffled = base.clone();
            shuffled.rotate_left(shift);
            if shift % 2 == 1 {
                shuffled.reverse();
            }
            sort_markets(&mut shuffled, None, OrderDirection::Desc, NOW);
            assert_eq!(serde_json::to_string(&shuffled).unwrap(), reference, "shift {shift}");
        }
    }

    #[test]
    fn distinct_markets_never_compare_equal() {
        let markets = fixtures();
        for (i, a) in markets.iter().enumerate() {
            for (j, b) in markets.iter().enumerate() {
                let ord = default_cmp(a, b, NOW);
                assert_eq!(ord == Ordering::Equal, i == j, "{} vs {}", a.id, b.id);
                assert_eq!(ord, default_cmp(b, a, NOW).reverse());
            }
        }
    }

    #[test]
    fn closed_demoted_before_liquidity() {
        let open_dry = market("0x0a", 0.0, VerificationStatus::NotVerified);
        let mut closed_rich = merge(100, &closed_entity("0x0b"), Some(&enrichment(1e6)), None).unwrap();
        closed_rich.verification = verification(VerificationStatus::Verified);

        assert_eq!(default_cmp(&open_dry, &closed_rich, NOW), Ordering::Less);
    }

    #[test]
    fn explicit_order_by_uses_direction_and_is_stable() {
        let mut a = market("0x0a", 10.0, VerificationStatus::NotVerified);
        let mut b = market("0x0b", 30.0, VerificationStatus::Verified);
        let mut c = market("0x0c", 10.0, VerificationStatus::Verified);
        a.block_timestamp = 3;
        b.block_timestamp = 1;
        c.block_timestamp = 2;

        let mut desc = vec![a.clone(), b.clone(), c.clone()];
        sort_markets(&mut desc, Some(OrderBy::LiquidityUsd), OrderDirection::Desc, NOW);
        assert_eq!(ids(&desc), vec!["100:0x0b", "100:0x0a", "100:0x0c"]);

        let mut asc = vec![a.clone(), b.clone(), c.clone()];
        sort_markets(&mut asc, Some(OrderBy::LiquidityUsd), OrderDirection::Asc, NOW);
        assert_eq!(ids(&asc), vec!["100:0x0a", "100:0x0c", "100:0x0b"]);

        let mut created = vec![a, b, c];
        sort_markets(&mut created, Some(OrderBy::CreationDate), OrderDirection::Asc, NOW);
        assert_eq!(ids(&created), vec!["100:0x0b", "100:0x0c", "100:0x0a"]);
    }

    #[test]
    fn out_of_range_parent_outcome_falls_through() {
        let mut odd = merge(100, &worthless_child_entity("0x0a"), None, None).unwrap();
        odd.parent_outcome = 9;
        let plain = merge(100, &sample_entity("0x0b"), None, None).unwrap();

        assert!(!is_worthless(&odd));
        assert_eq!(default_cmp(&odd, &plain, NOW), Ordering::Less);
    }
}

use crate::types::{MarketStatus, MergedMarket};

/// Lifecycle status at `now` (unix seconds).
///
/// `None` for an unresolved market without questions, which carries nothing to
/// derive a status from.
pub fn market_status(market: &MergedMarket, now: u64) -> Option<MarketStatus> {
    if market.payout_reported {
        return Some(MarketStatus::Closed);
    }
    if now < market.opening_ts {
        return Some(MarketStatus::NotOpen);
    }
    if market.questions.is_empty() {
        return None;
    }

    let qs = &market.questions;
    let status = if qs.iter().any(|q| q.finalize_ts == 0) {
        MarketStatus::Open
    } else if qs.iter().any(|q| q.is_pending_arbitration) {
        MarketStatus::InDispute
    } else if qs.iter().any(|q| q.finalize_ts > now) {
        MarketStatus::AnswerNotFinal
    } else {
        MarketStatus::PendingExecution
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{closed_entity, sample_entity};
    use crate::pipeline::merge;

    #[test]
    fn lifecycle_progression() {
        let mut m = merge(100, &sample_entity("0xa"), None, None).unwrap();
        assert_eq!(market_status(&m, 500), Some(MarketStatus::NotOpen));
        assert_eq!(market_status(&m, 1500), Some(MarketStatus::Open));

        m.questions[0].finalize_ts = 3000;
        assert_eq!(market_status(&m, 2000), Some(MarketStatus::AnswerNotFinal));
        assert_eq!(market_status(&m, 3000), Some(MarketStatus::PendingExecution));

        m.questions[0].is_pending_arbitration = true;
        assert_eq!(market_status(&m, 2000), Some(MarketStatus::InDispute));
    }

    #[test]
    fn payout_closes_regardless_of_questions() {
        let m = merge(100, &closed_entity("0xb"), None, None).unwrap();
        assert_eq!(market_status(&m, 0), Some(MarketStatus::Closed));
    }

    #[test]
    fn no_questions_is_underivable() {
        let mut m = merge(100, &sample_entity("0xc"), None, None).unwrap();
        m.questions.clear();
        assert_eq!(market_status(&m, 5000), None);
    }
}

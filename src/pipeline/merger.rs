use alloy_primitives::U256;

use crate::config::DEFAULT_CATEGORY;
use crate::error::{AppError, Result};
use crate::types::{
    parse_u256, ChainId, EnrichmentRecord, MarketIndexEntity, MergedMarket, ParentMarket,
    Question, RawParentMarket, RawQuestion, VerificationRecord,
};

/// Combine one index entity with its enrichment and verification records.
///
/// Pure. Absent enrichment yields zero liquidity, no odds and the default
/// category; absent verification yields `not_verified`. Any integer field that
/// does not parse exactly fails this market only.
pub fn merge(
    chain_id: ChainId,
    entity: &MarketIndexEntity,
    enrichment: Option<&EnrichmentRecord>,
    verification: Option<&VerificationRecord>,
) -> Result<MergedMarket> {
    let id = entity.id.trim().to_lowercase();
    if id.is_empty() {
        return Err(AppError::malformed(&entity.id, "empty id"));
    }
    let num = |field: &str, raw: &str| parse_u64(&id, field, raw);
    let big = |field: &str, raw: &str| parse_big(&id, field, raw);

    let questions = entity
        .questions
        .iter()
        .map(|q| to_question(&id, &q.question))
        .collect::<Result<Vec<_>>>()?;

    let parent_market = match &entity.parent_market {
        Some(p) => to_parent(&id, p)?,
        None => ParentMarket::none(),
    };

    let payout_numerators = entity
        .payout_numerators
        .iter()
        .map(|n| big("payoutNumerators", n))
        .collect::<Result<Vec<_>>>()?;

    let (liquidity_usd, incentive, has_liquidity, categories, odds, pool_balance, url) =
        match enrichment {
            Some(e) => (
                e.liquidity_usd,
                e.incentive,
                e.has_liquidity(),
                e.categories.clone(),
                e.odds.clone(),
                e.pool_balances.clone(),
                e.url.clone(),
            ),
            None => (
                0.0,
                0.0,
                false,
                vec![DEFAULT_CATEGORY.to_string()],
                Vec::new(),
                Vec::new(),
                String::new(),
            ),
        };

    Ok(MergedMarket {
        id: id.clone(),
        chain_id,
        kind: entity.kind,
        market_name: entity.market_name.clone(),
        outcomes: entity.outcomes.clone(),
        wrapped_tokens: entity.wrapped_tokens.clone(),
        collateral_token: entity.collateral_token.clone(),
        collateral_token1: entity.collateral_token1.clone(),
        collateral_token2: entity.collateral_token2.clone(),
        parent_market,
        parent_outcome: num("parentOutcome", &entity.parent_outcome)?,
        condition_id: entity.condition_id.clone(),
        template_id: num("templateId", &entity.template_id)?,
        questions,
        opening_ts: num("openingTs", &entity.opening_ts)?,
        finalize_ts: num("finalizeTs", &entity.finalize_ts)?,
        lower_bound: optional_big(&id, "lowerBound", entity.lower_bound.as_deref())?,
        upper_bound: optional_big(&id, "upperBound", entity.upper_bound.as_deref())?,
        payout_reported: entity.payout_reported,
        payout_numerators,
        outcomes_supply: big("outcomesSupply", &entity.outcomes_supply)?,
        block_timestamp: num("blockTimestamp", &entity.block_timestamp)?,
        creator: entity.creator.clone(),
        liquidity_usd,
        incentive,
        has_liquidity,
        categories,
        odds,
        pool_balance,
        url,
        verification: verification.cloned().unwrap_or_else(VerificationRecord::not_verified),
    })
}

fn to_question(market_id: &str, q: &RawQuestion) -> Result<Question> {
    Ok(Question {
        id: q.id.clone(),
        opening_ts: parse_u64(market_id, "question.openingTs", &q.opening_ts)?,
        timeout: parse_u64(market_id, "question.timeout", &q.timeout)?,
        finalize_ts: parse_u64(market_id, "question.finalizeTs", &q.finalize_ts)?,
        is_pending_arbitration: q.is_pending_arbitration,
        best_answer: q.best_answer.clone(),
        bond: parse_big(market_id, "question.bond", &q.bond)?,
        min_bond: parse_big(market_id, "question.minBond", &q.min_bond)?,
        arbitration_occurred: q.arbitration_occurred,
    })
}

fn to_parent(market_id: &str, p: &RawParentMarket) -> Result<ParentMarket> {
    Ok(ParentMarket {
        id: p.id.to_lowercase(),
        condition_id: p.condition_id.clone(),
        payout_reported: p.payout_reported,
        payout_numerators: p
            .payout_numerators
            .iter()
            .map(|n| parse_big(market_id, "parentMarket.payoutNumerators", n))
            .collect::<Result<Vec<_>>>()?,
    })
}

fn parse_u64(market_id: &str, field: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AppError::malformed(market_id, format!("{field} `{raw}` is not a u64")))
}

fn parse_big(market_id: &str, field: &str, raw: &str) -> Result<U256> {
    parse_u256(raw).map_err(|e| AppError::malformed(market_id, format!("{field}: {e}")))
}

fn optional_big(market_id: &str, field: &str, raw: Option<&str>) -> Result<U256> {
    match raw {
        Some(r) => parse_big(market_id, field, r),
        None => Ok(U256::ZERO),
    }
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::{
    error::HistoryError,
    models::{
        scale_amount, AssetTransfer, Direction, NormalizedTransaction, RawActivityRecord,
        TokenMetadata, TokenSummary, TransactionType,
    },
    sources::TokenMetadataSource,
};

/// Mint id used for native transfers, which carry no mint of their own.
pub const NATIVE_MINT: &str = "SOL";
pub const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";
pub const NATIVE_SYMBOL: &str = "SOL";
pub const NATIVE_NAME: &str = "Solana";
pub const NATIVE_DECIMALS: u32 = 9;

const WRAPPED_NATIVE_NAME: &str = "Wrapped SOL";
const UNKNOWN_TOKEN_NAME: &str = "Unknown Token";

/// Minimum scaled amounts below which a transfer counts as dust.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_native_amount: f64,
    pub min_token_amount: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_native_amount: 0.0001,
            min_token_amount: 0.001,
        }
    }
}

/// Inputs shared by every record of one batch.
pub struct BatchContext<'a> {
    pub wallet: &'a str,
    pub thresholds: Thresholds,
    pub native_price_usd: Option<f64>,
    pub metadata: &'a dyn TokenMetadataSource,
}

/// A qualifying transfer before its symbol has been resolved.
#[derive(Debug, Clone)]
struct Candidate {
    mint: String,
    amount: f64,
    decimals: u32,
    direction: Direction,
    counterparty: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
}

/// Normalize one batch of raw indexer records, preserving input order.
///
/// Records that fail to decode are logged and skipped. Records with no
/// qualifying transfer are dropped silently. Symbols missing from the raw
/// transfers are resolved with a single metadata lookup for the batch.
pub async fn normalize_batch(
    records: &[Value],
    ctx: &BatchContext<'_>,
) -> Vec<NormalizedTransaction> {
    let mut kept = Vec::with_capacity(records.len());

    for value in records {
        let record = match decode_record(value) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!("skipping record: {}", err);
                continue;
            }
        };

        let candidates = extract_transfers(&record, ctx.wallet, &ctx.thresholds);
        if candidates.is_empty() {
            continue;
        }
        kept.push((record, candidates));
    }

    let metadata = resolve_metadata(
        kept.iter().flat_map(|(_, candidates)| candidates.iter()),
        ctx.metadata,
    )
    .await;

    kept.into_iter()
        .map(|(record, candidates)| {
            let transfers = candidates
                .into_iter()
                .map(|c| finalize_transfer(c, &metadata))
                .collect();
            build_transaction(record, transfers, ctx.native_price_usd)
        })
        .collect()
}

fn decode_record(value: &Value) -> Result<RawActivityRecord, HistoryError> {
    let record: RawActivityRecord = serde_json::from_value(value.clone())
        .map_err(|err| HistoryError::Normalization(err.to_string()))?;
    if record.signature.is_empty() {
        return Err(HistoryError::Normalization("record has an empty signature".into()));
    }
    Ok(record)
}

/// Token transfers first, then native transfers, each in source order.
fn extract_transfers(
    record: &RawActivityRecord,
    wallet: &str,
    thresholds: &Thresholds,
) -> Vec<Candidate> {
    let mut out = Vec::new();

    for transfer in record.token_transfers.iter().flatten() {
        let Some((direction, counterparty)) = direction_for(
            wallet,
            transfer.from_user_account.as_deref(),
            transfer.to_user_account.as_deref(),
        ) else {
            continue;
        };

        let decimals = transfer.decimals.unwrap_or(0);
        let Some(amount) = transfer.token_amount else {
            continue;
        };
        if is_dust(scale_amount(amount, decimals), thresholds.min_token_amount) {
            continue;
        }

        out.push(Candidate {
            mint: transfer.mint.clone(),
            amount,
            decimals,
            direction,
            counterparty,
            symbol: non_empty(transfer.token_symbol.as_deref()),
            name: non_empty(transfer.token_name.as_deref()),
        });
    }

    for transfer in record.native_transfers.iter().flatten() {
        let Some((direction, counterparty)) = direction_for(
            wallet,
            transfer.from_user_account.as_deref(),
            transfer.to_user_account.as_deref(),
        ) else {
            continue;
        };

        if is_dust(
            scale_amount(transfer.amount, NATIVE_DECIMALS),
            thresholds.min_native_amount,
        ) {
            continue;
        }

        out.push(Candidate {
            mint: NATIVE_MINT.to_string(),
            amount: transfer.amount,
            decimals: NATIVE_DECIMALS,
            direction,
            counterparty,
            symbol: Some(NATIVE_SYMBOL.to_string()),
            name: Some(NATIVE_NAME.to_string()),
        });
    }

    out
}

/// Destination wins when the wallet sends to itself.
fn direction_for(
    wallet: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Option<(Direction, Option<String>)> {
    if to == Some(wallet) {
        Some((Direction::In, from.map(str::to_string)))
    } else if from == Some(wallet) {
        Some((Direction::Out, to.map(str::to_string)))
    } else {
        None
    }
}

// NaN amounts count as dust.
fn is_dust(scaled: f64, minimum: f64) -> bool {
    !(scaled >= minimum)
}

pub fn classify(qualifying_transfers: usize, description: Option<&str>) -> TransactionType {
    let mentions_swap = description
        .map(|d| d.to_lowercase().contains("swap"))
        .unwrap_or(false);
    if qualifying_transfers > 1 || mentions_swap {
        TransactionType::Swap
    } else {
        TransactionType::Transfer
    }
}

pub fn is_native_like(mint: &str) -> bool {
    mint == NATIVE_MINT || mint == WRAPPED_NATIVE_MINT
}

async fn resolve_metadata<'c>(
    candidates: impl Iterator<Item = &'c Candidate>,
    source: &dyn TokenMetadataSource,
) -> HashMap<String, TokenMetadata> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = candidates
        .filter(|c| c.symbol.is_none() && !is_native_like(&c.mint))
        .filter(|c| seen.insert(c.mint.clone()))
        .map(|c| c.mint.clone())
        .collect();

    if ids.is_empty() {
        return HashMap::new();
    }

    match source.lookup(&ids).await {
        Ok(found) => found.into_iter().map(|m| (m.id.clone(), m)).collect(),
        Err(err) => {
            tracing::warn!("token metadata lookup failed for {} mints: {:#}", ids.len(), err);
            HashMap::new()
        }
    }
}

fn finalize_transfer(c: Candidate, metadata: &HashMap<String, TokenMetadata>) -> AssetTransfer {
    let looked_up = metadata.get(&c.mint);

    let token_symbol = c
        .symbol
        .or_else(|| (c.mint == WRAPPED_NATIVE_MINT).then(|| NATIVE_SYMBOL.to_string()))
        .or_else(|| looked_up.and_then(|m| non_empty(m.symbol.as_deref())))
        .unwrap_or_else(|| placeholder_symbol(&c.mint));

    let token_name = c
        .name
        .or_else(|| (c.mint == WRAPPED_NATIVE_MINT).then(|| WRAPPED_NATIVE_NAME.to_string()))
        .or_else(|| looked_up.and_then(|m| non_empty(m.name.as_deref())))
        .unwrap_or_else(|| UNKNOWN_TOKEN_NAME.to_string());

    AssetTransfer {
        token_mint: c.mint,
        amount: c.amount,
        decimals: c.decimals,
        direction: c.direction,
        counterparty: c.counterparty,
        token_symbol,
        token_name,
    }
}

fn placeholder_symbol(mint: &str) -> String {
    let prefix: String = mint.chars().take(4).collect();
    format!("{}...", prefix)
}

fn build_transaction(
    record: RawActivityRecord,
    transfers: Vec<AssetTransfer>,
    native_price_usd: Option<f64>,
) -> NormalizedTransaction {
    let tx_type = classify(transfers.len(), record.description.as_deref());

    let from_token = transfers
        .iter()
        .find(|t| t.direction == Direction::Out)
        .map(TokenSummary::from);
    let to_token = transfers
        .iter()
        .find(|t| t.direction == Direction::In)
        .map(TokenSummary::from);

    let value_usd = native_price_usd.and_then(|price| {
        value_in_usd(
            tx_type,
            &transfers,
            from_token.as_ref(),
            to_token.as_ref(),
            price,
        )
    });

    NormalizedTransaction {
        signature: record.signature,
        timestamp: format_timestamp(record.timestamp),
        tx_type,
        token_transfers: transfers,
        from_token,
        to_token,
        value_usd,
    }
}

fn value_in_usd(
    tx_type: TransactionType,
    transfers: &[AssetTransfer],
    from: Option<&TokenSummary>,
    to: Option<&TokenSummary>,
    native_price: f64,
) -> Option<f64> {
    let native_amount = match tx_type {
        TransactionType::Swap => from
            .filter(|s| is_native_like(&s.mint))
            .or_else(|| to.filter(|s| is_native_like(&s.mint)))
            .map(|s| scale_amount(s.amount, s.decimals)),
        TransactionType::Transfer => transfers
            .iter()
            .find(|t| t.token_mint == NATIVE_MINT)
            .map(AssetTransfer::scaled_amount),
        TransactionType::Unknown => None,
    }?;
    Some(native_amount * native_price)
}

fn format_timestamp(secs: i64) -> String {
    // Seconds outside chrono's range clamp to the epoch.
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

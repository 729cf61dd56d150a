use serde::{Deserialize, Serialize};

/// One enhanced-transaction record as the indexer returns it. Only the
/// fields the normalizer reads are modelled; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivityRecord {
    pub signature: String,
    pub timestamp: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub token_transfers: Option<Vec<RawTokenTransfer>>,
    #[serde(default)]
    pub native_transfers: Option<Vec<RawNativeTransfer>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenTransfer {
    pub mint: String,
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    /// `null` or absent amounts are treated as dust.
    #[serde(default)]
    pub token_amount: Option<f64>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub token_name: Option<String>,
}

/// Native movements are denominated in lamports.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNativeTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Swap,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    pub token_mint: String,
    /// Raw, unscaled amount.
    pub amount: f64,
    pub decimals: u32,
    pub direction: Direction,
    pub counterparty: Option<String>,
    pub token_symbol: String,
    pub token_name: String,
}

impl AssetTransfer {
    pub fn scaled_amount(&self) -> f64 {
        scale_amount(self.amount, self.decimals)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub mint: String,
    pub symbol: String,
    pub amount: f64,
    pub decimals: u32,
}

impl From<&AssetTransfer> for TokenSummary {
    fn from(transfer: &AssetTransfer) -> Self {
        Self {
            mint: transfer.token_mint.clone(),
            symbol: transfer.token_symbol.clone(),
            amount: transfer.amount,
            decimals: transfer.decimals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTransaction {
    pub signature: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub token_transfers: Vec<AssetTransfer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_token: Option<TokenSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_token: Option<TokenSummary>,
    #[serde(rename = "valueUSD")]
    pub value_usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub transactions: Vec<NormalizedTransaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub id: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub address: String,
    pub price: f64,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub mint: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalances {
    pub sol_balance: f64,
    pub tokens: Vec<TokenBalance>,
}

pub fn scale_amount(raw: f64, decimals: u32) -> f64 {
    raw / 10f64.powi(decimals as i32)
}

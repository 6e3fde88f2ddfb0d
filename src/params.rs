//! Parameter structs for MCP tool inputs.
//!
//! Each struct derives [`serde::Deserialize`] and [`schemars::JsonSchema`]
//! so that `rmcp` can auto-generate JSON schemas for tool parameters.

use schemars::JsonSchema;
use serde::Deserialize;

/// Monobank alias of the client's default account.
fn default_account() -> String {
    "0".to_owned()
}

/// Default look-back for transaction listings.
const fn thirty_days() -> u32 {
    30
}

/// Default look-back for recurring payment detection.
const fn ninety_days() -> u32 {
    90
}

/// Default look-back for the spending report.
const fn fourteen_days() -> u32 {
    14
}

/// Parameters for `monobank_get_transactions` and `monobank_get_expense_stats`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct AccountPeriodParams {
    /// Account ID, or `"0"` for the default account.
    #[serde(default = "default_account")]
    pub(crate) account_id: String,
    /// Number of days to look back (1-366).
    #[serde(default = "thirty_days")]
    pub(crate) days: u32,
}

/// Parameters for `monobank_detect_recurring_payments`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct RecurringParams {
    /// Account ID, or `"0"` for the default account.
    #[serde(default = "default_account")]
    pub(crate) account_id: String,
    /// Number of days to analyse (1-366).
    #[serde(default = "ninety_days")]
    pub(crate) days: u32,
}

/// Parameters for `wise_get_transactions`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct WiseTransactionsParams {
    /// Number of days to look back (1-366).
    #[serde(default = "thirty_days")]
    pub(crate) days: u32,
}

/// Parameters for `generate_report`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct ReportParams {
    /// Number of days to include (1-366).
    #[serde(default = "fourteen_days")]
    pub(crate) days: u32,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use super::{AccountPeriodParams, RecurringParams, ReportParams, WiseTransactionsParams};

    #[test]
    fn account_period_defaults() {
        let params: AccountPeriodParams =
            serde_json::from_str("{}").expect("should deserialize empty object");
        assert_eq!(params.account_id, "0");
        assert_eq!(params.days, 30);
    }

    #[test]
    fn account_period_explicit() {
        let json = r#"{"account_id": "abc123", "days": 7}"#;
        let params: AccountPeriodParams = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(params.account_id, "abc123");
        assert_eq!(params.days, 7);
    }

    #[test]
    fn account_period_rejects_negative_days() {
        let json = r#"{"days": -1}"#;
        let _err = serde_json::from_str::<AccountPeriodParams>(json)
            .expect_err("negative days should not deserialize");
    }

    #[test]
    fn recurring_defaults_to_ninety_days() {
        let params: RecurringParams =
            serde_json::from_str("{}").expect("should deserialize empty object");
        assert_eq!(params.account_id, "0");
        assert_eq!(params.days, 90);
    }

    #[test]
    fn wise_transactions_defaults() {
        let params: WiseTransactionsParams =
            serde_json::from_str("{}").expect("should deserialize empty object");
        assert_eq!(params.days, 30);
    }

    #[test]
    fn report_defaults_to_two_weeks() {
        let defaults: ReportParams =
            serde_json::from_str("{}").expect("should deserialize empty object");
        assert_eq!(defaults.days, 14);
        let weekly: ReportParams =
            serde_json::from_str(r#"{"days": 7}"#).expect("should deserialize days");
        assert_eq!(weekly.days, 7);
    }
}

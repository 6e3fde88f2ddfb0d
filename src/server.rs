//! MCP server exposing Monobank and Wise as tools.
//!
//! Uses `rmcp` macros to turn bank queries into MCP tools. Every tool returns
//! pretty-printed JSON except `generate_report`, which returns markdown.

extern crate alloc;

use alloc::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::{Bank, Banks};
use crate::error::BankError;
use crate::monobank::StatementItem;
use crate::params::{AccountPeriodParams, RecurringParams, ReportParams, WiseTransactionsParams};
use crate::report;
use crate::response::{ExpenseStats, PortfolioAccount, detect_recurring};
use crate::retry::{RetryPolicy, with_rate_limit_retry};

/// Longest look-back a tool accepts.
const MAX_DAYS: u32 = 366;

/// MCP server over the configured bank clients.
#[derive(Clone)]
pub(crate) struct FinanceMcpServer {
    /// Bank clients, shared by every session.
    banks: Arc<Banks>,
    /// Backoff for rate-limited Monobank calls.
    retry: RetryPolicy,
    /// Tool router for dispatching MCP tool calls.
    tool_router: ToolRouter<Self>,
}

impl core::fmt::Debug for FinanceMcpServer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FinanceMcpServer")
            .field("monobank", &self.banks.monobank.is_some())
            .field("wise", &self.banks.wise.is_some())
            .finish_non_exhaustive()
    }
}

/// Converts a [`BankError`] into an MCP internal error.
#[allow(clippy::needless_pass_by_value, reason = "map_err passes by value")]
fn bank_err(err: BankError) -> McpError {
    McpError::internal_error(err.to_string(), None)
}

/// Rejects look-back periods outside `1..=366` days.
fn validate_days(days: u32) -> Result<u32, McpError> {
    if (1..=MAX_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(McpError::invalid_params(
            format!("days must be between 1 and {MAX_DAYS}, got {days}"),
            None,
        ))
    }
}

/// Serializes a value to a pretty-printed JSON string for tool output.
fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value).map_err(|err| {
        McpError::internal_error(format!("failed to serialize response: {err}"), None)
    })
}

/// Creates a successful tool result containing JSON text.
fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = to_json_text(value)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool_router]
impl FinanceMcpServer {
    /// Creates a new MCP server over the given bank clients.
    pub(crate) fn new(banks: Banks, retry: RetryPolicy) -> Self {
        Self {
            banks: Arc::new(banks),
            retry,
            tool_router: Self::tool_router(),
        }
    }

    /// Fetches Monobank statement items for one account with rate-limit retry.
    async fn monobank_items(
        &self,
        tool: &str,
        account_id: &str,
        days: u32,
    ) -> Result<Vec<StatementItem>, McpError> {
        let period = validate_days(days)?;
        let client = self.banks.monobank().map_err(bank_err)?;
        with_rate_limit_retry(tool, self.retry, || client.transactions(account_id, period))
            .await
            .map_err(bank_err)
    }

    // ── Monobank tools ──────────────────────────────────────────────

    /// Returns the Monobank client profile and accounts.
    #[tool(
        description = "[Monobank] Get detailed information about the client and their accounts, including balances, card numbers and jars"
    )]
    async fn monobank_get_client_info(&self) -> Result<CallToolResult, McpError> {
        let client = self.banks.monobank().map_err(bank_err)?;
        let info = with_rate_limit_retry("monobank_get_client_info", self.retry, || {
            client.client_info()
        })
        .await
        .map_err(bank_err)?;
        json_result(&info)
    }

    /// Lists statement items for an account.
    #[tool(
        description = "[Monobank] Get bank transactions for a specific account over a number of days. account_id \"0\" is the default account; long periods are fetched in 30-day windows"
    )]
    async fn monobank_get_transactions(
        &self,
        params: Parameters<AccountPeriodParams>,
    ) -> Result<CallToolResult, McpError> {
        let items = self
            .monobank_items(
                "monobank_get_transactions",
                &params.0.account_id,
                params.0.days,
            )
            .await?;
        json_result(&items)
    }

    /// Lists accounts with balances in major units.
    #[tool(
        description = "[Monobank] Get a simplified portfolio view: list of accounts with balance and currency"
    )]
    async fn monobank_get_portfolio(&self) -> Result<CallToolResult, McpError> {
        let client = self.banks.monobank().map_err(bank_err)?;
        let info = with_rate_limit_retry("monobank_get_portfolio", self.retry, || {
            client.client_info()
        })
        .await
        .map_err(bank_err)?;
        json_result(&PortfolioAccount::from_client_info(&info))
    }

    /// Summarises spending per merchant category.
    #[tool(
        description = "[Monobank] Get spending statistics: total spent and breakdown by category (MCC), largest first"
    )]
    async fn monobank_get_expense_stats(
        &self,
        params: Parameters<AccountPeriodParams>,
    ) -> Result<CallToolResult, McpError> {
        let items = self
            .monobank_items(
                "monobank_get_expense_stats",
                &params.0.account_id,
                params.0.days,
            )
            .await?;
        json_result(&ExpenseStats::from_items(&items, params.0.days))
    }

    /// Finds payments repeated with the same description and amount.
    #[tool(
        description = "[Monobank] Identify potential subscriptions based on repeated transaction amounts and descriptions"
    )]
    async fn monobank_detect_recurring_payments(
        &self,
        params: Parameters<RecurringParams>,
    ) -> Result<CallToolResult, McpError> {
        let items = self
            .monobank_items(
                "monobank_detect_recurring_payments",
                &params.0.account_id,
                params.0.days,
            )
            .await?;
        json_result(&detect_recurring(&items))
    }

    // ── Wise tools ──────────────────────────────────────────────────

    /// Lists Wise profiles.
    #[tool(
        description = "[Wise] List all Wise profiles (personal, business) associated with the token"
    )]
    async fn wise_get_profiles(&self) -> Result<CallToolResult, McpError> {
        let client = self.banks.wise().map_err(bank_err)?;
        let profiles = client.profiles().await.map_err(bank_err)?;
        json_result(&profiles)
    }

    /// Lists balances of the resolved profile.
    #[tool(
        description = "[Wise] Get balances (jars) for the default or configured profile, with currency and available amounts"
    )]
    async fn wise_get_balances(&self) -> Result<CallToolResult, McpError> {
        let client = self.banks.wise().map_err(bank_err)?;
        let balances = client.balances().await.map_err(bank_err)?;
        json_result(&balances)
    }

    /// Lists statement transactions across every currency balance.
    #[tool(
        description = "[Wise] Get transactions across all currency accounts for the last N days, sorted by date descending"
    )]
    async fn wise_get_transactions(
        &self,
        params: Parameters<WiseTransactionsParams>,
    ) -> Result<CallToolResult, McpError> {
        let days = validate_days(params.0.days)?;
        let client = self.banks.wise().map_err(bank_err)?;
        let transactions = client.transactions(days).await.map_err(bank_err)?;
        json_result(&transactions)
    }

    // ── Reports ─────────────────────────────────────────────────────

    /// Renders the combined spending report.
    #[tool(
        description = "Generate a markdown spending report combining Monobank and Wise transactions: totals per currency, category breakdown, top expenses and daily spending. Banks without a configured token are left out"
    )]
    async fn generate_report(
        &self,
        params: Parameters<ReportParams>,
    ) -> Result<CallToolResult, McpError> {
        let days = validate_days(params.0.days)?;
        let markdown = report::spending_report(&self.banks, &[Bank::Mono, Bank::Wise], days).await;
        Ok(CallToolResult::success(vec![Content::text(markdown)]))
    }
}

#[tool_handler]
impl ServerHandler for FinanceMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Personal finance MCP server for Monobank and Wise. \
                 Use monobank_* tools for accounts, statements, spending \
                 stats and subscriptions, wise_* tools for profiles, \
                 balances and transactions, and generate_report for a \
                 combined markdown spending report."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use rmcp::handler::server::wrapper::Parameters;
    use rmcp::model::ErrorCode;

    use super::{FinanceMcpServer, validate_days};
    use crate::config::Banks;
    use crate::params::{AccountPeriodParams, ReportParams, WiseTransactionsParams};
    use crate::retry::RetryPolicy;

    fn unconfigured() -> FinanceMcpServer {
        FinanceMcpServer::new(Banks::default(), RetryPolicy::default())
    }

    #[test]
    fn days_bounds() {
        assert_eq!(validate_days(1).ok(), Some(1));
        assert_eq!(validate_days(366).ok(), Some(366));
        let err = validate_days(0).expect_err("zero days rejected");
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        let _err = validate_days(367).expect_err("more than a year rejected");
    }

    #[test]
    fn registers_every_tool() {
        let server = unconfigured();
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "generate_report",
                "monobank_detect_recurring_payments",
                "monobank_get_client_info",
                "monobank_get_expense_stats",
                "monobank_get_portfolio",
                "monobank_get_transactions",
                "wise_get_balances",
                "wise_get_profiles",
                "wise_get_transactions",
            ]
        );
    }

    #[tokio::test]
    async fn missing_monobank_token_is_internal_error() {
        let err = unconfigured()
            .monobank_get_portfolio()
            .await
            .expect_err("no token configured");
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(err.message, "MONOBANK_API_TOKEN not found in environment");
    }

    #[tokio::test]
    async fn missing_wise_token_is_internal_error() {
        let err = unconfigured()
            .wise_get_profiles()
            .await
            .expect_err("no token configured");
        assert_eq!(err.message, "WISE_API_TOKEN not found in environment");
    }

    #[tokio::test]
    async fn days_are_validated_before_bank_lookup() {
        let monobank_err = unconfigured()
            .monobank_get_transactions(Parameters(AccountPeriodParams {
                account_id: "0".to_owned(),
                days: 0,
            }))
            .await
            .expect_err("invalid days");
        assert_eq!(monobank_err.code, ErrorCode::INVALID_PARAMS);

        let wise_err = unconfigured()
            .wise_get_transactions(Parameters(WiseTransactionsParams { days: 400 }))
            .await
            .expect_err("invalid days");
        assert_eq!(wise_err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn report_without_banks_is_still_rendered() {
        let result = unconfigured()
            .generate_report(Parameters(ReportParams { days: 7 }))
            .await
            .expect("report renders");
        let json = serde_json::to_string(&result).expect("serializes");
        assert!(json.contains("Weekly Spending Report"), "{json}");
    }
}

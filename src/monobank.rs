//! Monobank personal API client.
//!
//! Wraps the `/personal/*` endpoints of <https://api.monobank.ua>. The API
//! allows roughly one statement request per minute per token and at most
//! 31 days (+1 hour) per statement request, so long ranges are split into
//! windows and multi-account fetches are paced.

use core::time::Duration;

use chrono::{NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BankError, check_status};
use crate::mcc::category_for;
use crate::transaction::{self, Source, Transaction};

/// Production API root.
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.monobank.ua";

/// Environment variable holding the personal API token.
pub(crate) const TOKEN_VAR: &str = "MONOBANK_API_TOKEN";

/// Longest span requested in a single statement call.
const STATEMENT_WINDOW_SECS: i64 = 30 * 86_400;

/// Attempts per account when a statement request is rate limited.
const MAX_ATTEMPTS: u32 = 3;

/// Currency codes used when normalising statements.
const CURRENCIES: &[(u32, &str)] = &[
    (980, "UAH"),
    (840, "USD"),
    (978, "EUR"),
    (826, "GBP"),
    (985, "PLN"),
];

/// Maps an ISO 4217 numeric code to its letter code, falling back to the number.
pub(crate) fn currency_name(code: u32) -> String {
    CURRENCIES
        .iter()
        .find(|&&(known, _)| known == code)
        .map_or_else(|| code.to_string(), |&(_, name)| name.to_owned())
}

/// Converts kopiyky/cents to major units.
#[allow(clippy::cast_precision_loss, reason = "account balances fit in f64 mantissa")]
pub(crate) fn minor_to_major(minor: i64) -> f64 {
    minor as f64 / 100.0
}

/// Client profile returned by `/personal/client-info`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClientInfo {
    /// Client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) client_id: Option<String>,
    /// Client display name.
    #[serde(default)]
    pub(crate) name: String,
    /// Registered webhook URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) web_hook_url: Option<String>,
    /// Granted permission letters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) permissions: Option<String>,
    /// Card and FOP accounts.
    #[serde(default)]
    pub(crate) accounts: Vec<Account>,
    /// Savings jars, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) jars: Option<Value>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub(crate) rest: Map<String, Value>,
}

/// One Monobank account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Account {
    /// Account identifier used in statement requests.
    pub(crate) id: String,
    /// Identifier for send.monobank.ua links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) send_id: Option<String>,
    /// Balance in minor units.
    #[serde(default)]
    pub(crate) balance: i64,
    /// Credit limit in minor units.
    #[serde(default)]
    pub(crate) credit_limit: i64,
    /// Account kind: `black`, `white`, `platinum`, `fop`, ...
    #[serde(default, rename = "type")]
    pub(crate) kind: String,
    /// ISO 4217 numeric currency code.
    #[serde(default)]
    pub(crate) currency_code: u32,
    /// Cashback flavour (`UAH`, `Miles`, `None`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) cashback_type: Option<String>,
    /// Masked card numbers.
    #[serde(default)]
    pub(crate) masked_pan: Vec<String>,
    /// Account IBAN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) iban: Option<String>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub(crate) rest: Map<String, Value>,
}

/// One statement line.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatementItem {
    /// Transaction identifier.
    #[serde(default)]
    pub(crate) id: String,
    /// Unix time in seconds.
    pub(crate) time: i64,
    /// Merchant or counterparty text.
    #[serde(default)]
    pub(crate) description: String,
    /// Merchant category code.
    #[serde(default)]
    pub(crate) mcc: u32,
    /// MCC before bank-side reclassification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) original_mcc: Option<u32>,
    /// Whether the amount is still on hold.
    #[serde(default)]
    pub(crate) hold: bool,
    /// Amount in account currency, minor units, negative for debits.
    pub(crate) amount: i64,
    /// Amount in operation currency, minor units.
    #[serde(default)]
    pub(crate) operation_amount: i64,
    /// Operation currency code.
    #[serde(default)]
    pub(crate) currency_code: u32,
    /// Commission in minor units.
    #[serde(default)]
    pub(crate) commission_rate: i64,
    /// Cashback in minor units.
    #[serde(default)]
    pub(crate) cashback_amount: i64,
    /// Balance after the operation, minor units.
    #[serde(default)]
    pub(crate) balance: i64,
    /// User comment attached to a transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) comment: Option<String>,
    /// Check receipt number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) receipt_id: Option<String>,
    /// Counterparty name, for FOP accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) counter_name: Option<String>,
    /// Counterparty IBAN, for FOP accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) counter_iban: Option<String>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub(crate) rest: Map<String, Value>,
}

/// Waits applied between requests; shortened in tests.
#[derive(Debug, Clone, Copy)]
struct Pacing {
    /// Base wait after a 429, multiplied by the attempt number.
    rate_limit_wait: Duration,
    /// Pause between consecutive accounts.
    inter_account_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            rate_limit_wait: Duration::from_secs(61),
            inter_account_delay: Duration::from_secs(5),
        }
    }
}

/// Monobank API client.
#[derive(Debug, Clone)]
pub(crate) struct MonobankClient {
    /// HTTP client carrying the `X-Token` header.
    http: reqwest::Client,
    /// API root without trailing slash.
    base_url: String,
    /// Request pacing.
    pacing: Pacing,
}

/// Splits `[start, end)` unix seconds into windows of at most 30 days.
pub(crate) fn statement_windows(start: i64, end: i64) -> Vec<(i64, i64)> {
    let mut windows = Vec::new();
    let mut current = start;
    while current < end {
        let window_end = current.saturating_add(STATEMENT_WINDOW_SECS).min(end);
        windows.push((current, window_end));
        current = window_end;
    }
    windows
}

/// Normalises one account's statement, keeping items inside `[start, end]`.
pub(crate) fn normalize_statement(
    items: &[StatementItem],
    account: &Account,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<Transaction> {
    let currency = currency_name(account.currency_code);
    items
        .iter()
        .filter_map(|item| {
            let date = transaction::local_from_unix(item.time)?;
            if date < start || date > end {
                return None;
            }
            let amount = minor_to_major(item.amount);
            Some(Transaction {
                date,
                description: if item.description.is_empty() {
                    "Unknown".to_owned()
                } else {
                    item.description.clone()
                },
                amount,
                currency: currency.clone(),
                mcc: Some(item.mcc.to_string()),
                category: category_for(item.mcc),
                source: Source::Monobank,
                account_type: account.kind.clone(),
                is_expense: amount < 0.0,
            })
        })
        .collect()
}

impl MonobankClient {
    /// Creates a client for the production API.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub(crate) fn new(token: &str) -> Result<Self, BankError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Creates a client against an arbitrary API root.
    ///
    /// # Errors
    ///
    /// Same as [`MonobankClient::new`].
    pub(crate) fn with_base_url(token: &str, base_url: &str) -> Result<Self, BankError> {
        let mut headers = HeaderMap::new();
        let mut value =
            HeaderValue::from_str(token).map_err(|_err| BankError::InvalidToken(TOKEN_VAR))?;
        value.set_sensitive(true);
        let _previous = headers.insert("X-Token", value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            pacing: Pacing::default(),
        })
    }

    /// Removes the waits between requests.
    #[cfg(test)]
    fn without_pacing(mut self) -> Self {
        self.pacing = Pacing {
            rate_limit_wait: Duration::from_millis(1),
            inter_account_delay: Duration::ZERO,
        };
        self
    }

    /// Issues a GET and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BankError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "monobank request");
        let response = check_status(self.http.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Fetches the client profile and account list.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub(crate) async fn client_info(&self) -> Result<ClientInfo, BankError> {
        self.get_json("/personal/client-info").await
    }

    /// Fetches one statement window (`from`/`to` in unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`BankError::RateLimited`] on 429, or another error on failure.
    pub(crate) async fn statement(
        &self,
        account: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<StatementItem>, BankError> {
        self.get_json(&format!("/personal/statement/{account}/{from}/{to}"))
            .await
    }

    /// Fetches the statement for the last `days` days, window by window.
    ///
    /// A rate limit or a rejected range stops the walk and returns what was
    /// collected so far.
    ///
    /// # Errors
    ///
    /// Returns any other request error.
    pub(crate) async fn transactions(
        &self,
        account: &str,
        days: u32,
    ) -> Result<Vec<StatementItem>, BankError> {
        let now = Utc::now().timestamp();
        let start = now.saturating_sub(i64::from(days).saturating_mul(86_400));
        let mut all = Vec::new();
        for (from, to) in statement_windows(start, now) {
            match self.statement(account, from, to).await {
                Ok(mut items) => all.append(&mut items),
                Err(err) if err.is_rate_limited() || err.is_bad_request() => {
                    tracing::warn!(%err, account, collected = all.len(), "statement walk stopped early");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(all)
    }

    /// Fetches the statement of one account with 429 retries.
    async fn account_statement_with_retry(
        &self,
        account: &Account,
        from: i64,
        to: i64,
    ) -> Option<Vec<StatementItem>> {
        let currency = currency_name(account.currency_code);
        for attempt in 1..=MAX_ATTEMPTS {
            match self.statement(&account.id, from, to).await {
                Ok(items) => return Some(items),
                Err(err) if err.is_rate_limited() && attempt < MAX_ATTEMPTS => {
                    let wait = self.pacing.rate_limit_wait.saturating_mul(attempt);
                    tracing::warn!(
                        account_type = %account.kind,
                        %currency,
                        wait_secs = wait.as_secs(),
                        attempt,
                        "rate limit hit, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    tracing::warn!(account_type = %account.kind, %currency, %err, "skipping account");
                    return None;
                }
            }
        }
        None
    }

    /// Fetches and normalises the last `days` days across every account.
    ///
    /// Empty FOP accounts are skipped. Accounts that keep failing are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the account list itself cannot be fetched.
    pub(crate) async fn all_transactions(&self, days: u32) -> Result<Vec<Transaction>, BankError> {
        let now = transaction::local_now();
        let start = transaction::window_start(now, days);
        let info = self.client_info().await?;

        let to = Utc::now().timestamp();
        let from = to.saturating_sub(
            now.signed_duration_since(start).num_seconds(),
        );

        let mut all = Vec::new();
        let mut fetched: usize = 0;
        for account in &info.accounts {
            if account.kind == "fop" && account.balance == 0 {
                continue;
            }
            if fetched > 0 {
                tokio::time::sleep(self.pacing.inter_account_delay).await;
            }
            fetched = fetched.saturating_add(1);

            if let Some(items) = self.account_statement_with_retry(account, from, to).await {
                all.extend(normalize_statement(&items, account, start, now));
            }
        }
        transaction::sort_newest_first(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    clippy::indexing_slicing,
    reason = "test code uses expect and indexing for readability"
)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeDelta;
    use serde_json::json;

    use super::{
        Account, MonobankClient, STATEMENT_WINDOW_SECS, StatementItem, currency_name,
        normalize_statement, statement_windows,
    };
    use crate::transaction;

    /// Per-account canned statement responses, consumed front to back.
    type Script = Arc<Mutex<HashMap<String, Vec<Response>>>>;

    async fn serve_stub(script: Script) -> String {
        async fn client_info(headers: HeaderMap) -> Response {
            if headers.get("X-Token").and_then(|v| v.to_str().ok()) != Some("tok") {
                return StatusCode::FORBIDDEN.into_response();
            }
            Json(json!({
                "clientId": "c1",
                "name": "Test User",
                "accounts": [
                    {"id": "black", "balance": 150_000, "creditLimit": 0, "type": "black", "currencyCode": 980},
                    {"id": "fop-empty", "balance": 0, "creditLimit": 0, "type": "fop", "currencyCode": 840},
                    {"id": "eur", "balance": 2_000, "creditLimit": 0, "type": "white", "currencyCode": 978}
                ]
            }))
            .into_response()
        }

        async fn statement(
            State(script): State<Script>,
            Path((account, _from, _to)): Path<(String, i64, i64)>,
        ) -> Response {
            let mut guard = script.lock().expect("script lock");
            match guard.get_mut(&account) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Json(json!([])).into_response(),
            }
        }

        let app = Router::new()
            .route("/personal/client-info", get(client_info))
            .route("/personal/statement/{account}/{from}/{to}", get(statement))
            .with_state(script);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let _handle = tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    fn recent_item(minutes_ago: i64, amount: i64, mcc: u32, description: &str) -> serde_json::Value {
        let time = chrono::Utc::now().timestamp() - minutes_ago * 60;
        json!({"id": format!("{description}-{time}"), "time": time, "description": description, "mcc": mcc, "amount": amount})
    }

    #[test]
    fn windows_cover_range_in_thirty_day_chunks() {
        let start = 1_700_000_000;
        let end = start + 65 * 86_400;
        let windows = statement_windows(start, end);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (start, start + STATEMENT_WINDOW_SECS));
        assert_eq!(windows[1].0, windows[0].1);
        assert_eq!(windows[2], (start + 2 * STATEMENT_WINDOW_SECS, end));
    }

    #[test]
    fn empty_range_has_no_windows() {
        assert!(statement_windows(100, 100).is_empty());
    }

    #[test]
    fn currency_names() {
        assert_eq!(currency_name(980), "UAH");
        assert_eq!(currency_name(985), "PLN");
        assert_eq!(currency_name(124), "124");
    }

    #[test]
    fn client_info_deserializes_camel_case() {
        let body = r#"{
            "clientId": "3MSaMMtczs",
            "name": "Мазепа Іван",
            "webHookUrl": "https://example.com/hook",
            "permissions": "psfj",
            "accounts": [{
                "id": "kKGVoZuHWzqVoZuH",
                "sendId": "uHWzqVoZuH",
                "balance": 10000000,
                "creditLimit": 10000000,
                "type": "black",
                "currencyCode": 980,
                "cashbackType": "UAH",
                "maskedPan": ["537541******1234"],
                "iban": "UA733220010000026201234567890"
            }]
        }"#;
        let info: super::ClientInfo = serde_json::from_str(body).expect("should deserialize");
        assert_eq!(info.accounts.len(), 1);
        assert_eq!(info.accounts[0].kind, "black");
        assert_eq!(info.accounts[0].credit_limit, 10_000_000);
        assert_eq!(info.accounts[0].cashback_type.as_deref(), Some("UAH"));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let body = json!({
            "clientId": "c1",
            "name": "Test User",
            "managedClients": [{"clientId": "m1"}],
            "accounts": [{
                "id": "a1",
                "type": "fop",
                "currencyCode": 980,
                "balanceUpdatedAt": 1_700_000_000
            }]
        });
        let info: super::ClientInfo = serde_json::from_value(body).expect("should deserialize");
        assert!(info.rest.contains_key("managedClients"));
        let echoed = serde_json::to_value(&info).expect("serializes");
        assert_eq!(echoed["managedClients"][0]["clientId"], "m1");
        assert_eq!(echoed["accounts"][0]["balanceUpdatedAt"], 1_700_000_000_i64);
        assert_eq!(echoed["accounts"][0]["type"], "fop");

        let item: StatementItem = serde_json::from_value(json!({
            "id": "tx1",
            "time": 1_700_000_000,
            "amount": -5_000,
            "counterEdrpou": "3096889974",
            "invoiceId": "2103.в.27"
        }))
        .expect("statement item");
        assert_eq!(item.rest.len(), 2);
        let echoed_item = serde_json::to_value(&item).expect("serializes");
        assert_eq!(echoed_item["counterEdrpou"], "3096889974");
        assert_eq!(echoed_item["invoiceId"], "2103.в.27");
    }

    #[test]
    fn normalize_filters_window_and_maps_fields() {
        let now = transaction::local_now();
        let start = transaction::window_start(now, 7);
        let account = Account {
            id: "a".to_owned(),
            kind: "black".to_owned(),
            currency_code: 980,
            ..Account::default()
        };
        let in_window = StatementItem {
            time: chrono::Utc::now().timestamp() - 3_600,
            description: "Silpo".to_owned(),
            mcc: 5411,
            amount: -25_050,
            ..StatementItem::default()
        };
        let too_old = StatementItem {
            time: chrono::Utc::now().timestamp() - 30 * 86_400,
            amount: -100,
            ..StatementItem::default()
        };
        let income = StatementItem {
            time: chrono::Utc::now().timestamp() - 7_200,
            amount: 100_000,
            mcc: 4829,
            ..StatementItem::default()
        };
        let txs = normalize_statement(&[in_window, too_old, income], &account, start, now);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "Silpo");
        assert_eq!(txs[0].category, "Groceries");
        assert_eq!(txs[0].currency, "UAH");
        assert!(txs[0].is_expense);
        assert!((txs[0].amount + 250.5).abs() < 1e-9);
        assert_eq!(txs[1].description, "Unknown");
        assert!(!txs[1].is_expense);
        assert!(txs[1].date >= now - TimeDelta::hours(3));
    }

    #[tokio::test]
    async fn all_transactions_skips_empty_fop_and_retries_rate_limit() {
        let script: Script = Arc::default();
        {
            let mut guard = script.lock().expect("script lock");
            let _prev = guard.insert(
                "black".to_owned(),
                vec![
                    StatusCode::TOO_MANY_REQUESTS.into_response(),
                    Json(json!([recent_item(10, -5_000, 5814, "McDonalds")])).into_response(),
                ],
            );
            let _prev_eur = guard.insert(
                "eur".to_owned(),
                vec![Json(json!([recent_item(20, 1_000, 4829, "Refund")])).into_response()],
            );
            let _prev_fop = guard.insert(
                "fop-empty".to_owned(),
                vec![StatusCode::INTERNAL_SERVER_ERROR.into_response()],
            );
        }
        let base = serve_stub(Arc::clone(&script)).await;
        let client = MonobankClient::with_base_url("tok", &base)
            .expect("client")
            .without_pacing();

        let txs = client.all_transactions(7).await.expect("transactions");
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "McDonalds");
        assert_eq!(txs[0].category, "Fast Food");
        assert_eq!(txs[0].account_type, "black");
        assert_eq!(txs[1].currency, "EUR");
        assert!(!txs[1].is_expense);

        let guard = script.lock().expect("script lock");
        assert_eq!(guard.get("fop-empty").map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn transactions_returns_partial_data_on_rate_limit() {
        let script: Script = Arc::default();
        {
            let mut guard = script.lock().expect("script lock");
            let _prev = guard.insert(
                "black".to_owned(),
                vec![
                    Json(json!([recent_item(60, -100, 5411, "Shop")])).into_response(),
                    StatusCode::TOO_MANY_REQUESTS.into_response(),
                ],
            );
        }
        let base = serve_stub(script).await;
        let client = MonobankClient::with_base_url("tok", &base).expect("client");
        let items = client.transactions("black", 45).await.expect("partial data");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Shop");
    }

    #[tokio::test]
    async fn wrong_token_is_reported_as_status_error() {
        let base = serve_stub(Arc::default()).await;
        let client = MonobankClient::with_base_url("other", &base).expect("client");
        let err = client.client_info().await.expect_err("should fail");
        assert!(matches!(err, super::BankError::Status { status, .. } if status == StatusCode::FORBIDDEN));
    }
}

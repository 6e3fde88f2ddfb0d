//! Wise (formerly TransferWise) API client.
//!
//! Profiles, balances and statements are returned close to the upstream
//! shape; card activities and transfers are normalised into
//! [`Transaction`]s for the spending report.

extern crate alloc;

use alloc::sync::Arc;
use core::time::Duration;
use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::error::{BankError, check_status};
use crate::transaction::{self, Source, Transaction};

/// Production API root.
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.wise.com/v1";

/// Environment variable holding the API token.
pub(crate) const TOKEN_VAR: &str = "WISE_API_TOKEN";

/// Page size for the activities endpoint.
const ACTIVITY_PAGE_SIZE: &str = "100";

/// Transfer statuses that represent money that actually moved.
const SETTLED_TRANSFER_STATUSES: &[&str] = &["outgoing_payment_sent", "funds_converted"];

/// Timestamp format the statement endpoint expects.
const INTERVAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Matches HTML tags in activity titles (`<strong>Shop</strong>`).
static HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

/// Merchant keyword groups, checked in order.
const MERCHANT_CATEGORIES: &[(&str, &[&str])] = &[
    ("Transport", &["uber", "bolt", "lyft", "taxi", "cabify"]),
    (
        "Groceries",
        &["lidl", "aldi", "pingo doce", "continente", "mercado", "supermarket", "grocery"],
    ),
    (
        "Restaurants",
        &["restaurant", "cafe", "coffee", "starbucks", "mcdonald", "burger", "pizza", "sushi"],
    ),
    (
        "Subscriptions",
        &["patreon", "netflix", "spotify", "youtube", "apple", "google", "amazon prime"],
    ),
    (
        "Health & Fitness",
        &["pharmacy", "farmacia", "gym", "yoga", "fitness", "health"],
    ),
    (
        "Shopping",
        &["amazon", "ebay", "aliexpress", "shop", "store", "market"],
    ),
];

/// A Wise profile (personal or business).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Profile {
    /// Profile identifier.
    pub(crate) id: i64,
    /// `personal` or `business`.
    #[serde(rename = "type")]
    pub(crate) kind: String,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub(crate) rest: Map<String, Value>,
}

/// One currency balance inside a borderless account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Balance {
    /// ISO currency code.
    #[serde(default)]
    pub(crate) currency: String,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub(crate) rest: Map<String, Value>,
}

/// A borderless account ("jar" container).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct BorderlessAccount {
    /// Account identifier.
    pub(crate) id: i64,
    /// Account currency, when the API reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) currency: Option<String>,
    /// Per-currency balances.
    #[serde(default)]
    pub(crate) balances: Vec<Balance>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub(crate) rest: Map<String, Value>,
}

impl BorderlessAccount {
    /// Currency label used to tag statement lines.
    fn currency_label(&self) -> Option<String> {
        self.currency
            .clone()
            .or_else(|| self.balances.first().map(|b| b.currency.clone()))
    }
}

/// Statement payload; only the transaction list is used.
#[derive(Debug, Deserialize)]
struct Statement {
    /// Raw statement lines.
    #[serde(default)]
    transactions: Vec<Value>,
}

/// Nested transfer details.
#[derive(Debug, Default, Deserialize)]
struct TransferDetails {
    /// Payment reference.
    #[serde(default)]
    reference: Option<String>,
}

/// One entry of `/transfers`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Transfer {
    /// Transfer status.
    #[serde(default)]
    status: String,
    /// Creation time, `%Y-%m-%d %H:%M:%S`.
    #[serde(default)]
    created: String,
    /// Amount sent.
    #[serde(default)]
    source_value: f64,
    /// Currency sent.
    #[serde(default)]
    source_currency: Option<String>,
    /// Currency received.
    #[serde(default)]
    target_currency: Option<String>,
    /// Payment reference.
    #[serde(default)]
    reference: Option<String>,
    /// Nested details.
    #[serde(default)]
    details: Option<TransferDetails>,
    /// Null for money coming in.
    #[serde(default)]
    source_account: Option<Value>,
}

/// One entry of `/profiles/{id}/activities`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Activity {
    /// Activity identifier.
    #[serde(default)]
    id: String,
    /// Activity type (`CARD_PAYMENT`, `TRANSFER`, ...).
    #[serde(default, rename = "type")]
    kind: String,
    /// Activity status.
    #[serde(default)]
    status: String,
    /// RFC 3339 creation time.
    #[serde(default)]
    created_on: String,
    /// Merchant title, may contain HTML.
    #[serde(default)]
    title: Option<String>,
    /// Amount in card currency (`"12.50 EUR"`).
    #[serde(default)]
    primary_amount: Option<String>,
    /// Amount in spending currency, when converted.
    #[serde(default)]
    secondary_amount: Option<String>,
}

/// A page of activities.
#[derive(Debug, Deserialize)]
struct ActivityPage {
    /// Activities, newest first.
    #[serde(default)]
    activities: Vec<Activity>,
    /// Continuation cursor.
    #[serde(default)]
    cursor: Option<String>,
}

/// Parses `"3,300.50 EUR"` into `(3300.5, "EUR")`; anything else is `(0, "EUR")`.
pub(crate) fn parse_amount(text: &str) -> (f64, String) {
    let cleaned = text.replace(',', "");
    let mut parts = cleaned.split_whitespace();
    if let (Some(number), Some(currency)) = (parts.next(), parts.next()) {
        if let Ok(amount) = number.parse::<f64>() {
            return (amount, currency.to_owned());
        }
    }
    (0.0, "EUR".to_owned())
}

/// Removes HTML tags from an activity title.
pub(crate) fn strip_tags(title: &str) -> String {
    HTML_TAG
        .as_ref()
        .map_or_else(|| title.to_owned(), |re| re.replace_all(title, "").into_owned())
        .trim()
        .to_owned()
}

/// Guesses a spending category from a merchant name.
pub(crate) fn categorize_merchant(merchant: &str) -> &'static str {
    let lower = merchant.to_lowercase();
    MERCHANT_CATEGORIES
        .iter()
        .find(|&&(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map_or("Card Payment", |&(category, _)| category)
}

/// Parses an RFC 3339 timestamp into local wall-clock time.
fn parse_created_on(created: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(created)
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}

/// Normalises a transfer, or `None` if it is unsettled or outside the window.
pub(crate) fn normalize_transfer(
    transfer: &Transfer,
    start: NaiveDateTime,
    now: NaiveDateTime,
) -> Option<Transaction> {
    if !SETTLED_TRANSFER_STATUSES.contains(&transfer.status.as_str()) {
        return None;
    }
    let date = NaiveDateTime::parse_from_str(&transfer.created, "%Y-%m-%d %H:%M:%S").ok()?;
    if date < start || date > now {
        return None;
    }

    let source_currency = transfer.source_currency.as_deref().unwrap_or("EUR");
    let target_currency = transfer.target_currency.as_deref().unwrap_or("EUR");
    let reference = transfer
        .reference
        .as_deref()
        .filter(|r| !r.is_empty())
        .or_else(|| {
            transfer
                .details
                .as_ref()
                .and_then(|d| d.reference.as_deref())
                .filter(|r| !r.is_empty())
        });
    let is_incoming = transfer.source_account.as_ref().is_none_or(Value::is_null);

    let description = if source_currency == target_currency {
        reference.unwrap_or("Bank Transfer").to_owned()
    } else {
        format!(
            "{} ({source_currency}\u{2192}{target_currency})",
            reference.unwrap_or("Transfer")
        )
    };

    Some(Transaction {
        date,
        description,
        amount: if is_incoming {
            transfer.source_value
        } else {
            -transfer.source_value
        },
        currency: source_currency.to_owned(),
        mcc: None,
        category: "Bank Transfer".to_owned(),
        source: Source::Wise,
        account_type: "transfer".to_owned(),
        is_expense: !is_incoming,
    })
}

/// Normalises a settled card payment; `None` for other activity kinds.
fn normalize_card_activity(activity: &Activity, date: NaiveDateTime) -> Option<Transaction> {
    if activity.kind != "CARD_PAYMENT" || !matches!(activity.status.as_str(), "COMPLETED" | "PENDING")
    {
        return None;
    }
    let (mut amount, mut currency) = parse_amount(activity.primary_amount.as_deref().unwrap_or(""));
    if let Some(secondary) = activity.secondary_amount.as_deref().filter(|s| !s.is_empty()) {
        let (sec_amount, sec_currency) = parse_amount(secondary);
        if sec_amount > 0.0 {
            amount = sec_amount;
            currency = sec_currency;
        }
    }
    let title = strip_tags(activity.title.as_deref().unwrap_or("Unknown"));
    Some(Transaction {
        date,
        category: categorize_merchant(&title).to_owned(),
        description: title,
        amount: -amount,
        currency,
        mcc: None,
        source: Source::Wise,
        account_type: "card".to_owned(),
        is_expense: true,
    })
}

/// Wise API client.
#[derive(Debug, Clone)]
pub(crate) struct WiseClient {
    /// HTTP client carrying the bearer token.
    http: reqwest::Client,
    /// API root without trailing slash.
    base_url: String,
    /// Profile resolved once per process (or configured).
    profile_id: Arc<OnceCell<i64>>,
}

impl WiseClient {
    /// Creates a client for the production API.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub(crate) fn new(token: &str, profile_id: Option<i64>) -> Result<Self, BankError> {
        Self::with_base_url(token, profile_id, DEFAULT_BASE_URL)
    }

    /// Creates a client against an arbitrary API root.
    ///
    /// # Errors
    ///
    /// Same as [`WiseClient::new`].
    pub(crate) fn with_base_url(
        token: &str,
        profile_id: Option<i64>,
        base_url: &str,
    ) -> Result<Self, BankError> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_err| BankError::InvalidToken(TOKEN_VAR))?;
        value.set_sensitive(true);
        let _previous = headers.insert(AUTHORIZATION, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            profile_id: Arc::new(profile_id.map_or_else(OnceCell::new, |id| {
                OnceCell::new_with(Some(id))
            })),
        })
    }

    /// Issues a GET with query parameters and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BankError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "wise request");
        let response = check_status(self.http.get(&url).query(query).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Lists profiles attached to the token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub(crate) async fn profiles(&self) -> Result<Vec<Profile>, BankError> {
        self.get_json("/profiles", &[]).await
    }

    /// Resolves the profile to query: configured, first personal, else first.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::NoProfiles`] when the token has no profiles.
    pub(crate) async fn profile_id(&self) -> Result<i64, BankError> {
        self.profile_id
            .get_or_try_init(|| async {
                let profiles = self.profiles().await?;
                let chosen = profiles
                    .iter()
                    .find(|p| p.kind == "personal")
                    .or_else(|| profiles.first())
                    .map(|p| p.id)
                    .ok_or(BankError::NoProfiles)?;
                tracing::debug!(profile_id = chosen, "resolved wise profile");
                Ok::<i64, BankError>(chosen)
            })
            .await
            .copied()
    }

    /// Lists borderless accounts of the resolved profile.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub(crate) async fn balances(&self) -> Result<Vec<BorderlessAccount>, BankError> {
        let profile = self.profile_id().await?.to_string();
        self.get_json("/borderless-accounts", &[("profileId", profile.as_str())])
            .await
    }

    /// Fetches completed statement lines of one borderless account.
    async fn account_statement(
        &self,
        profile: i64,
        account: i64,
        days: u32,
    ) -> Result<Vec<Value>, BankError> {
        let now = Utc::now();
        let start = now - TimeDelta::days(i64::from(days));
        let interval_start = start.format(INTERVAL_FORMAT).to_string();
        let interval_end = now.format(INTERVAL_FORMAT).to_string();
        let statement: Statement = self
            .get_json(
                &format!("/profiles/{profile}/borderless-accounts/{account}/statement.json"),
                &[
                    ("intervalStart", interval_start.as_str()),
                    ("intervalEnd", interval_end.as_str()),
                    ("type", "COMPLETED"),
                ],
            )
            .await?;
        Ok(statement.transactions)
    }

    /// Statement lines across all balances for the last `days` days, newest first.
    ///
    /// Each line is tagged with `_account_currency`. Accounts whose statement
    /// cannot be fetched are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile or the account list cannot be fetched.
    pub(crate) async fn transactions(&self, days: u32) -> Result<Vec<Value>, BankError> {
        let profile = self.profile_id().await?;
        let accounts = self.balances().await?;
        let mut all = Vec::new();
        for account in &accounts {
            match self.account_statement(profile, account.id, days).await {
                Ok(lines) => {
                    let currency = account.currency_label();
                    all.extend(lines.into_iter().map(|mut line| {
                        if let Some(obj) = line.as_object_mut() {
                            let _previous = obj.insert(
                                "_account_currency".to_owned(),
                                currency.clone().map_or(Value::Null, Value::String),
                            );
                        }
                        line
                    }));
                }
                Err(err) => {
                    tracing::warn!(account = account.id, %err, "failed to fetch wise statement");
                }
            }
        }
        all.sort_by(|a, b| {
            let date_a = a.get("date").and_then(Value::as_str).unwrap_or("");
            let date_b = b.get("date").and_then(Value::as_str).unwrap_or("");
            date_b.cmp(date_a)
        });
        Ok(all)
    }

    /// Settled bank transfers in the last `days` days, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub(crate) async fn transfers(&self, days: u32) -> Result<Vec<Transaction>, BankError> {
        let now = transaction::local_now();
        let start = transaction::window_start(now, days);
        let transfers: Vec<Transfer> = self.get_json("/transfers", &[("limit", "200")]).await?;
        let mut processed: Vec<Transaction> = transfers
            .iter()
            .filter_map(|t| normalize_transfer(t, start, now))
            .collect();
        transaction::sort_newest_first(&mut processed);
        Ok(processed)
    }

    /// Card payments in the last `days` days, newest first.
    ///
    /// Walks the activity feed page by page until it runs out or reaches
    /// activities older than the window.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub(crate) async fn card_transactions(&self, days: u32) -> Result<Vec<Transaction>, BankError> {
        let profile = self.profile_id().await?;
        let now = transaction::local_now();
        let start = transaction::window_start(now, days);
        let path = format!("/profiles/{profile}/activities");

        let mut processed = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("size", ACTIVITY_PAGE_SIZE)];
            if let Some(c) = cursor.as_deref() {
                query.push(("cursor", c));
            }
            let page: ActivityPage = self.get_json(&path, &query).await?;
            if page.activities.is_empty() {
                break;
            }

            let mut reached_window_start = false;
            for activity in &page.activities {
                if !seen.insert(activity.id.clone()) {
                    continue;
                }
                if activity.kind != "CARD_PAYMENT" {
                    continue;
                }
                let Some(date) = parse_created_on(&activity.created_on) else {
                    continue;
                };
                if date < start {
                    reached_window_start = true;
                    break;
                }
                if date > now {
                    continue;
                }
                if let Some(tx) = normalize_card_activity(activity, date) {
                    processed.push(tx);
                }
            }

            let last_is_old = page
                .activities
                .last()
                .and_then(|a| parse_created_on(&a.created_on))
                .is_some_and(|d| d < start);
            if reached_window_start || last_is_old {
                break;
            }
            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        transaction::sort_newest_first(&mut processed);
        Ok(processed)
    }

    /// Card payments and transfers combined, newest first.
    ///
    /// # Errors
    ///
    /// Returns the first error from either feed.
    pub(crate) async fn all_transactions(&self, days: u32) -> Result<Vec<Transaction>, BankError> {
        let mut all = self.card_transactions(days).await?;
        all.extend(self.transfers(days).await?);
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
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{Local, NaiveDate, TimeDelta, Utc};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    use super::{
        Activity, Transfer, WiseClient, categorize_merchant, normalize_card_activity,
        normalize_transfer, parse_amount, strip_tags,
    };

    fn day(d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid date for test")
    }

    #[test]
    fn parses_amount_strings() {
        let (amount, currency) = parse_amount("3,300 EUR");
        assert!((amount - 3300.0).abs() < f64::EPSILON);
        assert_eq!(currency, "EUR");

        let (amount, currency) = parse_amount("1.40 GBP");
        assert!((amount - 1.4).abs() < 1e-9);
        assert_eq!(currency, "GBP");
    }

    #[test]
    fn malformed_amount_defaults_to_zero_eur() {
        assert_eq!(parse_amount(""), (0.0, "EUR".to_owned()));
        assert_eq!(parse_amount("abc USD"), (0.0, "EUR".to_owned()));
        assert_eq!(parse_amount("12.00"), (0.0, "EUR".to_owned()));
    }

    #[test]
    fn strips_markup_from_titles() {
        assert_eq!(strip_tags("<strong>Lidl</strong> Lisboa "), "Lidl Lisboa");
        assert_eq!(strip_tags("Plain"), "Plain");
    }

    #[test]
    fn categorizes_merchants_in_priority_order() {
        assert_eq!(categorize_merchant("UBER *TRIP"), "Transport");
        assert_eq!(categorize_merchant("Pingo Doce Alvalade"), "Groceries");
        assert_eq!(categorize_merchant("Starbucks Coffee"), "Restaurants");
        assert_eq!(categorize_merchant("Amazon Prime Video"), "Subscriptions");
        assert_eq!(categorize_merchant("Amazon EU"), "Shopping");
        assert_eq!(categorize_merchant("Farmacia Central"), "Health & Fitness");
        assert_eq!(categorize_merchant("Hotel Lux"), "Card Payment");
    }

    #[test]
    fn outgoing_transfer_with_conversion() {
        let transfer: Transfer = serde_json::from_value(json!({
            "status": "outgoing_payment_sent",
            "created": "2024-03-10 09:30:00",
            "sourceValue": 250.0,
            "sourceCurrency": "EUR",
            "targetCurrency": "UAH",
            "reference": "",
            "details": {"reference": "Rent"},
            "sourceAccount": 123
        }))
        .expect("transfer");
        let tx = normalize_transfer(&transfer, day(1, 0), day(15, 0)).expect("in window");
        assert_eq!(tx.description, "Rent (EUR\u{2192}UAH)");
        assert!((tx.amount + 250.0).abs() < f64::EPSILON);
        assert!(tx.is_expense);
        assert_eq!(tx.category, "Bank Transfer");
    }

    #[test]
    fn incoming_transfer_is_income() {
        let transfer: Transfer = serde_json::from_value(json!({
            "status": "funds_converted",
            "created": "2024-03-12 18:00:00",
            "sourceValue": 1000.0,
            "sourceCurrency": "USD",
            "targetCurrency": "USD",
            "sourceAccount": null
        }))
        .expect("transfer");
        let tx = normalize_transfer(&transfer, day(1, 0), day(15, 0)).expect("in window");
        assert_eq!(tx.description, "Bank Transfer");
        assert!(!tx.is_expense);
        assert!(tx.amount > 0.0);
    }

    #[test]
    fn unsettled_or_stale_transfers_are_dropped() {
        let pending = Transfer {
            status: "processing".to_owned(),
            created: "2024-03-10 09:30:00".to_owned(),
            ..Transfer::default()
        };
        assert!(normalize_transfer(&pending, day(1, 0), day(15, 0)).is_none());

        let stale = Transfer {
            status: "outgoing_payment_sent".to_owned(),
            created: "2024-02-01 09:30:00".to_owned(),
            ..Transfer::default()
        };
        assert!(normalize_transfer(&stale, day(1, 0), day(15, 0)).is_none());
    }

    #[test]
    fn card_activity_prefers_secondary_amount() {
        let activity = Activity {
            id: "a1".to_owned(),
            kind: "CARD_PAYMENT".to_owned(),
            status: "COMPLETED".to_owned(),
            title: Some("<strong>Uber</strong>".to_owned()),
            primary_amount: Some("10.00 EUR".to_owned()),
            secondary_amount: Some("450.00 UAH".to_owned()),
            ..Activity::default()
        };
        let tx = normalize_card_activity(&activity, day(5, 12)).expect("card payment");
        assert_eq!(tx.description, "Uber");
        assert_eq!(tx.category, "Transport");
        assert_eq!(tx.currency, "UAH");
        assert!((tx.amount + 450.0).abs() < f64::EPSILON);

        let cancelled = Activity {
            status: "CANCELLED".to_owned(),
            ..activity
        };
        assert!(normalize_card_activity(&cancelled, day(5, 12)).is_none());
    }

    fn iso_minutes_ago(minutes: i64) -> String {
        (Utc::now() - TimeDelta::minutes(minutes)).to_rfc3339()
    }

    async fn serve_stub() -> String {
        async fn profiles(headers: HeaderMap) -> Response {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tok") {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Json(json!([
                {"id": 7, "type": "business", "details": {"name": "Acme"}},
                {"id": 42, "type": "personal", "details": {"firstName": "Ann"}}
            ]))
            .into_response()
        }

        async fn balances(Query(q): Query<HashMap<String, String>>) -> Response {
            if q.get("profileId").map(String::as_str) != Some("42") {
                return StatusCode::BAD_REQUEST.into_response();
            }
            Json(json!([
                {"id": 1, "profileId": 42, "balances": [{"currency": "EUR", "amount": {"value": 10.0, "currency": "EUR"}}]},
                {"id": 2, "profileId": 42, "balances": [{"currency": "USD", "amount": {"value": 5.0, "currency": "USD"}}]},
                {"id": 3, "profileId": 42, "balances": []}
            ]))
            .into_response()
        }

        async fn statement(Path((_profile, account)): Path<(i64, i64)>) -> Response {
            match account {
                1 => Json(json!({"transactions": [
                    {"date": "2024-03-01T10:00:00Z", "amount": {"value": -3.0}},
                    {"date": "2024-03-05T10:00:00Z", "amount": {"value": -4.0}}
                ]}))
                .into_response(),
                2 => Json(json!({"transactions": [
                    {"date": "2024-03-03T10:00:00Z", "amount": {"value": 9.0}}
                ]}))
                .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }

        async fn activities(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
            match q.get("cursor").map(String::as_str) {
                None => Json(json!({
                    "cursor": "page2",
                    "activities": [
                        {"id": "c1", "type": "CARD_PAYMENT", "status": "COMPLETED",
                         "createdOn": iso_minutes_ago(30), "title": "<strong>Lidl</strong>",
                         "primaryAmount": "12.40 EUR"},
                        {"id": "t1", "type": "TRANSFER", "status": "COMPLETED",
                         "createdOn": iso_minutes_ago(40), "title": "To Bob",
                         "primaryAmount": "100 EUR"}
                    ]
                })),
                Some("page2") => Json(json!({
                    "cursor": "page3",
                    "activities": [
                        {"id": "c1", "type": "CARD_PAYMENT", "status": "COMPLETED",
                         "createdOn": iso_minutes_ago(30), "title": "Lidl",
                         "primaryAmount": "12.40 EUR"},
                        {"id": "c2", "type": "CARD_PAYMENT", "status": "PENDING",
                         "createdOn": iso_minutes_ago(90), "title": "Netflix",
                         "primaryAmount": "9.99 EUR"},
                        {"id": "c3", "type": "CARD_PAYMENT", "status": "COMPLETED",
                         "createdOn": iso_minutes_ago(60 * 24 * 40), "title": "Old",
                         "primaryAmount": "1.00 EUR"}
                    ]
                })),
                Some(_) => Json(json!({"activities": [
                    {"id": "never", "type": "CARD_PAYMENT", "status": "COMPLETED",
                     "createdOn": iso_minutes_ago(5), "title": "Should not be fetched",
                     "primaryAmount": "1.00 EUR"}
                ]})),
            }
        }

        async fn transfers() -> Json<Value> {
            let created = (Local::now() - TimeDelta::hours(2))
                .naive_local()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string();
            Json(json!([
                {"status": "outgoing_payment_sent", "created": created, "sourceValue": 50.0,
                 "sourceCurrency": "EUR", "targetCurrency": "EUR", "reference": "Rent",
                 "sourceAccount": 99},
                {"status": "cancelled", "created": created, "sourceValue": 70.0,
                 "sourceCurrency": "EUR", "targetCurrency": "EUR", "sourceAccount": 99}
            ]))
        }

        let app = Router::new()
            .route("/profiles", get(profiles))
            .route("/borderless-accounts", get(balances))
            .route(
                "/profiles/{profile}/borderless-accounts/{account}/statement.json",
                get(statement),
            )
            .route("/profiles/{profile}/activities", get(activities))
            .route("/transfers", get(transfers));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let _handle = tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn resolves_personal_profile() {
        let base = serve_stub().await;
        let client = WiseClient::with_base_url("tok", None, &base).expect("client");
        assert_eq!(client.profile_id().await.expect("profile"), 42);
    }

    #[tokio::test]
    async fn configured_profile_skips_lookup() {
        let client =
            WiseClient::with_base_url("tok", Some(5), "http://127.0.0.1:9").expect("client");
        assert_eq!(client.profile_id().await.expect("profile"), 5);
    }

    #[tokio::test]
    async fn statement_lines_are_merged_and_tagged() {
        let base = serve_stub().await;
        let client = WiseClient::with_base_url("tok", None, &base).expect("client");
        let lines = client.transactions(30).await.expect("transactions");
        let dates: Vec<&str> = lines
            .iter()
            .filter_map(|l| l.get("date").and_then(Value::as_str))
            .collect();
        assert_eq!(
            dates,
            vec!["2024-03-05T10:00:00Z", "2024-03-03T10:00:00Z", "2024-03-01T10:00:00Z"]
        );
        assert_eq!(lines[1]["_account_currency"], "USD");
    }

    #[tokio::test]
    async fn all_transactions_combines_cards_and_transfers() {
        let base = serve_stub().await;
        let client = WiseClient::with_base_url("tok", None, &base).expect("client");
        let txs = client.all_transactions(14).await.expect("transactions");
        let descriptions: Vec<&str> = txs.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Lidl", "Netflix", "Rent"]);
        assert_eq!(txs[0].category, "Groceries");
        assert_eq!(txs[1].category, "Subscriptions");
        assert_eq!(txs[2].account_type, "transfer");
        assert!(txs.iter().all(|t| t.is_expense));
    }

    #[tokio::test]
    async fn wrong_token_fails() {
        let base = serve_stub().await;
        let client = WiseClient::with_base_url("nope", None, &base).expect("client");
        let _err = client.profiles().await.expect_err("server error surfaces");
    }
}

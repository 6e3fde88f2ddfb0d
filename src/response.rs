//! Derived response structs for MCP tool outputs.
//!
//! These turn raw Monobank data into summaries that are easier for LLM
//! assistants to reason about: major-unit balances, spending per category
//! and repeated payments.

use std::collections::HashMap;

use serde::Serialize;

use crate::mcc::category_for;
use crate::monobank::{Account, ClientInfo, StatementItem, minor_to_major};
use crate::transaction::{local_from_unix, round_to};

/// Seconds in a day.
const SECS_PER_DAY: f64 = 86_400.0;

/// Letter code for the portfolio view, which only knows the main currencies.
fn portfolio_currency(code: u32) -> String {
    match code {
        980 => "UAH".to_owned(),
        840 => "USD".to_owned(),
        978 => "EUR".to_owned(),
        other => other.to_string(),
    }
}

/// One account in the portfolio view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PortfolioAccount {
    /// Account ID.
    pub(crate) id: String,
    /// Account type (`black`, `white`, `fop`, ...).
    #[serde(rename = "type")]
    pub(crate) kind: String,
    /// Letter currency code, or the numeric code when unknown.
    pub(crate) currency: String,
    /// Balance in major units.
    pub(crate) balance: f64,
    /// Credit limit in major units.
    pub(crate) credit_limit: f64,
    /// Cashback program, if any.
    pub(crate) cashback_type: Option<String>,
}

impl PortfolioAccount {
    /// Converts a Monobank account.
    pub(crate) fn from_account(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            kind: account.kind.clone(),
            currency: portfolio_currency(account.currency_code),
            balance: minor_to_major(account.balance),
            credit_limit: minor_to_major(account.credit_limit),
            cashback_type: account.cashback_type.clone(),
        }
    }

    /// Converts every account of a client profile.
    pub(crate) fn from_client_info(info: &ClientInfo) -> Vec<Self> {
        info.accounts.iter().map(Self::from_account).collect()
    }
}

/// Spending under one MCC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct CategorySpend {
    /// Merchant category code as text.
    pub(crate) mcc: String,
    /// Human-readable category of the MCC.
    pub(crate) category: String,
    /// Amount spent in major units, rounded to cents.
    pub(crate) amount: f64,
}

/// Spending totals over a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ExpenseStats {
    /// Length of the analysed period.
    pub(crate) period_days: u32,
    /// Total spent in major units, rounded to cents.
    pub(crate) total_spent: f64,
    /// Per-MCC spending, largest first.
    pub(crate) by_category: Vec<CategorySpend>,
}

impl ExpenseStats {
    /// Sums the expenses (negative amounts) of a statement.
    pub(crate) fn from_items(items: &[StatementItem], days: u32) -> Self {
        let mut order: Vec<u32> = Vec::new();
        let mut sums: HashMap<u32, f64> = HashMap::new();
        let mut total = 0.0_f64;
        for item in items.iter().filter(|item| item.amount < 0) {
            let spent = minor_to_major(item.amount.saturating_abs());
            let entry = sums.entry(item.mcc).or_insert_with(|| {
                order.push(item.mcc);
                0.0
            });
            *entry += spent;
            total += spent;
        }

        let mut by_category: Vec<CategorySpend> = order
            .into_iter()
            .map(|mcc| CategorySpend {
                mcc: mcc.to_string(),
                category: category_for(mcc),
                amount: sums.get(&mcc).copied().unwrap_or_default(),
            })
            .collect();
        by_category.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        for entry in &mut by_category {
            entry.amount = round_to(entry.amount, 2);
        }

        Self {
            period_days: days,
            total_spent: round_to(total, 2),
            by_category,
        }
    }
}

/// A payment seen more than once with the same description and amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RecurringPayment {
    /// Trimmed statement description.
    pub(crate) description: String,
    /// Amount per payment in major units.
    pub(crate) amount: f64,
    /// Number of occurrences.
    pub(crate) count: usize,
    /// Mean gap between occurrences in days, one decimal.
    pub(crate) avg_interval_days: f64,
    /// Local time of the latest occurrence, `YYYY-MM-DDTHH:MM:SS`.
    pub(crate) last_transaction: String,
}

/// Mean gap between sorted timestamps, in days.
#[allow(
    clippy::cast_precision_loss,
    reason = "statement spans and counts are far below f64 precision limits"
)]
fn average_interval_days(sorted_times: &[i64]) -> f64 {
    let (Some(first), Some(last)) = (sorted_times.first(), sorted_times.last()) else {
        return 0.0;
    };
    let gaps = sorted_times.len().saturating_sub(1);
    if gaps == 0 {
        return 0.0;
    }
    last.saturating_sub(*first) as f64 / gaps as f64 / SECS_PER_DAY
}

/// Groups expenses by description and amount and keeps groups seen twice or more.
///
/// Groups keep first-seen order and are then ordered by count, highest first.
pub(crate) fn detect_recurring(items: &[StatementItem]) -> Vec<RecurringPayment> {
    let mut groups: Vec<((String, i64), Vec<i64>)> = Vec::new();
    let mut index: HashMap<(String, i64), usize> = HashMap::new();
    for item in items.iter().filter(|item| item.amount < 0) {
        let key = (item.description.trim().to_owned(), item.amount.saturating_abs());
        if let Some(slot) = index.get(&key).and_then(|&pos| groups.get_mut(pos)) {
            slot.1.push(item.time);
        } else {
            let _previous = index.insert(key.clone(), groups.len());
            groups.push((key, vec![item.time]));
        }
    }

    let mut recurring: Vec<RecurringPayment> = groups
        .into_iter()
        .filter(|group| group.1.len() > 1)
        .filter_map(|((description, minor), mut times)| {
            times.sort_unstable();
            let last = times.last().copied()?;
            let last_transaction = local_from_unix(last)
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_default();
            Some(RecurringPayment {
                description,
                amount: minor_to_major(minor),
                count: times.len(),
                avg_interval_days: round_to(average_interval_days(&times), 1),
                last_transaction,
            })
        })
        .collect();
    recurring.sort_by(|a, b| b.count.cmp(&a.count));
    recurring
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::missing_docs_in_private_items,
    reason = "test code compares exact rounded floats and indexes for readability"
)]
mod tests {
    use super::{ExpenseStats, PortfolioAccount, average_interval_days, detect_recurring};
    use crate::monobank::{Account, ClientInfo, StatementItem};
    use crate::transaction::local_from_unix;

    const DAY: i64 = 86_400;

    fn item(time: i64, description: &str, amount: i64, mcc: u32) -> StatementItem {
        StatementItem {
            id: format!("tx-{time}"),
            time,
            description: description.to_owned(),
            mcc,
            amount,
            operation_amount: amount,
            currency_code: 980,
            ..StatementItem::default()
        }
    }

    fn account(id: &str, kind: &str, currency_code: u32, balance: i64) -> Account {
        Account {
            id: id.to_owned(),
            kind: kind.to_owned(),
            currency_code,
            balance,
            credit_limit: 1_000_000,
            cashback_type: Some("UAH".to_owned()),
            ..Account::default()
        }
    }

    #[test]
    fn portfolio_uses_major_units_and_short_currency_table() {
        let info = ClientInfo {
            name: "Test".to_owned(),
            accounts: vec![
                account("a1", "black", 980, 123_456),
                account("a2", "white", 840, -50),
                account("a3", "black", 826, 0),
            ],
            ..ClientInfo::default()
        };
        let portfolio = PortfolioAccount::from_client_info(&info);
        assert_eq!(portfolio.len(), 3);
        assert_eq!(portfolio[0].currency, "UAH");
        assert_eq!(portfolio[0].balance, 1234.56);
        assert_eq!(portfolio[0].credit_limit, 10_000.0);
        assert_eq!(portfolio[1].currency, "USD");
        assert_eq!(portfolio[1].balance, -0.5);
        assert_eq!(portfolio[2].currency, "826");

        let json = serde_json::to_value(&portfolio[0]).expect("serializes");
        assert_eq!(json["type"], "black");
        assert_eq!(json["cashback_type"], "UAH");
    }

    #[test]
    fn expense_stats_sum_only_expenses_largest_first() {
        let items = vec![
            item(1, "Coffee", -5_050, 5814),
            item(2, "Salary", 1_000_000, 4829),
            item(3, "Groceries", -20_000, 5411),
            item(4, "Coffee", -5_050, 5814),
            item(5, "Snacks", -1_001, 5411),
        ];
        let stats = ExpenseStats::from_items(&items, 30);
        assert_eq!(stats.period_days, 30);
        assert_eq!(stats.total_spent, 311.01);
        let mccs: Vec<&str> = stats.by_category.iter().map(|c| c.mcc.as_str()).collect();
        assert_eq!(mccs, ["5411", "5814"]);
        assert_eq!(stats.by_category[0].amount, 210.01);
        assert_eq!(stats.by_category[1].amount, 101.0);
        assert_eq!(stats.by_category[1].category, "Fast Food");
    }

    #[test]
    fn expense_stats_of_income_only_is_empty() {
        let stats = ExpenseStats::from_items(&[item(1, "Salary", 500, 4829)], 7);
        assert_eq!(stats.total_spent, 0.0);
        assert!(stats.by_category.is_empty());
    }

    #[test]
    fn recurring_groups_by_trimmed_description_and_amount() {
        let base = 1_717_200_000;
        let items = vec![
            item(base + 60 * DAY, "Netflix ", -29_900, 4899),
            item(base, "Netflix", -29_900, 4899),
            item(base + 30 * DAY, "Netflix", -29_900, 4899),
            item(base + DAY, "Spotify", -9_900, 4899),
            item(base + 8 * DAY, "Spotify", -9_900, 4899),
            item(base + 2 * DAY, "Spotify", -10_900, 4899),
            item(base + 3 * DAY, "Refund", 9_900, 4899),
            item(base + 4 * DAY, "Refund", 9_900, 4899),
        ];
        let recurring = detect_recurring(&items);
        assert_eq!(recurring.len(), 2);

        let netflix = &recurring[0];
        assert_eq!(netflix.description, "Netflix");
        assert_eq!(netflix.amount, 299.0);
        assert_eq!(netflix.count, 3);
        assert_eq!(netflix.avg_interval_days, 30.0);
        let expected_last = local_from_unix(base + 60 * DAY)
            .expect("valid timestamp")
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        assert_eq!(netflix.last_transaction, expected_last);

        let spotify = &recurring[1];
        assert_eq!(spotify.description, "Spotify");
        assert_eq!(spotify.count, 2);
        assert_eq!(spotify.avg_interval_days, 7.0);
    }

    #[test]
    fn recurring_ties_keep_first_seen_order() {
        let items = vec![
            item(10, "B", -100, 1),
            item(20, "A", -100, 1),
            item(30, "B", -100, 1),
            item(40, "A", -100, 1),
        ];
        let names: Vec<String> = detect_recurring(&items)
            .into_iter()
            .map(|r| r.description)
            .collect();
        assert_eq!(names, ["B", "A"]);
    }

    #[test]
    fn average_interval_rounds_partial_days() {
        assert_eq!(average_interval_days(&[0, 43_200]), 0.5);
        assert_eq!(average_interval_days(&[42]), 0.0);
        assert_eq!(average_interval_days(&[]), 0.0);
    }
}

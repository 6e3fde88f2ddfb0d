//! Markdown spending report across Monobank and Wise.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};

use crate::config::{Bank, Banks};
use crate::transaction::{self, Transaction};

/// Longest description shown in the transactions table.
const TABLE_DESCRIPTION_WIDTH: usize = 40;

/// Longest description shown in the top-expenses table.
const TOP_DESCRIPTION_WIDTH: usize = 35;

/// Number of rows in the top-expenses table.
const TOP_EXPENSES: usize = 10;

/// Cells in the category percentage bar.
const BAR_CELLS: usize = 20;

/// Currency symbol, or `<CODE> ` for currencies without one.
fn currency_symbol(currency: &str) -> String {
    match currency {
        "UAH" => "\u{20b4}".to_owned(),
        "USD" => "$".to_owned(),
        "EUR" => "\u{20ac}".to_owned(),
        "GBP" => "\u{a3}".to_owned(),
        "PLN" => "z\u{142}".to_owned(),
        other => format!("{other} "),
    }
}

/// Formats a non-negative amount with thousands separators and two decimals.
fn group_thousands(amount: f64) -> String {
    let fixed = format!("{amount:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let (sign, digits) = int_part
        .strip_prefix('-')
        .map_or(("", int_part), |rest| ("-", rest));

    let mut grouped = String::with_capacity(digits.len().saturating_add(digits.len() / 3));
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len().saturating_sub(idx)) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{frac_part}")
}

/// Formats an amount with its currency symbol, e.g. `€1,234.50`.
pub(crate) fn format_currency(amount: f64, currency: &str) -> String {
    format!("{}{}", currency_symbol(currency), group_thousands(amount))
}

/// Truncates to `width` characters, appending `...` when shortened.
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width).collect();
        format!("{head}...")
    } else {
        text.to_owned()
    }
}

/// Renders a 20-cell bar for a percentage in `0..=100`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is clamped to 0..=20 before the cast"
)]
fn percent_bar(pct: f64) -> String {
    let filled = (pct / 5.0).floor().clamp(0.0, 20.0) as usize;
    let mut bar = "\u{2588}".repeat(filled);
    bar.push_str(&"\u{2591}".repeat(BAR_CELLS.saturating_sub(filled)));
    bar
}

/// Adds `amount` to the running total for `key`.
fn add_to(totals: &mut BTreeMap<String, f64>, key: &str, amount: f64) {
    *totals.entry(key.to_owned()).or_insert(0.0) += amount;
}

/// Source column label, e.g. `🏦 black`.
fn source_label(tx: &Transaction) -> String {
    if tx.account_type.is_empty() {
        tx.source.label().to_owned()
    } else {
        format!("{} {}", tx.source.emoji(), tx.account_type)
    }
}

/// Renders the report for `transactions` covering the `days` before `now`.
///
/// `transactions` are listed in the order given; callers pass them newest
/// first.
#[allow(clippy::too_many_lines, reason = "one section after another")]
pub(crate) fn render(transactions: &[Transaction], days: u32, now: NaiveDateTime) -> String {
    let start = transaction::window_start(now, days);
    let expenses: Vec<&Transaction> = transactions.iter().filter(|t| t.is_expense).collect();
    let income: Vec<&Transaction> = transactions.iter().filter(|t| !t.is_expense).collect();

    let mut expense_by_currency: BTreeMap<String, f64> = BTreeMap::new();
    let mut by_category: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for tx in &expenses {
        add_to(&mut expense_by_currency, &tx.currency, tx.amount.abs());
        add_to(
            by_category.entry(tx.currency.clone()).or_default(),
            &tx.category,
            tx.amount.abs(),
        );
    }
    let mut income_by_currency: BTreeMap<String, f64> = BTreeMap::new();
    for tx in &income {
        add_to(&mut income_by_currency, &tx.currency, tx.amount.abs());
    }

    let mut lines: Vec<String> = Vec::new();

    let period_name = if days <= 7 {
        "Weekly".to_owned()
    } else {
        format!("{days}-Day")
    };
    lines.push(format!("# \u{1f4ca} {period_name} Spending Report"));
    lines.push(String::new());
    lines.push(format!(
        "**Period:** {} \u{2013} {}",
        start.format("%B %d"),
        now.format("%B %d, %Y")
    ));
    lines.push(String::new());
    lines.push("---".to_owned());
    lines.push(String::new());

    lines.push("## \u{1f4cb} All Transactions".to_owned());
    lines.push(String::new());
    lines.push("| Date | Description | Amount | Category | Source |".to_owned());
    lines.push("|:-----|:------------|-------:|:---------|:------:|".to_owned());
    for tx in transactions {
        let amount = if tx.amount < 0.0 {
            format!("-{}", format_currency(tx.amount.abs(), &tx.currency))
        } else {
            format!("+{}", format_currency(tx.amount, &tx.currency))
        };
        lines.push(format!(
            "| {} | {} | {amount} | {} | {} |",
            tx.date.format("%b %d %H:%M"),
            truncate(&tx.description, TABLE_DESCRIPTION_WIDTH),
            tx.category,
            source_label(tx),
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "*Total: {} transactions ({} expenses, {} income)*",
        transactions.len(),
        expenses.len(),
        income.len()
    ));
    lines.push(String::new());

    lines.push("---".to_owned());
    lines.push(String::new());
    lines.push("## \u{1f4b0} Summary".to_owned());
    lines.push(String::new());
    lines.push("### Expenses".to_owned());
    for (currency, amount) in &expense_by_currency {
        lines.push(format!("- **{currency}**: {}", format_currency(*amount, currency)));
    }
    if !income_by_currency.is_empty() {
        lines.push(String::new());
        lines.push("### Income".to_owned());
        for (currency, amount) in &income_by_currency {
            lines.push(format!("- **{currency}**: +{}", format_currency(*amount, currency)));
        }
    }
    lines.push(String::new());

    for (currency, categories) in &by_category {
        if categories.is_empty() {
            continue;
        }
        let total: f64 = categories.values().sum();
        lines.push("---".to_owned());
        lines.push(String::new());
        lines.push(format!("## \u{1f4c2} {currency} Expenses by Category"));
        lines.push(String::new());
        lines.push("| Category | Amount | % |".to_owned());
        lines.push("|:---------|-------:|--:|".to_owned());

        let mut sorted: Vec<(&String, &f64)> = categories.iter().collect();
        sorted.sort_by(|a, b| b.1.total_cmp(a.1));
        for (category, amount) in sorted {
            let pct = if total > 0.0 { amount / total * 100.0 } else { 0.0 };
            lines.push(format!(
                "| {category} | {} | {pct:.0}% {} |",
                format_currency(*amount, currency),
                percent_bar(pct)
            ));
        }
        lines.push(format!(
            "| **Total** | **{}** | |",
            format_currency(total, currency)
        ));
        lines.push(String::new());
    }

    if !expenses.is_empty() {
        let mut top = expenses.clone();
        top.sort_by(|a, b| b.amount.abs().total_cmp(&a.amount.abs()));
        lines.push("---".to_owned());
        lines.push(String::new());
        lines.push("## \u{1f51d} Top 10 Expenses".to_owned());
        lines.push(String::new());
        lines.push("| # | Date | Description | Amount | Source |".to_owned());
        lines.push("|:-:|:-----|:------------|-------:|:------:|".to_owned());
        for (rank, tx) in top.iter().take(TOP_EXPENSES).enumerate() {
            lines.push(format!(
                "| {} | {} | {} | {} | {} {} |",
                rank.saturating_add(1),
                tx.date.format("%b %d"),
                truncate(&tx.description, TOP_DESCRIPTION_WIDTH),
                format_currency(tx.amount.abs(), &tx.currency),
                tx.source.emoji(),
                tx.source,
            ));
        }
        lines.push(String::new());
    }

    let mut daily: HashMap<String, BTreeMap<String, f64>> = HashMap::new();
    for tx in &expenses {
        let day = tx.date.format("%a %d").to_string();
        add_to(daily.entry(day).or_default(), &tx.currency, tx.amount.abs());
    }
    if !daily.is_empty() {
        let currencies: BTreeSet<&String> = daily.values().flat_map(BTreeMap::keys).collect();
        lines.push("---".to_owned());
        lines.push(String::new());
        lines.push("## \u{1f4c5} Daily Spending".to_owned());
        lines.push(String::new());
        let header: Vec<&str> = currencies.iter().map(|c| c.as_str()).collect();
        lines.push(format!("| Day |{} |", header.join(" | ")));
        lines.push(format!(
            "|:----|{}|",
            vec!["-----:"; currencies.len()].join("|")
        ));

        let mut current = start;
        while current <= now {
            let day = current.format("%a %d").to_string();
            let mut row = format!("| {day} |");
            for currency in &currencies {
                let amount = daily
                    .get(&day)
                    .and_then(|per_currency| per_currency.get(*currency))
                    .copied()
                    .unwrap_or(0.0);
                if amount > 0.0 {
                    row.push(' ');
                    row.push_str(&format_currency(amount, currency));
                    row.push_str(" |");
                } else {
                    row.push_str(" \u{2014} |");
                }
            }
            lines.push(row);
            current += TimeDelta::days(1);
        }
        lines.push(String::new());
    }

    lines.push("---".to_owned());
    lines.push(String::new());
    lines.push(format!("*Generated on {}*", now.format("%Y-%m-%d %H:%M:%S")));

    lines.join("\n")
}

/// Collects transactions from the selected banks, newest first.
///
/// A bank that is not configured or fails is logged and left out.
pub(crate) async fn fetch_all_transactions(
    banks: &Banks,
    selected: &[Bank],
    days: u32,
) -> Vec<Transaction> {
    let mut all = Vec::new();

    if selected.contains(&Bank::Mono) {
        match banks.monobank() {
            Ok(client) => match client.all_transactions(days).await {
                Ok(txs) => all.extend(txs),
                Err(err) => tracing::warn!(%err, "monobank transactions unavailable"),
            },
            Err(err) => tracing::warn!(%err, "monobank skipped"),
        }
    }
    if selected.contains(&Bank::Wise) {
        match banks.wise() {
            Ok(client) => match client.all_transactions(days).await {
                Ok(txs) => all.extend(txs),
                Err(err) => tracing::warn!(%err, "wise transactions unavailable"),
            },
            Err(err) => tracing::warn!(%err, "wise skipped"),
        }
    }

    transaction::sort_newest_first(&mut all);
    all
}

/// Fetches from `selected` banks and renders the report.
pub(crate) async fn spending_report(banks: &Banks, selected: &[Bank], days: u32) -> String {
    let transactions = fetch_all_transactions(banks, selected, days).await;
    render(&transactions, days, transaction::local_now())
}

/// File name for a saved report, e.g. `spending_2024-06-15_14d_mono_wise.md`.
pub(crate) fn report_file_name(now: NaiveDateTime, days: u32, selected: &[Bank]) -> String {
    let names: BTreeSet<&str> = selected.iter().map(|b| b.as_str()).collect();
    let suffix: Vec<&str> = names.into_iter().collect();
    format!(
        "spending_{}_{days}d_{}.md",
        now.format("%Y-%m-%d"),
        suffix.join("_")
    )
}

/// Writes `report` into `dir` (created if missing) and returns the file path.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub(crate) fn save_report(
    dir: &Path,
    file_name: &str,
    report: &str,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, report)?;
    Ok(path)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::{
        format_currency, percent_bar, render, report_file_name, save_report, truncate,
    };
    use crate::config::Bank;
    use crate::transaction::{Source, Transaction};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .and_then(|d| d.and_hms_opt(hour, 30, 0))
            .expect("valid date for test")
    }

    fn tx(
        day: u32,
        description: &str,
        amount: f64,
        currency: &str,
        category: &str,
        source: Source,
    ) -> Transaction {
        Transaction {
            date: at(day, 10),
            description: description.to_owned(),
            amount,
            currency: currency.to_owned(),
            mcc: None,
            category: category.to_owned(),
            source,
            account_type: match source {
                Source::Monobank => "black".to_owned(),
                Source::Wise => "card".to_owned(),
            },
            is_expense: amount < 0.0,
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx(14, "Silpo", -300.0, "UAH", "Groceries", Source::Monobank),
            tx(13, "Salary", 50_000.0, "UAH", "Money Transfer", Source::Monobank),
            tx(12, "Bolt", -100.0, "UAH", "Taxi & Rideshare", Source::Monobank),
            tx(12, "Lidl", -42.5, "EUR", "Groceries", Source::Wise),
            tx(10, "Silpo", -700.0, "UAH", "Groceries", Source::Monobank),
        ]
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(1234.5, "EUR"), "\u{20ac}1,234.50");
        assert_eq!(format_currency(1_234_567.891, "UAH"), "\u{20b4}1,234,567.89");
        assert_eq!(format_currency(12.0, "CHF"), "CHF 12.00");
        assert_eq!(format_currency(999.999, "USD"), "$1,000.00");
        assert_eq!(format_currency(0.5, "PLN"), "z\u{142}0.50");
    }

    #[test]
    fn truncation_appends_ellipsis() {
        assert_eq!(truncate("short", 40), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn bar_has_twenty_cells() {
        assert_eq!(percent_bar(50.0).chars().count(), 20);
        assert_eq!(percent_bar(100.0), "\u{2588}".repeat(20));
        assert_eq!(percent_bar(0.0), "\u{2591}".repeat(20));
    }

    #[test]
    fn report_has_all_sections() {
        let report = render(&sample(), 14, at(15, 18));
        assert!(report.starts_with("# \u{1f4ca} 14-Day Spending Report"));
        assert!(report.contains("**Period:** June 01 \u{2013} June 15, 2024"));
        assert!(report.contains("*Total: 5 transactions (4 expenses, 1 income)*"));
        assert!(report.contains("- **EUR**: \u{20ac}42.50"));
        assert!(report.contains("- **UAH**: \u{20b4}1,100.00"));
        assert!(report.contains("- **UAH**: +\u{20b4}50,000.00"));
        assert!(report.contains("## \u{1f4c2} UAH Expenses by Category"));
        assert!(report.contains("| Groceries | \u{20b4}1,000.00 | 91% "));
        assert!(report.contains("| **Total** | **\u{20b4}1,100.00** | |"));
        assert!(report.contains("| 1 | Jun 10 | Silpo | \u{20b4}700.00 | \u{1f3e6} Monobank |"));
        assert!(report.contains("| Day |EUR | UAH |"));
        assert!(report.contains("| Wed 12 | \u{20ac}42.50 | \u{20b4}100.00 |"));
        assert!(report.contains("| Sat 01 | \u{2014} | \u{2014} |"));
        assert!(report.ends_with("*Generated on 2024-06-15 18:30:00*"));
    }

    #[test]
    fn short_period_is_weekly_and_income_section_optional() {
        let only_expense = vec![tx(14, "Bolt", -10.0, "UAH", "Taxi", Source::Monobank)];
        let report = render(&only_expense, 7, at(15, 9));
        assert!(report.starts_with("# \u{1f4ca} Weekly Spending Report"));
        assert!(!report.contains("### Income"));
        assert!(report.contains("| Jun 14 10:30 | Bolt | -\u{20b4}10.00 | Taxi | \u{1f3e6} black |"));
    }

    #[test]
    fn empty_report_omits_breakdowns() {
        let report = render(&[], 14, at(15, 9));
        assert!(report.contains("*Total: 0 transactions (0 expenses, 0 income)*"));
        assert!(!report.contains("Top 10 Expenses"));
        assert!(!report.contains("Daily Spending"));
    }

    #[test]
    fn file_name_sorts_banks() {
        let name = report_file_name(at(15, 9), 14, &[Bank::Wise, Bank::Mono]);
        assert_eq!(name, "spending_2024-06-15_14d_mono_wise.md");
    }

    #[test]
    fn saves_into_new_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("reports");
        let path = save_report(&dir, "r.md", "# hi").expect("save");
        assert_eq!(std::fs::read_to_string(path).expect("read back"), "# hi");
    }
}

//! Bank-agnostic transaction record shared by both clients and the report.

use core::fmt;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta};

/// Which bank a normalised transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Source {
    /// Monobank (Ukraine).
    Monobank,
    /// Wise (multi-currency).
    Wise,
}

impl Source {
    /// Display label used in reports.
    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Monobank => "Monobank",
            Self::Wise => "Wise",
        }
    }

    /// Emoji marker used in report tables.
    pub(crate) const fn emoji(self) -> &'static str {
        match self {
            Self::Monobank => "\u{1f3e6}",
            Self::Wise => "\u{1f30d}",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single transaction normalised across banks.
///
/// `amount` is signed and in major currency units: negative values are money
/// leaving the account.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transaction {
    /// Local wall-clock time of the transaction.
    pub(crate) date: NaiveDateTime,
    /// Merchant or counterparty description.
    pub(crate) description: String,
    /// Signed amount in major units.
    pub(crate) amount: f64,
    /// ISO 4217 currency code.
    pub(crate) currency: String,
    /// Merchant category code, when the bank reports one.
    pub(crate) mcc: Option<String>,
    /// Human-readable spending category.
    pub(crate) category: String,
    /// Originating bank.
    pub(crate) source: Source,
    /// Bank-specific account kind (`black`, `fop`, `card`, `transfer`, ...).
    pub(crate) account_type: String,
    /// Whether this is an expense (as opposed to income).
    pub(crate) is_expense: bool,
}

/// Sorts transactions newest first.
pub(crate) fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Start of the reporting window: local midnight `days` days before `now`.
pub(crate) fn window_start(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    let start = now - TimeDelta::days(i64::from(days));
    start.date().and_time(NaiveTime::default())
}

/// Current local wall-clock time.
pub(crate) fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Converts a unix timestamp (seconds) to local wall-clock time.
pub(crate) fn local_from_unix(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|utc| utc.with_timezone(&Local).naive_local())
}

/// Rounds to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use chrono::NaiveDate;

    use super::{Source, Transaction, round_to, sort_newest_first, window_start};

    fn at(day: u32, hour: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid date for test")
    }

    fn tx(day: u32) -> Transaction {
        Transaction {
            date: at(day, 12),
            description: format!("tx {day}"),
            amount: -1.0,
            currency: "EUR".to_owned(),
            mcc: None,
            category: "Card Payment".to_owned(),
            source: Source::Wise,
            account_type: "card".to_owned(),
            is_expense: true,
        }
    }

    #[test]
    fn window_starts_at_midnight() {
        assert_eq!(window_start(at(15, 18), 7), at(8, 0));
    }

    #[test]
    fn sorts_newest_first() {
        let mut txs = vec![tx(3), tx(9), tx(5)];
        sort_newest_first(&mut txs);
        let days: Vec<&str> = txs.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(days, vec!["tx 9", "tx 5", "tx 3"]);
    }

    #[test]
    fn rounding() {
        assert!((round_to(12.345_6, 2) - 12.35).abs() < 1e-9);
        assert!((round_to(2.25, 1) - 2.3).abs() < 1e-9);
    }

    #[test]
    fn source_labels() {
        assert_eq!(Source::Monobank.to_string(), "Monobank");
        assert_eq!(Source::Wise.label(), "Wise");
    }
}

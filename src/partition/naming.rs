use chrono::{Datelike, Months, NaiveDate};

/// First day of the month containing `date`.
#[must_use]
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// `"<table>_<yyyy>_<mm>"` for the month containing `date`.
#[must_use]
pub fn partition_name(table: &str, date: NaiveDate) -> String {
    let start = month_start(date);
    format!("{table}_{:04}_{:02}", start.year(), start.month())
}

/// `[first of month, first of next month)` for the month containing `date`.
#[must_use]
pub fn partition_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_start(date);
    let end = start
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (start, end)
}

/// Month start `offset` months after the month containing `date`.
#[must_use]
pub fn shift_months(date: NaiveDate, offset: u32) -> Option<NaiveDate> {
    month_start(date).checked_add_months(Months::new(offset))
}

/// Accepts lowercase SQL identifiers that are safe to splice into DDL.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 63
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn name_is_zero_padded_and_month_based() {
        assert_eq!(partition_name("logs", date(2025, 3, 31)), "logs_2025_03");
        assert_eq!(partition_name("log_metrics", date(2025, 11, 1)), "log_metrics_2025_11");
    }

    #[rstest]
    #[case(date(2025, 12, 15), date(2025, 12, 1), date(2026, 1, 1))]
    #[case(date(2024, 2, 29), date(2024, 2, 1), date(2024, 3, 1))]
    #[case(date(2025, 1, 1), date(2025, 1, 1), date(2025, 2, 1))]
    fn range_covers_calendar_month(
        #[case] input: NaiveDate,
        #[case] start: NaiveDate,
        #[case] end: NaiveDate,
    ) {
        assert_eq!(partition_range(input), (start, end));
    }

    #[test]
    fn shift_crosses_year_boundary() {
        assert_eq!(shift_months(date(2025, 11, 20), 3), Some(date(2026, 2, 1)));
    }

    #[rstest]
    #[case("logs", true)]
    #[case("log_metrics_2", true)]
    #[case("", false)]
    #[case("Logs", false)]
    #[case("logs; drop table x", false)]
    #[case("9logs", false)]
    fn identifier_validation(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_identifier(name), valid);
    }
}

//! Danish display formatting for prices and dates.

use chrono::{DateTime, Datelike, Utc};

const MONTHS: [&str; 12] = [
    "januar", "februar", "marts", "april", "maj", "juni", "juli", "august", "september",
    "oktober", "november", "december",
];

/// `1234567.5` → `1.234.567,50`
pub fn format_price(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}{},{:02}", sign, grouped, cents % 100)
}

/// Whole days between `created_at` and `now`, rounded down
pub fn days_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_seconds().div_euclid(86_400)
}

/// Month and year as written on review cards, e.g. `oktober 2024`
pub fn format_month_year(date: DateTime<Utc>) -> String {
    format!("{} {}", MONTHS[date.month0() as usize], date.year())
}

/// Full date as shown on the user page, e.g. `03. maj 2024`
pub fn format_day_month_year(date: DateTime<Utc>) -> String {
    format!("{:02}. {}", date.day(), format_month_year(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prices_use_danish_separators() {
        assert_eq!(format_price(1_234_567.5), "1.234.567,50");
        assert_eq!(format_price(995_000.0), "995.000,00");
        assert_eq!(format_price(0.0), "0,00");
        assert_eq!(format_price(12.346), "12,35");
        assert_eq!(format_price(-4_500.0), "-4.500,00");
    }

    #[test]
    fn days_are_floored() {
        let created = Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 10, 3, 11, 59, 0).unwrap();
        assert_eq!(days_since(created, now), 1);
        assert_eq!(days_since(created, created), 0);
    }

    #[test]
    fn month_names_are_danish() {
        let date = Utc.with_ymd_and_hms(2024, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(format_month_year(date), "oktober 2024");
        let date = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_month_year(date), "marts 2023");
    }

    #[test]
    fn full_dates_pad_the_day() {
        let date = Utc.with_ymd_and_hms(2024, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(format_day_month_year(date), "19. oktober 2024");
        let date = Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap();
        assert_eq!(format_day_month_year(date), "03. maj 2024");
    }
}

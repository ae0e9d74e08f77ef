//! Display helpers shared by every page.

use chrono::{DateTime, Utc};

use crate::product::ProductStatus;

/// Label for a raw status string; unknown statuses are title-cased.
pub fn status_label(raw: &str) -> String {
    match raw.parse::<ProductStatus>() {
        Ok(status) => status.label().to_string(),
        Err(_) => title_case(raw),
    }
}

fn title_case(raw: &str) -> String {
    raw.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// US-dollar amount with thousands separators, e.g. `$1,234.50`.
pub fn format_currency(amount: f64) -> String {
    let amount = if amount.is_finite() { amount } else { 0.0 };
    let cents = (amount.abs() * 100.0).round() as u64;
    let (whole, frac) = (cents / 100, cents % 100);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{frac:02}")
}

/// Relative time such as "Just now", "5 minutes ago" or "1 year ago".
///
/// Timestamps in the future read as "Just now".
pub fn format_time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds();
    if seconds < 60 {
        return "Just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    let days = hours / 24;
    if days < 30 {
        return plural(days, "day");
    }
    let months = days / 30;
    if months < 12 {
        return plural(months, "month");
    }
    plural(months / 12, "year")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_labels() {
        assert_eq!(status_label("active"), "In Stock");
        assert_eq!(status_label("out_of_stock"), "Out of Stock");
        assert_eq!(status_label("on_order"), "On Order");
    }

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(12.5), "$12.50");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-999.999), "-$1,000.00");
        assert_eq!(format_currency(f64::NAN), "$0.00");
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(format_time_ago(now - Duration::seconds(30), now), "Just now");
        assert_eq!(format_time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_time_ago(now - Duration::minutes(45), now), "45 minutes ago");
        assert_eq!(format_time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_time_ago(now - Duration::days(2), now), "2 days ago");
        assert_eq!(format_time_ago(now - Duration::days(65), now), "2 months ago");
        assert_eq!(format_time_ago(now - Duration::days(800), now), "2 years ago");
        assert_eq!(format_time_ago(now + Duration::hours(1), now), "Just now");
    }
}

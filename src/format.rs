use chrono::{DateTime, Utc};
use timeago::{Formatter, TimeUnit};

const MINUTES_IN_DAY: f64 = 1_440.0;
const MINUTES_IN_MONTH: f64 = 43_200.0;
const MINUTES_IN_YEAR: f64 = 525_600.0;

/// Largest unit that keeps the count at least one, with the count rounded to
/// the nearest whole unit. A month is 30 days.
fn strict_unit(minutes: f64) -> (u32, TimeUnit) {
    let (count, unit) = if minutes < 1.0 {
        ((minutes * 60.0).round(), TimeUnit::Seconds)
    } else if minutes < 60.0 {
        (minutes.round(), TimeUnit::Minutes)
    } else if minutes < MINUTES_IN_DAY {
        ((minutes / 60.0).round(), TimeUnit::Hours)
    } else if minutes < MINUTES_IN_MONTH {
        ((minutes / MINUTES_IN_DAY).round(), TimeUnit::Days)
    } else if minutes < MINUTES_IN_YEAR {
        match (minutes / MINUTES_IN_MONTH).round() {
            months if months >= 12.0 => (1.0, TimeUnit::Years),
            months => (months, TimeUnit::Months),
        }
    } else {
        ((minutes / MINUTES_IN_YEAR).round(), TimeUnit::Years)
    };
    (count as u32, unit)
}

/// "5 minutes", "3 hours", "1 year". The count is rounded before `timeago`
/// renders it in exactly the chosen unit.
pub fn distance_strict(then: DateTime<Utc>, now: DateTime<Utc>, add_suffix: bool) -> String {
    let millis = (now - then).num_milliseconds();
    let in_future = millis < 0;
    let (count, unit) = strict_unit(millis.unsigned_abs() as f64 / 60_000.0);

    let elapsed = unit.min_duration() * count;
    let mut formatter = Formatter::new();
    formatter
        .num_items(1)
        .min_unit(unit)
        .max_unit(unit)
        .too_low("0 seconds")
        .ago("");
    let rendered = formatter.convert(elapsed);
    let distance = rendered.trim();

    match (add_suffix, in_future) {
        (false, _) => distance.to_string(),
        (true, true) => format!("in {distance}"),
        (true, false) => format!("{distance} ago"),
    }
}

/// Distance from a unix timestamp (seconds) to now, or `None` for a missing timestamp.
pub fn distance_to_now_strict(unix_time: Option<i64>, add_suffix: bool) -> Option<String> {
    let then = DateTime::from_timestamp(unix_time?, 0)?;
    Some(distance_strict(then, Utc::now(), add_suffix))
}

pub fn format_gp(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let value = value.abs();
    if value >= 1_000_000_000.0 {
        format!("{sign}{:.2}B", value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("{sign}{:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{sign}{:.1}K", value / 1_000.0)
    } else {
        format!("{sign}{:.0}", value)
    }
}

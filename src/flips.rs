//! Flip math for a single item. Every function is pure and treats `None` as
//! "no data"; a price or volume of zero is a real value.

use thousands::Separable;

pub const TAX_FREE_BELOW: i64 = 100;
pub const TAX_CAP_FROM: i64 = 500_000_000;
pub const TAX_CAP: i64 = 5_000_000;

/// Grand Exchange tax, always charged on the buy side.
pub fn tax(insta_buy: Option<i64>) -> i64 {
    match insta_buy {
        None => 0,
        Some(price) if price < TAX_FREE_BELOW => 0,
        Some(price) if price >= TAX_CAP_FROM => TAX_CAP,
        Some(price) => price / 100, // floor(price * 0.01), price is positive here
    }
}

pub fn margin(insta_buy: Option<i64>, insta_sell: Option<i64>) -> Option<i64> {
    Some(insta_buy? - insta_sell?)
}

pub fn profit(insta_buy: Option<i64>, insta_sell: Option<i64>) -> Option<i64> {
    Some(margin(insta_buy, insta_sell)? - tax(insta_buy))
}

pub fn potential_profit(
    insta_buy: Option<i64>,
    insta_sell: Option<i64>,
    limit: Option<i64>,
) -> Option<i64> {
    Some(profit(insta_buy, insta_sell)?.saturating_mul(limit?))
}

/// Profit as a percentage of the sell side price.
pub fn roi(insta_buy: Option<i64>, insta_sell: Option<i64>) -> Option<f64> {
    let sell = insta_sell?;
    if sell == 0 {
        return None;
    }
    let profit = profit(insta_buy, insta_sell)?;
    Some(profit as f64 / sell as f64 * 100.0)
}

/// Value of alching one item bought at `insta_sell`, net of the rune cost.
pub fn alch_profit(
    insta_sell: Option<i64>,
    alch_value: Option<i64>,
    reference_price: Option<i64>,
) -> Option<i64> {
    Some(alch_value? - insta_sell? - reference_price?)
}

/// Renders ROI with at most two decimals and grouped thousands, e.g. `1,234.5%`.
pub fn roi_output(roi: Option<f64>) -> Option<String> {
    let mut value = roi?;
    if !value.is_finite() {
        return None;
    }
    // -0.004 would otherwise print as -0%
    if value < 0.0 && value.abs() < 0.01 {
        value = 0.0;
    }

    let hundredths = (value * 100.0).round() as i64;
    let sign = if hundredths < 0 { "-" } else { "" };
    let hundredths = hundredths.unsigned_abs();
    let whole = (hundredths / 100).separate_with_commas();
    let frac = hundredths % 100;

    let out = if frac == 0 {
        format!("{sign}{whole}%")
    } else if frac % 10 == 0 {
        format!("{sign}{whole}.{}%", frac / 10)
    } else {
        format!("{sign}{whole}.{frac:02}%")
    };
    Some(out)
}

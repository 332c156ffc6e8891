use crate::error::{AppError, AppResult};

pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    let whole = abs / 100;
    let frac = abs % 100;
    format!("{sign}{whole}.{frac:02}")
}

/// Parses a non-negative amount with at most two decimals. Accepts `,` as the
/// decimal separator.
pub fn parse_amount_to_cents(input: &str) -> Option<i64> {
    let s = input.trim().replace(',', ".");
    if s.is_empty() || s.starts_with('-') || s.starts_with('+') {
        return None;
    }
    let mut parts = s.split('.');
    let whole_str = parts.next()?;
    let frac_str = parts.next();
    if parts.next().is_some() {
        return None;
    }
    let whole: i64 = if whole_str.is_empty() {
        0
    } else {
        whole_str.parse().ok()?
    };
    let frac = match frac_str {
        None => 0,
        Some(frac) => {
            if frac.is_empty() || frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let mut padded = frac.to_string();
            while padded.len() < 2 {
                padded.push('0');
            }
            padded.parse::<i64>().ok()?
        }
    };
    whole.checked_mul(100)?.checked_add(frac)
}

/// Amount rule for new transactions and budget entries: must parse and be > 0.
pub fn positive_amount(input: &str) -> AppResult<i64> {
    match parse_amount_to_cents(input) {
        Some(cents) if cents > 0 => Ok(cents),
        _ => Err(AppError::Validation(
            "Valor da transação inválido ou menor que zero.".to_string(),
        )),
    }
}

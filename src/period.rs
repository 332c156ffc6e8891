//! Resolution of dashboard filter parameters into a concrete date window.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::{AppError, AppResult};

const MONTH_NAMES: [&str; 12] = [
    "janeiro",
    "fevereiro",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterKind {
    #[serde(rename = "7_days")]
    SevenDays,
    #[serde(rename = "30_days")]
    ThirtyDays,
    #[serde(rename = "12_months")]
    TwelveMonths,
    #[serde(rename = "all_time")]
    AllTime,
    #[serde(rename = "current_month")]
    CurrentMonth,
    #[serde(rename = "custom_month")]
    CustomMonth,
}

impl FilterKind {
    pub const RELATIVE: [FilterKind; 5] = [
        FilterKind::SevenDays,
        FilterKind::ThirtyDays,
        FilterKind::TwelveMonths,
        FilterKind::AllTime,
        FilterKind::CurrentMonth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::SevenDays => "7_days",
            FilterKind::ThirtyDays => "30_days",
            FilterKind::TwelveMonths => "12_months",
            FilterKind::AllTime => "all_time",
            FilterKind::CurrentMonth => "current_month",
            FilterKind::CustomMonth => "custom_month",
        }
    }

    /// Relative presets only; anything else (including `custom_month`) is `None`.
    pub fn relative(value: &str) -> Option<FilterKind> {
        FilterKind::RELATIVE
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }
}

/// A resolved, request-scoped time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub label: String,
    pub filter: FilterKind,
    /// `YYYY-MM` of `start`; selects the budget entries.
    pub budget_month: String,
    /// `YYYY-MM` shown in the month picker.
    pub selected_month: String,
}

impl Period {
    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }
}

/// Parses the leading `YYYY-MM` of an explicit month value.
pub fn parse_year_month(value: &str) -> AppResult<(i32, u32)> {
    let invalid = || AppError::InvalidFilter(value.to_string());
    let head = value.get(..7).ok_or_else(invalid)?;
    let bytes = head.as_bytes();
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    if bytes[4] != b'-' || !digits(0..4) || !digits(5..7) {
        return Err(invalid());
    }
    let year: i32 = head[..4].parse().map_err(|_| invalid())?;
    let month: u32 = head[5..].parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// An explicit, non-empty `month_year` always wins over `filter`. Unknown or
/// missing filters fall back to the current month.
pub fn resolve(
    month_year: Option<&str>,
    filter: Option<&str>,
    today: NaiveDate,
) -> AppResult<Period> {
    if let Some(value) = month_year.map(str::trim).filter(|value| !value.is_empty()) {
        let (year, month) = parse_year_month(value)?;
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::InvalidFilter(value.to_string()))?;
        return Ok(month_period(first, FilterKind::CustomMonth));
    }

    let kind = filter
        .and_then(FilterKind::relative)
        .unwrap_or(FilterKind::CurrentMonth);
    let end = end_of_day(today);
    let (start, label) = match kind {
        FilterKind::SevenDays => (today - chrono::Days::new(7), "Últimos 7 dias".to_string()),
        FilterKind::ThirtyDays => (today - chrono::Days::new(30), "Últimos 30 dias".to_string()),
        FilterKind::TwelveMonths => (
            today
                .checked_sub_months(Months::new(12))
                .unwrap_or(NaiveDate::MIN),
            "Últimos 12 meses".to_string(),
        ),
        FilterKind::AllTime => (epoch(), "Todo o período".to_string()),
        FilterKind::CurrentMonth | FilterKind::CustomMonth => {
            return Ok(month_period(first_of_month(today), FilterKind::CurrentMonth));
        }
    };

    Ok(Period {
        start: start.and_time(NaiveTime::MIN),
        end,
        label,
        filter: kind,
        budget_month: month_key(start),
        selected_month: month_key(today),
    })
}

fn month_period(first: NaiveDate, filter: FilterKind) -> Period {
    let last = last_of_month(first);
    Period {
        start: first.and_time(NaiveTime::MIN),
        end: end_of_day(last),
        label: month_label(first),
        filter,
        budget_month: month_key(first),
        selected_month: month_key(first),
    }
}

pub fn month_label(date: NaiveDate) -> String {
    let name = MONTH_NAMES[date.month0() as usize];
    format!("{name} de {}", date.year())
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(first: NaiveDate) -> NaiveDate {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

use serde::Serialize;
use url::form_urlencoded;

use crate::error::AppError;
use crate::period::{FilterKind, Period};

pub const DASHBOARD: &str = "/dashboard";

/// Period selection carried across a mutation round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    pub period_filter: Option<String>,
    pub month_year_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Notice(String),
    Error(String),
}

impl StatusMessage {
    pub fn notice(text: impl Into<String>) -> Self {
        StatusMessage::Notice(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        StatusMessage::Error(text.into())
    }
}

impl From<&AppError> for StatusMessage {
    fn from(err: &AppError) -> Self {
        StatusMessage::Error(err.user_message())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl FilterState {
    pub fn new(period_filter: Option<&str>, month_year_filter: Option<&str>) -> Self {
        Self {
            period_filter: non_empty(period_filter),
            month_year_filter: non_empty(month_year_filter),
        }
    }

    /// State that re-selects `period` on the next render.
    pub fn from_period(period: &Period) -> Self {
        match period.filter {
            FilterKind::CustomMonth => Self {
                period_filter: None,
                month_year_filter: Some(period.selected_month.clone()),
            },
            kind => Self {
                period_filter: Some(kind.as_str().to_string()),
                month_year_filter: None,
            },
        }
    }

    /// The explicit month shadows the relative filter, so only one is emitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        if let Some(month) = &self.month_year_filter {
            vec![("month_year_filter", month.as_str())]
        } else if let Some(filter) = &self.period_filter {
            vec![("period_filter", filter.as_str())]
        } else {
            Vec::new()
        }
    }

    pub fn dashboard_uri(&self, message: Option<&StatusMessage>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        match message {
            Some(StatusMessage::Notice(text)) => {
                query.append_pair("msg", text);
            }
            Some(StatusMessage::Error(text)) => {
                query.append_pair("err", text);
            }
            None => {}
        }
        for (key, value) in self.query_pairs() {
            query.append_pair(key, value);
        }
        let query = query.finish();
        if query.is_empty() {
            DASHBOARD.to_string()
        } else {
            format!("{DASHBOARD}?{query}")
        }
    }
}

//! Retention windows accepted by the mail delete API.

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;

/// The fixed set of prune windows a caller may request. Each converts to a
/// date threshold: mail received on or before the threshold is pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PruneCode {
    #[serde(rename = "60plus")]
    SixtyDaysPlus,
    #[serde(rename = "30plus")]
    ThirtyDaysPlus,
    #[serde(rename = "2wksplus")]
    TwoWeeksPlus,
    #[serde(rename = "all")]
    All,
}

impl PruneCode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "60plus" => Some(Self::SixtyDaysPlus),
            "30plus" => Some(Self::ThirtyDaysPlus),
            "2wksplus" => Some(Self::TwoWeeksPlus),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SixtyDaysPlus => "60plus",
            Self::ThirtyDaysPlus => "30plus",
            Self::TwoWeeksPlus => "2wksplus",
            Self::All => "all",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SixtyDaysPlus => "Older than 60 days",
            Self::ThirtyDaysPlus => "Older than 30 days",
            Self::TwoWeeksPlus => "Older than 2 weeks",
            Self::All => "All emails",
        }
    }

    /// ISO date (`YYYY-MM-DD`) marking the newest mail this window deletes.
    pub fn date_threshold(&self) -> String {
        self.threshold_from(Local::now().date_naive())
    }

    fn threshold_from(&self, today: NaiveDate) -> String {
        let threshold = match self {
            Self::SixtyDaysPlus => today - Duration::days(60),
            Self::ThirtyDaysPlus => today - Duration::days(30),
            Self::TwoWeeksPlus => today - Duration::days(14),
            Self::All => today,
        };

        threshold.format("%Y-%m-%d").to_string()
    }
}

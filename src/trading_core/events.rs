//! Economic calendar events
//!
//! The feed is consumed as-is. Only importance, currency and timing matter
//! here; what an event means is left to the reader.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NEWS_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub date: DateTime<Utc>,
    pub importance: ImpactLevel,
    pub currency: String,
    pub description: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub actual: Option<f64>,
    #[serde(default)]
    pub forecast: Option<f64>,
    #[serde(default)]
    pub previous: Option<f64>,
}

impl EconomicEvent {
    fn is_high_impact_for(&self, currency: &str) -> bool {
        self.importance == ImpactLevel::High && self.currency.eq_ignore_ascii_case(currency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighImpactNews {
    pub has_high_impact_news: bool,
    pub count: usize,
    pub events: Vec<EconomicEvent>,
    pub summary: String,
}

fn summarize(events: &[EconomicEvent]) -> String {
    let mut descriptions: Vec<&str> = Vec::new();
    for event in events {
        if !descriptions.contains(&event.description.as_str()) {
            descriptions.push(&event.description);
        }
    }

    match descriptions.as_slice() {
        [] => "No high-impact news today.".to_string(),
        [only] => format!("1 high-impact release today: {}.", only),
        [init @ .., last] => format!(
            "{} high-impact releases today: {} and {}.",
            events.len(),
            init.join(", "),
            last
        ),
    }
}

/// High-importance events for `currency` (case-insensitive), in feed order
pub fn high_impact_news(events: &[EconomicEvent], currency: &str) -> HighImpactNews {
    let events: Vec<EconomicEvent> = events.iter().filter(|e| e.is_high_impact_for(currency)).cloned().collect();
    HighImpactNews {
        has_high_impact_news: !events.is_empty(),
        count: events.len(),
        summary: summarize(&events),
        events,
    }
}

/// High-impact USD events strictly after `now` and no later than `now + window`, soonest first
pub fn upcoming_high_impact(events: &[EconomicEvent], now: DateTime<Utc>, window: Duration) -> Vec<EconomicEvent> {
    let cutoff = now + window;
    let mut upcoming: Vec<EconomicEvent> = events
        .iter()
        .filter(|e| e.is_high_impact_for(DEFAULT_NEWS_CURRENCY) && e.date > now && e.date <= cutoff)
        .cloned()
        .collect();
    upcoming.sort_by_key(|e| e.date);
    upcoming
}

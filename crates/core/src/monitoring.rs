//! Deterministic half of the monitoring flow: health scoring from the
//! sentiment history, trend detection, and the alert rules. Sentiment
//! scores come from the model; everything downstream of them is pure.

use serde::{Deserialize, Serialize};

use crate::domain::alert::{Alert, AlertSeverity, AlertType};
use crate::domain::deal::DealId;

/// Sentiment for one communication. `index` is the position in the
/// newest-first communication list, so index 0 carries the most weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub index: usize,
    /// Score in [-1, 1].
    pub score: f64,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl SentimentReading {
    pub fn neutral(index: usize) -> Self {
        Self { index, score: 0.0, signals: Vec::new(), summary: String::new() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthWeights {
    /// Points of health a full-strength sentiment swing is worth.
    pub sentiment_weight: f64,
    /// Geometric decay applied per step away from the newest reading.
    pub decay: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self { sentiment_weight: 15.0, decay: 0.6 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: u8,
    pub trend: Trend,
    /// The decayed aggregate sentiment the score was derived from.
    pub weighted_sentiment: f64,
}

/// Recency-weighted aggregate of the reading history. Readings are ordered
/// newest first; each step back is discounted geometrically.
pub fn weighted_sentiment(readings: &[SentimentReading], weights: &HealthWeights) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    let mut divisor = 0.0;
    let mut weight = 1.0;
    for reading in readings {
        total += reading.score.clamp(-1.0, 1.0) * weight;
        divisor += weight;
        weight *= weights.decay;
    }
    total / divisor
}

/// Pure health computation: base score adjusted by the weighted sentiment,
/// clamped to 0..=100, with a five-point dead zone on the trend.
pub fn health_report(
    base_score: u8,
    readings: &[SentimentReading],
    weights: &HealthWeights,
) -> HealthReport {
    let sentiment = weighted_sentiment(readings, weights);
    let adjusted = f64::from(base_score.min(100)) + sentiment * weights.sentiment_weight;
    let score = adjusted.round().clamp(0.0, 100.0) as u8;

    let delta = i16::from(score) - i16::from(base_score.min(100));
    let trend = if delta > 5 {
        Trend::Up
    } else if delta < -5 {
        Trend::Down
    } else {
        Trend::Stable
    };

    HealthReport { score, trend, weighted_sentiment: sentiment }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Weighted sentiment below this fires a sentiment_drop warning.
    pub sentiment_drop: f64,
    /// Weighted sentiment below this escalates the drop to critical.
    pub sentiment_critical: f64,
    /// Weighted sentiment above this, with nothing else firing, produces a
    /// positive_update info alert.
    pub positive_update: f64,
    /// Health score below this fires health_critical.
    pub health_floor: u8,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self { sentiment_drop: -0.3, sentiment_critical: -0.6, positive_update: 0.2, health_floor: 50 }
    }
}

fn mentions_competitor(readings: &[SentimentReading]) -> Option<&str> {
    readings
        .iter()
        .flat_map(|reading| reading.signals.iter())
        .find(|signal| signal.to_lowercase().contains("competitor"))
        .map(|signal| signal.as_str())
}

/// Applies the alert rules to the current readings and health report.
/// Produces candidates only; persistence and dedup against prior alerts
/// happen elsewhere.
pub fn detect_alerts(
    deal_id: &DealId,
    readings: &[SentimentReading],
    health: &HealthReport,
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let sentiment = health.weighted_sentiment;

    if sentiment < thresholds.sentiment_drop {
        let severity = if sentiment < thresholds.sentiment_critical {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(Alert::new(
            deal_id.clone(),
            AlertType::SentimentDrop,
            severity,
            "Client sentiment is dropping",
            format!("Weighted sentiment across recent communications is {sentiment:.2}."),
        ));
    }

    if health.score < thresholds.health_floor {
        alerts.push(Alert::new(
            deal_id.clone(),
            AlertType::HealthCritical,
            AlertSeverity::High,
            "Deal health is below the floor",
            format!("Health score {} is below the configured floor of {}.", health.score, thresholds.health_floor),
        ));
    }

    if let Some(signal) = mentions_competitor(readings) {
        alerts.push(Alert::new(
            deal_id.clone(),
            AlertType::CompetitorMention,
            AlertSeverity::High,
            "Competitor mentioned by the client",
            format!("Signal: {signal}"),
        ));
    }

    if alerts.is_empty() && sentiment > thresholds.positive_update {
        alerts.push(Alert::new(
            deal_id.clone(),
            AlertType::PositiveUpdate,
            AlertSeverity::Info,
            "Client sentiment is positive",
            format!("Weighted sentiment is {sentiment:.2} with no active risk signals."),
        ));
    }

    alerts
}

/// Drops candidates whose type already has an unresolved alert on the deal,
/// so repeated monitoring of an unchanged situation does not refire.
pub fn dedup_alerts(candidates: Vec<Alert>, unresolved: &[Alert]) -> Vec<Alert> {
    candidates
        .into_iter()
        .filter(|candidate| {
            !unresolved
                .iter()
                .any(|existing| !existing.resolved && existing.alert_type == candidate.alert_type)
        })
        .collect()
}

/// Output of the recovery step: an outreach draft plus internal follow-ups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEmail {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub action_items: Vec<String>,
}

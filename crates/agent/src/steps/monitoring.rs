use async_trait::async_trait;
use serde::Deserialize;

use dealforge_core::monitoring::{dedup_alerts, detect_alerts, health_report};
use dealforge_core::{AlertType, MonitoringState, RecoveryEmail, SentimentReading, StepResult};

use crate::llm::{parse_json_payload, CompletionOptions};
use crate::steps::{FlowStep, StepContext};

const DEFAULT_BASE_HEALTH: u8 = 70;

#[derive(Debug, Deserialize)]
struct SentimentPayload {
    #[serde(default)]
    readings: Vec<SentimentReading>,
}

pub struct Sentiment;

#[async_trait]
impl FlowStep<MonitoringState> for Sentiment {
    fn id(&self) -> &'static str {
        "sentiment"
    }

    async fn execute(&self, state: &MonitoringState, ctx: &StepContext) -> StepResult<MonitoringState> {
        if state.communications.is_empty() {
            let mut next = state.clone();
            next.readings = Vec::new();
            return StepResult::ok_with(next, "no communications to score");
        }

        let prompt = match ctx.prompts.sentiment(&state.deal, &state.communications) {
            Ok(prompt) => prompt,
            Err(error) => return StepResult::fatal(error.to_string()),
        };

        let response = match ctx.complete(&prompt, CompletionOptions::default()).await {
            Ok(response) => response,
            Err(error) => return StepResult::retryable(error.to_string()),
        };

        let mut next = state.clone();
        match parse_json_payload::<SentimentPayload>(&response) {
            Ok(payload) if !payload.readings.is_empty() => {
                next.readings = payload.readings;
                next.readings.sort_by_key(|reading| reading.index);
                for reading in &mut next.readings {
                    reading.score = reading.score.clamp(-1.0, 1.0);
                }
            }
            _ => {
                // Unparseable sentiment degrades to neutral rather than
                // blocking the rest of the monitoring pass.
                next.warnings.push("sentiment response was unparseable, assuming neutral".to_string());
                next.readings = (0..state.communications.len())
                    .map(SentimentReading::neutral)
                    .collect();
            }
        }
        let count = next.readings.len();
        StepResult::ok_with(next, format!("scored {count} communication(s)"))
    }
}

pub struct Health;

#[async_trait]
impl FlowStep<MonitoringState> for Health {
    fn id(&self) -> &'static str {
        "health"
    }

    async fn execute(&self, state: &MonitoringState, ctx: &StepContext) -> StepResult<MonitoringState> {
        let base = state.deal.health_score.unwrap_or(DEFAULT_BASE_HEALTH);
        let report = health_report(base, &state.readings, &ctx.config.health);

        let mut next = state.clone();
        let score = report.score;
        next.health = Some(report);
        StepResult::ok_with(next, format!("health {score}"))
    }
}

pub struct AlertStep;

#[async_trait]
impl FlowStep<MonitoringState> for AlertStep {
    fn id(&self) -> &'static str {
        "alert"
    }

    async fn execute(&self, state: &MonitoringState, ctx: &StepContext) -> StepResult<MonitoringState> {
        let Some(health) = state.health.clone() else {
            return StepResult::fatal("alert step requires a health report");
        };

        let unresolved = match ctx.alerts.unresolved_for_deal(&state.deal.id).await {
            Ok(unresolved) => unresolved,
            Err(error) => return StepResult::retryable(error.to_string()),
        };

        let candidates =
            detect_alerts(&state.deal.id, &state.readings, &health, &ctx.config.alerts);
        let new_alerts = dedup_alerts(candidates, &unresolved);

        // Persisted here rather than at run completion: a failure later in
        // the run must not drop them. A retry dedups against what already
        // landed.
        for alert in &new_alerts {
            if let Err(error) = ctx.alerts.save(alert).await {
                return StepResult::retryable(error.to_string());
            }
        }

        let mut next = state.clone();
        let raised = new_alerts.len();
        next.active_alerts = unresolved;
        next.new_alerts = new_alerts;
        StepResult::ok_with(next, format!("{raised} new alert(s)"))
    }
}

#[derive(Debug, Deserialize)]
struct RecoveryPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    action_items: Vec<String>,
}

/// Splits a drafted email into subject and body on a `Subject:` first line.
fn parse_email(raw: &str) -> RecoveryEmail {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("Subject:") {
        let mut lines = rest.splitn(2, '\n');
        let subject = lines.next().unwrap_or_default().trim().to_string();
        let body = lines.next().unwrap_or_default().trim().to_string();
        RecoveryEmail { subject, body, action_items: Vec::new() }
    } else {
        RecoveryEmail {
            subject: "Checking in".to_string(),
            body: trimmed.to_string(),
            action_items: Vec::new(),
        }
    }
}

pub struct Recovery;

#[async_trait]
impl FlowStep<MonitoringState> for Recovery {
    fn id(&self) -> &'static str {
        "recovery"
    }

    async fn execute(&self, state: &MonitoringState, ctx: &StepContext) -> StepResult<MonitoringState> {
        let relevant: Vec<_> =
            state.new_alerts.iter().chain(state.active_alerts.iter()).cloned().collect();
        if relevant.is_empty() {
            return StepResult::ok_with(state.clone(), "no active alerts, no outreach needed");
        }

        let positive =
            relevant.iter().all(|alert| alert.alert_type == AlertType::PositiveUpdate);

        let prompt = match ctx.prompts.recovery(&state.deal, positive, &relevant, &state.communications)
        {
            Ok(prompt) => prompt,
            Err(error) => return StepResult::fatal(error.to_string()),
        };

        let response = match ctx.complete(&prompt, CompletionOptions::default()).await {
            Ok(response) => response,
            Err(error) => return StepResult::retryable(error.to_string()),
        };

        let mut next = state.clone();
        match parse_json_payload::<RecoveryPayload>(&response) {
            Ok(payload) => {
                let mut email = parse_email(&payload.email);
                email.action_items = payload.action_items;
                next.recovery_email = Some(email);
            }
            Err(error) => {
                next.warnings
                    .push(format!("recovery draft was unparseable, skipping outreach: {error}"));
            }
        }
        StepResult::ok(next)
    }
}

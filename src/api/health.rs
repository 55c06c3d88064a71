use chrono::{DateTime, Utc};
use rocket::{serde::json::Json, Route, State};
use serde::Serialize;

use crate::{broadcast::UpdateChannel, diagnostics::Diagnostics};

pub fn routes() -> Vec<Route> {
    routes![health]
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_seconds: i64,
    pub votes_cast: u64,
    pub subscribers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_email_failure: Option<EmailFailureReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailFailureReport {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[get("/health")]
pub fn health(
    diagnostics: &State<Diagnostics>,
    channel: &State<UpdateChannel>,
) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        uptime_seconds: diagnostics.uptime_seconds(),
        votes_cast: diagnostics.votes_cast(),
        subscribers: channel.subscriber_count(),
        last_email_failure: diagnostics.last_email_failure().map(|failure| {
            EmailFailureReport {
                at: failure.at,
                message: failure.message,
            }
        }),
    })
}

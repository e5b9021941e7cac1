//! Alert retrieval and counting.

use crate::domain::errors::ScanResult;
use crate::domain::models::alert::{Alert, AlertCounts, Severity};
use crate::domain::ports::control_api::{ApiCategory, ApiResponse, ControlApi};

/// Fetch every alert the scanner holds for the current session.
///
/// Entries whose risk does not parse as a known severity are dropped; the
/// scanner only emits the four known buckets.
pub async fn fetch_alerts(api: &dyn ControlApi) -> ScanResult<Vec<Alert>> {
    let response = api
        .call("core", ApiCategory::View, "alerts", &[])
        .await?;
    Ok(parse_alerts(&response))
}

/// Fetch and tally in one step, deduplicating by fingerprint per bucket.
pub async fn fetch_alert_counts(api: &dyn ControlApi) -> ScanResult<AlertCounts> {
    let alerts = fetch_alerts(api).await?;
    Ok(AlertCounts::from_alerts(&alerts))
}

fn parse_alerts(response: &ApiResponse) -> Vec<Alert> {
    let Ok(items) = response.list_items() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let fingerprint = item.set_field("alert").or_else(|_| item.set_field("name")).ok()?;
            let severity: Severity = item.set_field("risk").ok()?.parse().ok()?;
            Some(Alert {
                fingerprint,
                severity,
            })
        })
        .collect()
}

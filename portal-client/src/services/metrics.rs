//! Client-side API metrics. Recorded through the `metrics` facade; nothing is
//! exported unless the embedding application installs a recorder.

use metrics::{counter, histogram};
use reqwest::{Method, StatusCode};
use std::time::Duration;

pub fn record_request(method: &Method, path: &str, status: StatusCode, elapsed: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", route_template(path)),
        ("status", status.as_u16().to_string()),
    ];

    counter!("portal_api_requests_total", &labels).increment(1);
    histogram!("portal_api_request_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

pub fn record_session_expired() {
    counter!("portal_session_expired_total").increment(1);
}

/// Collapse id segments so label cardinality stays bounded:
/// `/api/requests/65f0c3/revoke` becomes `/api/requests/:id/revoke`.
fn route_template(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    path.split('/')
        .map(|segment| {
            let looks_like_id = segment.len() >= 6
                && segment.chars().any(|c| c.is_ascii_digit())
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
            if looks_like_id { ":id" } else { segment }
        })
        .collect::<Vec<_>>()
        .join("/")
}

//! Rendering of the digest email: subject line, plain-text and HTML
//! bodies, and the JSON report attachment.

use crate::error::Result;
use pulsemon_common::types::{HealthReport, Violation};

pub const ATTACHMENT_FILENAME: &str = "health-report.json";

pub fn subject(service: Option<&str>, host: Option<&str>, violation_count: usize) -> String {
    let scope = match (service, host) {
        (Some(service), Some(host)) => format!("{service}@{host}"),
        (Some(service), None) => service.to_string(),
        (None, Some(host)) => host.to_string(),
        (None, None) => "pulsemon".to_string(),
    };
    format!(
        "[pulsemon][{scope}] {violation_count} alert{} accumulated",
        if violation_count == 1 { "" } else { "s" }
    )
}

pub fn render_text(violations: &[Violation]) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "{} violation(s) since the last digest:\n\n",
        violations.len()
    ));
    for v in violations {
        body.push_str(&format!(
            "- [{kind}] {rule} x{count}: {description} (value {value:.2}, limit {limit:.2}, first seen {first})\n",
            kind = v.kind,
            rule = v.rule_id,
            count = v.occurrence_count,
            description = v.description,
            value = v.collected_value,
            limit = v.limit_value,
            first = v.first_seen.format("%Y-%m-%d %H:%M:%S UTC"),
        ));
    }
    body
}

pub fn render_html(violations: &[Violation]) -> String {
    let mut rows = String::new();
    for v in violations {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{}</td></tr>",
            escape(&v.rule_id),
            v.kind,
            v.occurrence_count,
            v.collected_value,
            v.limit_value,
            escape(&v.description),
        ));
    }
    format!(
        "<html><body>\
         <p>{count} violation(s) since the last digest. Full report attached.</p>\
         <table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\
         <tr><th>Rule</th><th>Kind</th><th>Count</th><th>Value</th><th>Limit</th><th>Description</th></tr>\
         {rows}\
         </table>\
         </body></html>",
        count = violations.len(),
    )
}

/// The raw report, attached so the recipient can inspect pending and
/// undefined rules alongside the violations.
pub fn render_attachment(report: &HealthReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

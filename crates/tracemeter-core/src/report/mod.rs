//! Human and machine readable reports
//!
//! Everything here is a pure function of a [`Summary`] and the alerts
//! evaluated against it, so the same inputs always render the same text.

pub mod export;

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Alert, CostBreakdownItem, Dimension, Summary};

const WIDE_RULE: usize = 70;
const RULE: usize = 60;
const TOP_N: usize = 10;

/// Format a cost with `dp` decimal places, rounding half away from zero
pub(crate) fn format_cost(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

/// Format an integer with `,` thousands separators
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn rule(f: &mut fmt::Formatter<'_>, c: char, width: usize) -> fmt::Result {
    writeln!(f, "{}", c.to_string().repeat(width))
}

/// Operational dashboard: overview, costs, quality and alerts
pub struct Dashboard<'a> {
    /// Summary to display
    pub summary: &'a Summary,
    /// Alerts evaluated against the summary
    pub alerts: &'a [Alert],
}

impl fmt::Display for Dashboard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;

        rule(f, '=', WIDE_RULE)?;
        writeln!(f, "TRACEMETER PRODUCTION DASHBOARD")?;
        rule(f, '=', WIDE_RULE)?;

        writeln!(f, "\nOVERVIEW")?;
        rule(f, '-', WIDE_RULE)?;
        writeln!(f, "Total Traces:        {}", group_thousands(s.total_traces))?;
        writeln!(f, "Unique Users:        {}", s.users.len())?;
        let models: Vec<&str> = s.models.iter().map(String::as_str).collect();
        writeln!(f, "Models Used:         {}", models.join(", "))?;

        writeln!(f, "\nCOSTS")?;
        rule(f, '-', WIDE_RULE)?;
        writeln!(f, "Total Cost:          ${}", format_cost(s.total_cost, 4))?;
        match s.cost_per_trace() {
            Some(cost) => writeln!(f, "Cost per Trace:      ${}", format_cost(cost, 4))?,
            None => writeln!(f, "Cost per Trace:      N/A")?,
        }
        writeln!(f, "Total Tokens:        {}", group_thousands(s.total_tokens))?;
        match s.tokens_per_trace() {
            Some(tokens) => writeln!(f, "Tokens per Trace:    {}", group_thousands(tokens))?,
            None => writeln!(f, "Tokens per Trace:    N/A")?,
        }

        writeln!(f, "\nQUALITY")?;
        rule(f, '-', WIDE_RULE)?;
        writeln!(f, "Error Rate:          {:.2}%", s.error_rate * 100.0)?;
        writeln!(f, "Total Errors:        {}", group_thousands(s.total_errors))?;
        if let Some(avg) = s.avg_latency() {
            writeln!(f, "Avg Latency:         {avg:.0}ms")?;
        }
        if let Some(p95) = s.latency_p95() {
            writeln!(f, "P95 Latency:         {p95:.0}ms")?;
        }
        if let Some(score) = s.avg_quality_score() {
            writeln!(f, "Avg Quality Score:   {score:.2}")?;
        }

        writeln!(f)?;
        rule(f, '=', WIDE_RULE)?;
        write!(f, "{}", AlertList(self.alerts))
    }
}

/// Cost analysis over the last `days` days
pub struct CostReport<'a> {
    /// Summary to break down
    pub summary: &'a Summary,
    /// Length of the analyzed window
    pub days: u32,
}

impl CostReport<'_> {
    fn section(
        f: &mut fmt::Formatter<'_>,
        title: &str,
        items: &[CostBreakdownItem],
    ) -> fmt::Result {
        writeln!(f, "\n\n{title}:")?;
        rule(f, '-', RULE)?;
        if items.is_empty() {
            return writeln!(f, "(none)");
        }
        for item in items {
            writeln!(
                f,
                "{:30} ${:>8} ({:5.1}%)",
                item.key,
                format_cost(item.cost, 4),
                item.percentage
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for CostReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;

        writeln!(f, "Analyzing costs from last {} days...", self.days)?;
        rule(f, '=', RULE)?;

        writeln!(f, "\nOverall Metrics:")?;
        rule(f, '-', RULE)?;
        writeln!(f, "Total Cost: ${}", format_cost(s.total_cost, 4))?;
        writeln!(f, "Total Tokens: {}", group_thousands(s.total_tokens))?;
        writeln!(f, "Total Traces: {}", group_thousands(s.total_traces))?;
        match s.cost_per_trace() {
            Some(cost) => writeln!(f, "Average Cost per Trace: ${}", format_cost(cost, 4))?,
            None => writeln!(f, "Average Cost per Trace: N/A")?,
        }

        let models = s.breakdown(Dimension::Model).breakdown;
        Self::section(f, "Costs by Model", &models)?;

        let mut users = s.breakdown(Dimension::User).breakdown;
        users.truncate(TOP_N);
        Self::section(f, "Costs by User (top 10)", &users)?;

        let mut tags = s.breakdown(Dimension::Tag).breakdown;
        tags.truncate(TOP_N);
        Self::section(f, "Costs by Tag (top 10)", &tags)?;

        writeln!(f)?;
        rule(f, '=', RULE)
    }
}

/// Numbered alert listing
pub struct AlertList<'a>(pub &'a [Alert]);

impl fmt::Display for AlertList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No alerts triggered - all metrics within thresholds");
        }

        writeln!(f, "ALERTS TRIGGERED ({})", self.0.len())?;
        for (i, alert) in self.0.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, alert.message)?;
        }
        Ok(())
    }
}

/// One line describing the summary and alert count, used as notification text
pub fn summary_line(summary: &Summary, alerts: &[Alert]) -> String {
    let status = match alerts.len() {
        0 => "OK".to_string(),
        1 => "1 alert".to_string(),
        n => format!("{n} alerts"),
    };

    format!(
        "Tracemeter {status}: {} traces, ${} total cost, {:.2}% errors",
        group_thousands(summary.total_traces),
        format_cost(summary.total_cost, 2),
        summary.error_rate * 100.0
    )
}

#[derive(Serialize)]
struct Report<'a> {
    total_traces: u64,
    total_cost: Decimal,
    total_tokens: u64,
    total_errors: u64,
    error_rate: f64,
    cost_per_trace: Option<Decimal>,
    tokens_per_trace: Option<u64>,
    avg_latency: Option<f64>,
    latency_p95: Option<f64>,
    avg_quality_score: Option<f64>,
    models: &'a std::collections::BTreeSet<String>,
    users: usize,
    cost_by_model: Vec<CostBreakdownItem>,
    cost_by_user: Vec<CostBreakdownItem>,
    cost_by_tag: Vec<CostBreakdownItem>,
    alerts: &'a [Alert],
}

impl<'a> Report<'a> {
    fn new(summary: &'a Summary, alerts: &'a [Alert]) -> Self {
        Self {
            total_traces: summary.total_traces,
            total_cost: summary.total_cost,
            total_tokens: summary.total_tokens,
            total_errors: summary.total_errors,
            error_rate: summary.error_rate,
            cost_per_trace: summary.cost_per_trace(),
            tokens_per_trace: summary.tokens_per_trace(),
            avg_latency: summary.avg_latency(),
            latency_p95: summary.latency_p95(),
            avg_quality_score: summary.avg_quality_score(),
            models: &summary.models,
            users: summary.users.len(),
            cost_by_model: summary.breakdown(Dimension::Model).breakdown,
            cost_by_user: summary.breakdown(Dimension::User).breakdown,
            cost_by_tag: summary.breakdown(Dimension::Tag).breakdown,
            alerts,
        }
    }
}

/// Render the summary and alerts as a JSON document
pub fn render_json(summary: &Summary, alerts: &[Alert], pretty: bool) -> Result<String> {
    let report = Report::new(summary, alerts);
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertKind;
    use pretty_assertions::assert_eq;

    fn sample_summary() -> Summary {
        let mut summary = Summary {
            records: 3,
            total_traces: 15,
            total_cost: Decimal::new(750, 2),
            total_tokens: 1_234_567,
            total_errors: 1,
            error_rate: 1.0 / 15.0,
            latencies: vec![100.0, 300.0],
            quality_scores: vec![0.9],
            ..Summary::default()
        };
        summary.models.insert("gpt-4o".into());
        summary.users.insert("alice".into());
        summary.cost_by_model.insert("gpt-4o".into(), Decimal::new(750, 2));
        summary.cost_by_user.insert("alice".into(), Decimal::new(500, 2));
        summary
    }

    fn sample_alert() -> Alert {
        Alert {
            kind: AlertKind::ErrorRate,
            observed: 1.0 / 15.0,
            threshold: 0.05,
            message: "HIGH ERROR RATE: 6.67% (threshold: 5%)".into(),
        }
    }

    #[test]
    fn test_format_cost_rounds() {
        assert_eq!(format_cost(Decimal::new(100_005, 3), 2), "100.01");
        assert_eq!(format_cost(Decimal::new(75, 1), 4), "7.5000");
        assert_eq!(format_cost(Decimal::new(100_025, 3), 2), "100.03");
        assert_eq!(format_cost(Decimal::ZERO, 2), "0.00");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_dashboard_sections() {
        let summary = sample_summary();
        let alerts = [sample_alert()];
        let text = Dashboard {
            summary: &summary,
            alerts: &alerts,
        }
        .to_string();

        assert!(text.contains("Total Traces:        15\n"));
        assert!(text.contains("Models Used:         gpt-4o\n"));
        assert!(text.contains("Total Cost:          $7.5000\n"));
        assert!(text.contains("Cost per Trace:      $0.5000\n"));
        assert!(text.contains("Tokens per Trace:    82,304\n"));
        assert!(text.contains("Error Rate:          6.67%\n"));
        assert!(text.contains("Avg Latency:         200ms\n"));
        assert!(text.contains("P95 Latency:         300ms\n"));
        assert!(text.contains("ALERTS TRIGGERED (1)"));
        assert!(text.contains("  1. HIGH ERROR RATE: 6.67% (threshold: 5%)"));
    }

    #[test]
    fn test_dashboard_without_traces() {
        let summary = Summary::default();
        let text = Dashboard {
            summary: &summary,
            alerts: &[],
        }
        .to_string();

        assert!(text.contains("Cost per Trace:      N/A\n"));
        assert!(text.contains("Tokens per Trace:    N/A\n"));
        assert!(!text.contains("Avg Latency"));
        assert!(text.ends_with("No alerts triggered - all metrics within thresholds\n"));
    }

    #[test]
    fn test_cost_report() {
        let summary = sample_summary();
        let text = CostReport {
            summary: &summary,
            days: 7,
        }
        .to_string();

        assert!(text.starts_with("Analyzing costs from last 7 days...\n"));
        assert!(text.contains("Total Tokens: 1,234,567\n"));
        assert!(text.contains("Average Cost per Trace: $0.5000\n"));
        assert!(text.contains(&format!("{:30} $  7.5000 (100.0%)", "gpt-4o")));
        assert!(text.contains(&format!("{:30} $  5.0000 ( 66.7%)", "alice")));
        assert!(text.contains("Costs by Tag (top 10):\n------------------------------------------------------------\n(none)"));
    }

    #[test]
    fn test_cost_report_limits_users() {
        let mut summary = Summary {
            total_cost: Decimal::new(120, 0),
            ..Summary::default()
        };
        for i in 0..12 {
            summary
                .cost_by_user
                .insert(format!("user-{i:02}"), Decimal::from(i + 1));
        }

        let text = CostReport {
            summary: &summary,
            days: 1,
        }
        .to_string();

        assert!(text.contains("user-11"));
        assert!(text.contains("user-02"));
        assert!(!text.contains("user-01"));
        assert!(!text.contains("user-00"));
    }

    #[test]
    fn test_summary_line() {
        let summary = sample_summary();

        assert_eq!(
            summary_line(&summary, &[]),
            "Tracemeter OK: 15 traces, $7.50 total cost, 6.67% errors"
        );
        assert_eq!(
            summary_line(&summary, &[sample_alert(), sample_alert()]),
            "Tracemeter 2 alerts: 15 traces, $7.50 total cost, 6.67% errors"
        );
    }

    #[test]
    fn test_pretty_and_compact_json_agree() {
        let summary = sample_summary();
        let alerts = [sample_alert()];

        let pretty = render_json(&summary, &alerts, true).unwrap();
        let compact = render_json(&summary, &alerts, false).unwrap();

        assert_ne!(pretty, compact);
        assert!(!compact.contains('\n'));

        let pretty: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        let compact: serde_json::Value = serde_json::from_str(&compact).unwrap();
        assert_eq!(pretty, compact);
        assert_eq!(pretty["total_traces"], 15);
        assert_eq!(pretty["latency_p95"], 300.0);
        assert_eq!(pretty["alerts"][0]["kind"], "error_rate");
    }

    #[test]
    fn test_json_keeps_undefined_values_as_null() {
        let json = render_json(&Summary::default(), &[], false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["latency_p95"].is_null());
        assert!(value["cost_per_trace"].is_null());
    }
}

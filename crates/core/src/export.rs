//! CSV maintenance report.
//!
//! One row per cleaning record, in storage order (newest first); drains
//! that were never cleaned get a single placeholder row. The output starts
//! with a UTF-8 BOM so spreadsheet tools pick the right encoding.

use crate::drains::{Drain, DrainCategory};

const BOM: &str = "\u{feff}";
const HEADER: &str = "Channel,Location,Category,Last Cleaning,Performer,Notes,Frequency (Days)";

/// Renders the full maintenance report.
pub fn csv_report(drains: &[Drain]) -> String {
    let mut out = String::from(BOM);
    out.push_str(HEADER);
    out.push('\n');

    for drain in drains {
        if drain.history.is_empty() {
            push_row(
                &mut out,
                [
                    quoted(&drain.name),
                    quoted(&drain.location),
                    quoted(category_label(drain.category)),
                    "NEVER CLEANED".to_string(),
                    "N/A".to_string(),
                    "N/A".to_string(),
                    quoted(&drain.frequency_days.to_string()),
                ],
            );
            continue;
        }
        for record in &drain.history {
            push_row(
                &mut out,
                [
                    quoted(&drain.name),
                    quoted(&drain.location),
                    quoted(category_label(drain.category)),
                    quoted(&record.date.format("%Y-%m-%d").to_string()),
                    quoted(&record.performer),
                    quoted(&record.notes),
                    quoted(&drain.frequency_days.to_string()),
                ],
            );
        }
    }
    out
}

fn push_row(out: &mut String, fields: [String; 7]) {
    out.push_str(&fields.join(","));
    out.push('\n');
}

fn category_label(category: DrainCategory) -> &'static str {
    match category {
        DrainCategory::Large => "LARGE",
        DrainCategory::Medium => "MEDIUM",
        DrainCategory::Small => "SMALL",
    }
}

/// Wraps a field in quotes, doubling any embedded quotes.
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

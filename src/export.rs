//! CSV export of duplicate groups.
//!
//! Writes one row per (group, contact) so the groups can be reviewed in a
//! spreadsheet before or after merging. A contact that is duplicated on
//! both phone and email appears once under each.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{Contact, ContactId, MergeOperand, MergePlan};
use crate::run::{GroupOutcome, GroupStatus, RunReport};
use crate::window::DateWindow;

const HEADER: [&str; 14] = [
    "duplicate_type",
    "duplicate_value",
    "contact_id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "lifecycle_stage",
    "priority",
    "created_at",
    "last_activity_at",
    "recency",
    "plan_role",
    "group_status",
];

#[derive(Serialize)]
struct ExportRow<'a> {
    duplicate_type: &'a str,
    duplicate_value: &'a str,
    contact_id: &'a str,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    email: Option<&'a str>,
    phone: Option<&'a str>,
    lifecycle_stage: Option<&'a str>,
    priority: bool,
    created_at: String,
    last_activity_at: Option<String>,
    recency: String,
    plan_role: &'static str,
    group_status: &'static str,
}

/// `duplicates_<first-day>_<YYYYmmdd_HHMMSS>.csv` under `dir`.
pub fn default_export_path(dir: &Path, window: &DateWindow, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "duplicates_{}_{}.csv",
        window.first_day.format("%Y-%m-%d"),
        now.format("%Y%m%d_%H%M%S")
    ))
}

/// Write every group in `report` to `path` and return the number of rows.
///
/// `contacts` supplies the snapshot fields; members missing from it are
/// written with only their id.
pub fn write_groups_csv(path: &Path, report: &RunReport, contacts: &[Contact]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory: {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(std::io::BufWriter::new(file));
    writer.write_record(HEADER).context("CSV write error")?;

    let by_id: HashMap<&ContactId, &Contact> = contacts.iter().map(|c| (&c.id, c)).collect();
    let mut rows = 0;

    for outcome in &report.outcomes {
        for id in &outcome.contacts {
            let contact = by_id.get(id).copied();
            writer
                .serialize(row(outcome, id, contact))
                .context("CSV write error")?;
            rows += 1;
        }
    }

    writer.flush().context("CSV flush error")?;
    Ok(rows)
}

fn row<'a>(outcome: &'a GroupOutcome, id: &'a ContactId, contact: Option<&'a Contact>) -> ExportRow<'a> {
    let ts = |t: DateTime<Utc>| t.to_rfc3339();
    ExportRow {
        duplicate_type: outcome.key.kind.as_str(),
        duplicate_value: &outcome.key.value,
        contact_id: id.as_str(),
        first_name: contact.and_then(|c| c.first_name.as_deref()),
        last_name: contact.and_then(|c| c.last_name.as_deref()),
        email: contact.and_then(|c| c.email.as_deref()),
        phone: contact.and_then(|c| c.phone.as_deref()),
        lifecycle_stage: contact.and_then(|c| c.lifecycle_stage.as_ref()).map(|s| s.label()),
        priority: contact
            .and_then(|c| c.lifecycle_stage.as_ref())
            .is_some_and(|s| s.is_priority()),
        created_at: contact.map(|c| ts(c.created_at)).unwrap_or_default(),
        last_activity_at: contact.and_then(|c| c.last_activity_at).map(ts),
        recency: contact.map(|c| ts(c.recency())).unwrap_or_default(),
        plan_role: plan_role(&outcome.plan, id),
        group_status: status_str(&outcome.status),
    }
}

/// Role of `id` within `plan`: `survivor` for the record that is kept,
/// `intermediate` for a survivor that is later absorbed, `absorbed`
/// otherwise.
fn plan_role(plan: &MergePlan, id: &ContactId) -> &'static str {
    let steps = match plan {
        MergePlan::ManualReview(_) => return "manual_review",
        MergePlan::Merge(steps) => steps,
    };
    let is = |op: &MergeOperand| matches!(op, MergeOperand::Contact(c) if c == id);

    match steps.iter().position(|s| is(&s.survivor)) {
        Some(i) if i + 1 == steps.len() => "survivor",
        Some(_) => "intermediate",
        None if steps.iter().any(|s| is(&s.absorbed)) => "absorbed",
        None => "unplanned",
    }
}

fn status_str(status: &GroupStatus) -> &'static str {
    match status {
        GroupStatus::Planned => "planned",
        GroupStatus::Merged { .. } => "merged",
        GroupStatus::Failed { .. } => "failed",
        GroupStatus::ManualReview => "manual_review",
    }
}

//! Run summaries for the terminal.
//!
//! `dedup scan` and `dedup merge` end with a human-readable overview on
//! stdout: how many contacts were fetched, how each dimension split into
//! duplicate groups, one line per group, and the groups left for manual
//! review. `--json` prints the [`RunReport`] instead.

use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::group::GroupingStats;
use crate::models::{
    Contact, ContactId, DuplicateGroup, DuplicateKind, LifecycleStage, MergePlan, NormalizedKey,
};
use crate::plan::{by_recency, plan_group};
use crate::progress::format_number;
use crate::run::{GroupOutcome, GroupStatus, RunReport, DIMENSIONS};

/// Print the summary of `report` on stdout.
pub fn print_summary(report: &RunReport) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_summary(&mut out, report)?;
    out.flush()?;
    Ok(())
}

/// Print `report` as pretty JSON on stdout.
pub fn print_json(report: &RunReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn write_summary<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    let s = &report.summary;
    let mode = if report.dry_run { "scan (dry run)" } else { "merge" };

    writeln!(out, "Contact Dedup: {}", mode)?;
    writeln!(out, "================================")?;
    writeln!(out)?;
    writeln!(out, "  Window:      {}", report.window)?;
    writeln!(out, "  Source:      {}", report.source)?;
    writeln!(out, "  Contacts:    {}", format_number(s.total_contacts as u64))?;
    writeln!(out)?;

    for kind in DIMENSIONS {
        let stats = match kind {
            DuplicateKind::Phone => &report.phone_stats,
            DuplicateKind::Email => &report.email_stats,
        };
        write_dimension(out, kind, stats)?;

        let outcomes: Vec<&GroupOutcome> = report.outcomes_for(kind).collect();
        if outcomes.is_empty() {
            continue;
        }
        writeln!(
            out,
            "  {:<32} {:>5}   {:<14} {}",
            "KEY", "SIZE", "STATUS", "PLAN"
        )?;
        writeln!(out, "  {}", "-".repeat(76))?;
        for o in outcomes {
            writeln!(
                out,
                "  {:<32} {:>5}   {:<14} {}",
                o.key.value,
                o.contacts.len(),
                status_label(&o.status),
                plan_line(&o.plan)
            )?;
            if let GroupStatus::Failed {
                failed_step,
                skipped_steps,
                error,
            } = &o.status
            {
                writeln!(
                    out,
                    "  {:<32}         step {} failed ({} skipped): {}",
                    "",
                    failed_step + 1,
                    skipped_steps,
                    error
                )?;
            }
        }
        writeln!(out)?;
    }

    let review: Vec<&GroupOutcome> = report
        .outcomes
        .iter()
        .filter(|o| o.status == GroupStatus::ManualReview)
        .collect();
    if !review.is_empty() {
        let stages: HashMap<&ContactId, &LifecycleStage> = report
            .contacts
            .iter()
            .filter_map(|c| c.lifecycle_stage.as_ref().map(|s| (&c.id, s)))
            .collect();
        writeln!(out, "  Manual review (* priority stage):")?;
        for o in review {
            if let MergePlan::ManualReview(r) = &o.plan {
                writeln!(out, "    {} {}", o.key.kind, o.key.value)?;
                for entry in &r.contacts {
                    writeln!(
                        out,
                        "      {:<16} {:<26} {}",
                        entry.id,
                        stage_cell(stages.get(&entry.id).copied()),
                        format_ts(entry.recency)
                    )?;
                }
            }
        }
        writeln!(out)?;
    }

    if report.dry_run {
        writeln!(out, "  Planned:     {} groups", s.groups_planned)?;
        writeln!(out, "  Manual:      {} groups", s.groups_manual_review)?;
    } else {
        writeln!(
            out,
            "  Merges:      {} attempted, {} succeeded, {} failed",
            s.merges_attempted, s.merges_succeeded, s.merges_failed
        )?;
        writeln!(
            out,
            "  Groups:      {} merged, {} failed, {} manual review",
            s.groups_merged, s.groups_failed, s.groups_manual_review
        )?;
        match s.success_rate() {
            Some(rate) => writeln!(out, "  Success:     {:.1}%", rate)?,
            None => writeln!(out, "  Success:     n/a")?,
        }
    }
    writeln!(out)?;
    Ok(())
}

fn write_dimension<W: Write>(
    out: &mut W,
    kind: DuplicateKind,
    stats: &GroupingStats,
) -> io::Result<()> {
    writeln!(out, "  By {}:", kind)?;
    writeln!(out, "    unique keys:        {}", format_number(stats.unique_keys as u64))?;
    writeln!(out, "    without {}:      {}", kind, format_number(stats.without_key() as u64))?;
    writeln!(
        out,
        "    duplicate groups:   {} ({} contacts)",
        format_number(stats.duplicate_groups as u64),
        format_number(stats.duplicated_contacts as u64)
    )?;
    writeln!(out)
}

/// Stage label, with a `*` marker for stages worth a look before merging.
fn stage_cell(stage: Option<&LifecycleStage>) -> String {
    match stage {
        None => "-".to_string(),
        Some(s) if s.is_priority() => format!("{} *", s.label()),
        Some(s) => s.label().to_string(),
    }
}

fn status_label(status: &GroupStatus) -> &'static str {
    match status {
        GroupStatus::Planned => "planned",
        GroupStatus::Merged { .. } => "merged",
        GroupStatus::Failed { .. } => "FAILED",
        GroupStatus::ManualReview => "manual review",
    }
}

fn plan_line(plan: &MergePlan) -> String {
    match plan {
        MergePlan::Merge(steps) => steps
            .iter()
            .map(|s| format!("{} → {}", s.absorbed, s.survivor))
            .collect::<Vec<_>>()
            .join("; "),
        MergePlan::ManualReview(r) => match r.contacts.first() {
            Some(newest) => format!("{} contacts, newest {}", r.contacts.len(), newest.id),
            None => "manual review".to_string(),
        },
    }
}

/// Print contacts found by `dedup lookup` and the plan their group would get.
pub fn print_lookup(phone: &str, normalized: &str, contacts: &[Contact]) {
    println!("lookup {}", phone);
    println!("  normalized: {}", normalized);
    println!("  found: {}", contacts.len());
    if contacts.is_empty() {
        return;
    }

    let group = DuplicateGroup {
        key: NormalizedKey {
            kind: DuplicateKind::Phone,
            value: normalized.to_string(),
        },
        contacts: contacts.to_vec(),
    };

    println!();
    println!(
        "  {:<16} {:<24} {:<20} {:<26} {}",
        "ID", "NAME", "PHONE", "STAGE", "RECENCY"
    );
    println!("  {}", "-".repeat(106));
    for c in by_recency(&group).into_iter().rev() {
        println!(
            "  {:<16} {:<24} {:<20} {:<26} {}",
            c.id,
            c.display_name(),
            c.phone.as_deref().unwrap_or("-"),
            stage_cell(c.lifecycle_stage.as_ref()),
            format_ts(c.recency())
        );
    }

    if contacts.len() >= 2 {
        println!();
        println!("  plan: {}", plan_line(&plan_group(&group)));
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

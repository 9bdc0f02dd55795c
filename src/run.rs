//! Run coordination.
//!
//! One run is fetch → group → plan → (optionally) merge, for a single date
//! window:
//!
//! 1. Fetch every contact from the [`ContactSource`]. Failure here is the
//!    only fatal error.
//! 2. Group by phone, then by email, each in key order.
//! 3. Plan every group.
//! 4. Unless dry-running, execute each plan's steps in order. A failing step
//!    abandons the rest of its plan; other groups carry on.
//!
//! Everything happens sequentially: each merge is awaited before the next
//! one is issued.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MergeConfig;
use crate::group::{group_contacts, grouping_stats, GroupingStats};
use crate::models::{
    Contact, ContactId, DuplicateGroup, DuplicateKind, MergeOperand, MergePlan, MergeStep,
    NormalizedKey,
};
use crate::plan::plan_group;
use crate::progress::{RunProgressEvent, RunReporter};
use crate::traits::{ContactSource, MergeExecutor};
use crate::window::DateWindow;

/// Dimensions in processing order.
pub const DIMENSIONS: [DuplicateKind; 2] = [DuplicateKind::Phone, DuplicateKind::Email];

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub window: DateWindow,
    /// Plan only; never call the executor.
    pub dry_run: bool,
    /// Pause between two steps of the same plan.
    pub step_pause: Duration,
    /// Pause before each group that issues merges, except the first.
    pub group_pause: Duration,
}

impl RunRequest {
    pub fn new(window: DateWindow, merge: &MergeConfig, dry_run: bool) -> Self {
        Self {
            window,
            dry_run,
            step_pause: Duration::from_millis(merge.step_pause_ms),
            group_pause: Duration::from_millis(merge.group_pause_ms),
        }
    }
}

/// What happened to one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum GroupStatus {
    /// Dry run: the plan was computed but not executed.
    Planned,
    /// Every step succeeded; `survivor` is the id returned by the last step.
    Merged { survivor: ContactId },
    /// Step `failed_step` (zero-based) failed and `skipped_steps` later
    /// steps were never attempted.
    Failed {
        failed_step: usize,
        skipped_steps: usize,
        error: String,
    },
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    pub key: NormalizedKey,
    /// Member ids in fetch order.
    pub contacts: Vec<ContactId>,
    pub plan: MergePlan,
    pub status: GroupStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_contacts: usize,
    pub phone_groups: usize,
    pub email_groups: usize,
    pub groups_processed: usize,
    pub merges_attempted: usize,
    pub merges_succeeded: usize,
    pub merges_failed: usize,
    pub groups_merged: usize,
    pub groups_failed: usize,
    pub groups_manual_review: usize,
    pub groups_planned: usize,
}

impl RunSummary {
    /// Merged groups as a percentage of all groups that reached a verdict.
    /// `None` when there were none.
    pub fn success_rate(&self) -> Option<f64> {
        let decided = self.groups_merged + self.groups_failed + self.groups_manual_review;
        if decided == 0 {
            None
        } else {
            Some(self.groups_merged as f64 * 100.0 / decided as f64)
        }
    }

    fn record(&mut self, status: &GroupStatus) {
        self.groups_processed += 1;
        match status {
            GroupStatus::Planned => self.groups_planned += 1,
            GroupStatus::Merged { .. } => self.groups_merged += 1,
            GroupStatus::Failed { .. } => self.groups_failed += 1,
            GroupStatus::ManualReview => self.groups_manual_review += 1,
        }
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub window: DateWindow,
    pub dry_run: bool,
    pub summary: RunSummary,
    pub phone_stats: GroupingStats,
    pub email_stats: GroupingStats,
    pub outcomes: Vec<GroupOutcome>,
    /// Fetched snapshots, kept for exports.
    #[serde(skip)]
    pub contacts: Vec<Contact>,
}

impl RunReport {
    pub fn outcomes_for(&self, kind: DuplicateKind) -> impl Iterator<Item = &GroupOutcome> {
        self.outcomes.iter().filter(move |o| o.key.kind == kind)
    }
}

/// A duplicate group together with its plan.
#[derive(Debug, Clone)]
pub struct PlannedGroup {
    pub group: DuplicateGroup,
    pub plan: MergePlan,
}

/// Group and plan `contacts` along both dimensions, phone groups first.
pub fn plan_contacts(contacts: &[Contact]) -> Vec<PlannedGroup> {
    DIMENSIONS
        .iter()
        .flat_map(|&kind| group_contacts(contacts, kind).into_values())
        .map(|group| {
            let plan = plan_group(&group);
            PlannedGroup { group, plan }
        })
        .collect()
}

/// Execute one run end to end.
pub async fn run_dedup(
    source: &dyn ContactSource,
    executor: &dyn MergeExecutor,
    request: &RunRequest,
    reporter: &dyn RunReporter,
) -> Result<RunReport> {
    let contacts = source
        .fetch_contacts(&request.window)
        .await
        .with_context(|| format!("Failed to fetch contacts from {}", source.name()))?;
    info!(window = %request.window, contacts = contacts.len(), "contacts fetched");

    let planned = plan_contacts(&contacts);
    let mut summary = RunSummary {
        total_contacts: contacts.len(),
        ..RunSummary::default()
    };
    for p in &planned {
        match p.group.key.kind {
            DuplicateKind::Phone => summary.phone_groups += 1,
            DuplicateKind::Email => summary.email_groups += 1,
        }
    }
    info!(
        phone_groups = summary.phone_groups,
        email_groups = summary.email_groups,
        dry_run = request.dry_run,
        "duplicate groups planned"
    );

    let mut outcomes = Vec::with_capacity(planned.len());
    let mut merged_before = false;
    let mut n = 0u64;
    let mut current_kind = None;

    for PlannedGroup { group, plan } in planned {
        let kind = group.key.kind;
        if current_kind != Some(kind) {
            current_kind = Some(kind);
            n = 0;
        }
        n += 1;
        let total = match kind {
            DuplicateKind::Phone => summary.phone_groups,
            DuplicateKind::Email => summary.email_groups,
        };
        reporter.report(RunProgressEvent::Processing {
            kind,
            key: group.key.value.clone(),
            n,
            total: total as u64,
        });

        let status = match &plan {
            MergePlan::ManualReview(review) => {
                info!(key = %group.key.value, %kind, size = review.contacts.len(), "group needs manual review");
                GroupStatus::ManualReview
            }
            MergePlan::Merge(_) if request.dry_run => GroupStatus::Planned,
            MergePlan::Merge(steps) => {
                if merged_before && !request.group_pause.is_zero() {
                    tokio::time::sleep(request.group_pause).await;
                }
                merged_before = true;

                let execution = execute_steps(executor, steps, request.step_pause).await;
                summary.merges_attempted += execution.attempted;
                summary.merges_succeeded += execution.succeeded;
                summary.merges_failed += execution.attempted - execution.succeeded;
                match &execution.status {
                    GroupStatus::Merged { survivor } => {
                        info!(key = %group.key.value, %kind, %survivor, "group merged")
                    }
                    GroupStatus::Failed {
                        failed_step, error, ..
                    } => warn!(key = %group.key.value, %kind, step = failed_step + 1, error = %error, "group merge failed"),
                    _ => {}
                }
                execution.status
            }
        };

        summary.record(&status);
        outcomes.push(GroupOutcome {
            key: group.key,
            contacts: group.contacts.iter().map(|c| c.id.clone()).collect(),
            plan,
            status,
        });
    }

    Ok(RunReport {
        source: source.name().to_string(),
        window: request.window,
        dry_run: request.dry_run,
        summary,
        phone_stats: grouping_stats(&contacts, DuplicateKind::Phone),
        email_stats: grouping_stats(&contacts, DuplicateKind::Email),
        outcomes,
        contacts,
    })
}

/// Result of executing one plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub status: GroupStatus,
    pub attempted: usize,
    pub succeeded: usize,
}

/// Run `steps` in order, feeding each step's returned id to later steps
/// that reference it. Stops at the first failure.
pub async fn execute_steps(
    executor: &dyn MergeExecutor,
    steps: &[MergeStep],
    step_pause: Duration,
) -> Execution {
    let mut results: Vec<ContactId> = Vec::with_capacity(steps.len());
    let mut attempted = 0;

    for (i, step) in steps.iter().enumerate() {
        if i > 0 && !step_pause.is_zero() {
            tokio::time::sleep(step_pause).await;
        }

        let operands = resolve(&step.survivor, &results).zip(resolve(&step.absorbed, &results));
        let Some((survivor, absorbed)) = operands else {
            return Execution {
                status: GroupStatus::Failed {
                    failed_step: i,
                    skipped_steps: steps.len() - i - 1,
                    error: format!("step {} refers to a step that has not run", i + 1),
                },
                attempted,
                succeeded: results.len(),
            };
        };

        attempted += 1;
        match executor.merge(&survivor, &absorbed).await {
            Ok(id) => results.push(id),
            Err(e) => {
                return Execution {
                    status: GroupStatus::Failed {
                        failed_step: i,
                        skipped_steps: steps.len() - i - 1,
                        error: e.to_string(),
                    },
                    attempted,
                    succeeded: results.len(),
                }
            }
        }
    }

    match results.last() {
        Some(survivor) => Execution {
            status: GroupStatus::Merged {
                survivor: survivor.clone(),
            },
            attempted,
            succeeded: results.len(),
        },
        None => Execution {
            status: GroupStatus::Failed {
                failed_step: 0,
                skipped_steps: 0,
                error: "plan has no steps".to_string(),
            },
            attempted,
            succeeded: 0,
        },
    }
}

fn resolve(operand: &MergeOperand, results: &[ContactId]) -> Option<ContactId> {
    match operand {
        MergeOperand::Contact(id) => Some(id.clone()),
        MergeOperand::StepResult(i) => results.get(*i).cloned(),
    }
}

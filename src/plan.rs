//! Merge planning for a single duplicate group.
//!
//! The CRM only merges two records at a time and always keeps the primary
//! record, so a plan is an ordered list of pairwise steps. Contacts are
//! ordered by recency (last activity, else creation time), ties broken by
//! ascending contact id.
//!
//! | Group size | Plan |
//! |-----------|------|
//! | 2 | older → newer |
//! | 3 | oldest → middle, then that result → newest |
//! | 4+ | manual review, newest first |

use crate::models::{
    Contact, DuplicateGroup, ManualReview, MergeOperand, MergePlan, MergeStep, ReviewEntry,
};

/// Largest group the planner merges automatically.
pub const MAX_AUTO_MERGE: usize = 3;

/// Contacts of `group` ordered oldest first.
pub fn by_recency(group: &DuplicateGroup) -> Vec<&Contact> {
    let mut contacts: Vec<&Contact> = group.contacts.iter().collect();
    contacts.sort_by(|a, b| a.recency().cmp(&b.recency()).then_with(|| a.id.cmp(&b.id)));
    contacts
}

/// Build the merge plan for `group`. Pure; the same group always yields the
/// same plan.
pub fn plan_group(group: &DuplicateGroup) -> MergePlan {
    let ordered = by_recency(group);

    match ordered.as_slice() {
        [older, newer] => MergePlan::Merge(vec![MergeStep {
            survivor: MergeOperand::Contact(newer.id.clone()),
            absorbed: MergeOperand::Contact(older.id.clone()),
        }]),
        [oldest, middle, newest] => MergePlan::Merge(vec![
            MergeStep {
                survivor: MergeOperand::Contact(middle.id.clone()),
                absorbed: MergeOperand::Contact(oldest.id.clone()),
            },
            MergeStep {
                survivor: MergeOperand::Contact(newest.id.clone()),
                absorbed: MergeOperand::StepResult(0),
            },
        ]),
        _ => {
            let mut contacts: Vec<ReviewEntry> = ordered
                .iter()
                .map(|c| ReviewEntry {
                    id: c.id.clone(),
                    recency: c.recency(),
                })
                .collect();
            contacts.sort_by(|a, b| b.recency.cmp(&a.recency).then_with(|| a.id.cmp(&b.id)));
            MergePlan::ManualReview(ManualReview { contacts })
        }
    }
}

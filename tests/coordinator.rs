//! Integration tests for the run coordinator.
//!
//! These drive `run_dedup` through the public `ContactSource` and
//! `MergeExecutor` traits with in-memory implementations, covering step
//! chaining, failure isolation between groups, pauses and progress reporting.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use contact_dedup::models::{Contact, ContactId, DuplicateKind, MergePlan};
use contact_dedup::progress::{NoProgress, RunProgressEvent, RunReporter};
use contact_dedup::run::{run_dedup, GroupStatus, RunRequest};
use contact_dedup::traits::{ContactSource, MergeError, MergeExecutor};
use contact_dedup::window::DateWindow;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ─── Test Source ────────────────────────────────────────────────────

/// Returns a fixed contact list regardless of window.
struct InMemorySource {
    contacts: Vec<Contact>,
}

#[async_trait]
impl ContactSource for InMemorySource {
    fn name(&self) -> &str {
        "inmemory"
    }

    async fn fetch_contacts(&self, _window: &DateWindow) -> Result<Vec<Contact>> {
        Ok(self.contacts.clone())
    }
}

// ─── Test Executor ──────────────────────────────────────────────────

/// Records every call. Merges that absorb an id in `reject` fail; every
/// other merge returns `<survivor>-m`, mimicking a CRM that reissues ids.
#[derive(Default)]
struct ScriptedExecutor {
    reject: HashSet<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    fn rejecting(ids: &[&str]) -> Self {
        Self {
            reject: ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MergeExecutor for ScriptedExecutor {
    async fn merge(
        &self,
        survivor: &ContactId,
        absorbed: &ContactId,
    ) -> Result<ContactId, MergeError> {
        self.calls
            .lock()
            .unwrap()
            .push((survivor.to_string(), absorbed.to_string()));
        if self.reject.contains(absorbed.as_str()) {
            return Err(MergeError::Rejected {
                status: 400,
                body: format!("cannot merge {}", absorbed),
            });
        }
        Ok(ContactId::new(format!("{}-m", survivor)))
    }
}

/// Collects progress events.
#[derive(Default)]
struct CollectingReporter(Mutex<Vec<RunProgressEvent>>);

impl RunReporter for CollectingReporter {
    fn report(&self, event: RunProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn contact(id: &str, hour: u32, phone: Option<&str>, email: Option<&str>) -> Contact {
    let mut c = Contact::new(id, Utc.with_ymd_and_hms(2025, 8, 14, hour, 0, 0).unwrap());
    c.phone = phone.map(String::from);
    c.email = email.map(String::from);
    c
}

fn request(dry_run: bool) -> RunRequest {
    RunRequest {
        window: DateWindow::single_day(NaiveDate::from_ymd_opt(2025, 8, 14).unwrap(), 0).unwrap(),
        dry_run,
        step_pause: Duration::ZERO,
        group_pause: Duration::ZERO,
    }
}

fn paced(step_pause: Duration, group_pause: Duration) -> RunRequest {
    RunRequest {
        step_pause,
        group_pause,
        ..request(false)
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_way_group_chains_returned_id() {
    let source = InMemorySource {
        contacts: vec![
            contact("C", 3, Some("9876543210"), None),
            contact("A", 1, Some("098765-43210"), None),
            contact("B", 2, Some("+91 9876543210"), None),
        ],
    };
    // "098765-43210" keeps its trunk zero, so only B and C share a key.
    let executor = ScriptedExecutor::default();
    let report = run_dedup(&source, &executor, &request(false), &NoProgress)
        .await
        .unwrap();
    assert_eq!(executor.calls(), vec![pair("C", "B")]);
    assert_eq!(report.summary.groups_merged, 1);

    let source = InMemorySource {
        contacts: vec![
            contact("C", 3, Some("9876543210"), None),
            contact("A", 1, Some("98765 43210"), None),
            contact("B", 2, Some("+91 9876543210"), None),
        ],
    };
    let executor = ScriptedExecutor::default();
    let report = run_dedup(&source, &executor, &request(false), &NoProgress)
        .await
        .unwrap();

    // Second step absorbs the id returned by the first, not "B".
    assert_eq!(executor.calls(), vec![pair("B", "A"), pair("C", "B-m")]);
    assert_eq!(
        report.outcomes[0].status,
        GroupStatus::Merged {
            survivor: ContactId::from("C-m")
        }
    );
    assert_eq!(report.summary.merges_attempted, 2);
    assert_eq!(report.summary.merges_succeeded, 2);
}

#[tokio::test]
async fn test_failed_group_does_not_stop_others() {
    // G1: phone group of three whose first step fails.
    // G2: email group of two that succeeds.
    let source = InMemorySource {
        contacts: vec![
            contact("1", 1, Some("9000000001"), None),
            contact("2", 2, Some("9000000001"), None),
            contact("3", 3, Some("9000000001"), None),
            contact("4", 4, None, Some("dup@example.com")),
            contact("5", 5, None, Some("DUP@example.com")),
        ],
    };
    let executor = ScriptedExecutor::rejecting(&["1"]);
    let report = run_dedup(&source, &executor, &request(false), &NoProgress)
        .await
        .unwrap();

    assert_eq!(executor.calls(), vec![pair("2", "1"), pair("5", "4")]);

    let g1 = &report.outcomes[0];
    assert_eq!(g1.key.kind, DuplicateKind::Phone);
    match &g1.status {
        GroupStatus::Failed {
            failed_step,
            skipped_steps,
            error,
        } => {
            assert_eq!(*failed_step, 0);
            assert_eq!(*skipped_steps, 1);
            assert!(error.contains("cannot merge 1"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let g2 = &report.outcomes[1];
    assert_eq!(g2.key.kind, DuplicateKind::Email);
    assert_eq!(
        g2.status,
        GroupStatus::Merged {
            survivor: ContactId::from("5-m")
        }
    );

    let s = &report.summary;
    assert_eq!(s.groups_processed, 2);
    assert_eq!(s.groups_failed, 1);
    assert_eq!(s.groups_merged, 1);
    assert_eq!(s.merges_attempted, 2);
    assert_eq!(s.merges_failed, 1);
    assert_eq!(s.success_rate(), Some(50.0));
}

#[tokio::test]
async fn test_second_step_failure_records_step_index() {
    let source = InMemorySource {
        contacts: vec![
            contact("1", 1, Some("9000000001"), None),
            contact("2", 2, Some("9000000001"), None),
            contact("3", 3, Some("9000000001"), None),
        ],
    };
    let executor = ScriptedExecutor::rejecting(&["2-m"]);
    let report = run_dedup(&source, &executor, &request(false), &NoProgress)
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes[0].status,
        GroupStatus::Failed {
            failed_step: 1,
            skipped_steps: 0,
            ..
        }
    ));
    assert_eq!(report.summary.merges_succeeded, 1);
    assert_eq!(report.summary.merges_failed, 1);
}

#[tokio::test]
async fn test_large_group_goes_to_manual_review() {
    let contacts = (1..=5)
        .map(|h| contact(&h.to_string(), h, Some("9000000001"), None))
        .collect();
    let executor = ScriptedExecutor::default();
    let report = run_dedup(
        &InMemorySource { contacts },
        &executor,
        &request(false),
        &NoProgress,
    )
    .await
    .unwrap();

    assert!(executor.calls().is_empty());
    assert_eq!(report.outcomes[0].status, GroupStatus::ManualReview);
    let MergePlan::ManualReview(review) = &report.outcomes[0].plan else {
        panic!("expected manual review plan");
    };
    assert_eq!(review.contacts[0].id.as_str(), "5");
    assert_eq!(report.summary.groups_manual_review, 1);
    assert_eq!(report.summary.success_rate(), Some(0.0));
}

#[tokio::test]
async fn test_progress_counts_per_dimension() {
    let source = InMemorySource {
        contacts: vec![
            contact("1", 1, Some("9000000001"), Some("a@example.com")),
            contact("2", 2, Some("9000000001"), None),
            contact("3", 3, Some("9000000002"), Some("a@example.com")),
            contact("4", 4, Some("9000000002"), None),
        ],
    };
    let reporter = CollectingReporter::default();
    run_dedup(&source, &ScriptedExecutor::default(), &request(true), &reporter)
        .await
        .unwrap();

    let events = reporter.0.lock().unwrap().clone();
    let processing: Vec<(DuplicateKind, u64, u64)> = events
        .iter()
        .filter_map(|e| match e {
            RunProgressEvent::Processing { kind, n, total, .. } => Some((*kind, *n, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(
        processing,
        vec![
            (DuplicateKind::Phone, 1, 2),
            (DuplicateKind::Phone, 2, 2),
            (DuplicateKind::Email, 1, 1),
        ]
    );
}

// ─── Pauses ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_step_pause_between_chained_merges() {
    let source = InMemorySource {
        contacts: vec![
            contact("1", 1, Some("9000000001"), None),
            contact("2", 2, Some("9000000001"), None),
            contact("3", 3, Some("9000000001"), None),
        ],
    };
    let executor = ScriptedExecutor::default();
    let request = paced(Duration::from_millis(200), Duration::from_secs(30));

    let started = Instant::now();
    run_dedup(&source, &executor, &request, &NoProgress)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(executor.calls().len(), 2);
    // One step pause; a single group never waits for the group pause.
    assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
}

#[tokio::test]
async fn test_group_pause_between_merging_groups() {
    let source = InMemorySource {
        contacts: vec![
            contact("1", 1, Some("9000000001"), None),
            contact("2", 2, Some("9000000001"), None),
            contact("3", 3, None, Some("dup@example.com")),
            contact("4", 4, None, Some("dup@example.com")),
        ],
    };
    let executor = ScriptedExecutor::default();
    let request = paced(Duration::from_secs(30), Duration::from_millis(300));

    let started = Instant::now();
    let report = run_dedup(&source, &executor, &request, &NoProgress)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.summary.groups_merged, 2);
    // Two-contact groups have a single step, so only the group pause applies.
    assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
}

#[tokio::test]
async fn test_dry_run_does_not_pause() {
    let source = InMemorySource {
        contacts: vec![
            contact("1", 1, Some("9000000001"), None),
            contact("2", 2, Some("9000000001"), None),
            contact("3", 3, Some("9000000001"), None),
            contact("4", 4, None, Some("dup@example.com")),
            contact("5", 5, None, Some("dup@example.com")),
        ],
    };
    let executor = ScriptedExecutor::default();
    let request = RunRequest {
        dry_run: true,
        ..paced(Duration::from_secs(30), Duration::from_secs(30))
    };

    let started = Instant::now();
    let report = run_dedup(&source, &executor, &request, &NoProgress)
        .await
        .unwrap();

    assert!(executor.calls().is_empty());
    assert_eq!(report.outcomes.len(), 2);
    assert!(started.elapsed() < Duration::from_secs(10));
}

//! Core data models used throughout the dedup pipeline.
//!
//! These types represent the contacts fetched from the CRM, the duplicate
//! groups built from them, and the merge plans derived from each group.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Opaque contact identifier as issued by the CRM.
///
/// HubSpot ids are decimal strings, so two all-digit ids compare
/// numerically (`"9" < "10"`). All-digit ids sort before any other id;
/// non-numeric ids compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u128> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl Ord for ContactId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ContactId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// CRM lifecycle stage, parsed from HubSpot's internal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Subscriber,
    Lead,
    MarketingQualifiedLead,
    SalesQualifiedLead,
    Opportunity,
    Customer,
    Evangelist,
    Other(String),
}

impl LifecycleStage {
    /// Parse a raw property value. Empty values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        let stage = match value.as_str() {
            "" => return None,
            "subscriber" => Self::Subscriber,
            "lead" => Self::Lead,
            "marketingqualifiedlead" | "mql" => Self::MarketingQualifiedLead,
            "salesqualifiedlead" | "sql" => Self::SalesQualifiedLead,
            "opportunity" => Self::Opportunity,
            "customer" => Self::Customer,
            "evangelist" => Self::Evangelist,
            _ => Self::Other(value),
        };
        Some(stage)
    }

    /// Stages the sales team treats as worth a second look before merging.
    pub fn is_priority(&self) -> bool {
        matches!(
            self,
            Self::MarketingQualifiedLead
                | Self::SalesQualifiedLead
                | Self::Opportunity
                | Self::Customer
        )
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Subscriber => "subscriber",
            Self::Lead => "lead",
            Self::MarketingQualifiedLead => "marketingqualifiedlead",
            Self::SalesQualifiedLead => "salesqualifiedlead",
            Self::Opportunity => "opportunity",
            Self::Customer => "customer",
            Self::Evangelist => "evangelist",
            Self::Other(s) => s,
        }
    }
}

/// A contact snapshot as fetched from the CRM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub id: ContactId,
    pub created_at: DateTime<Utc>,
    /// Resolved by the fetcher from the prioritized activity properties.
    pub last_activity_at: Option<DateTime<Utc>>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub lifecycle_stage: Option<LifecycleStage>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Contact {
    /// Minimal contact with only an id and creation time.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ContactId::new(id),
            created_at,
            last_activity_at: None,
            phone: None,
            email: None,
            lifecycle_stage: None,
            first_name: None,
            last_name: None,
        }
    }

    /// Timestamp used to order contacts within a group.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_activity_at.unwrap_or(self.created_at)
    }

    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if name.is_empty() {
            "No Name".to_string()
        } else {
            name.to_string()
        }
    }
}

/// One of the two independent duplicate dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKind {
    Phone,
    Email,
}

impl DuplicateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical comparison key for one duplicate dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalizedKey {
    pub kind: DuplicateKind,
    pub value: String,
}

/// Contacts sharing one normalized key. Always holds at least two contacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub key: NormalizedKey,
    /// Fetch order.
    pub contacts: Vec<Contact>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

/// Either side of a pairwise merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum MergeOperand {
    Contact(ContactId),
    /// The identifier returned by executing the step at this index.
    StepResult(usize),
}

impl fmt::Display for MergeOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contact(id) => write!(f, "{}", id),
            Self::StepResult(i) => write!(f, "<result of step {}>", i + 1),
        }
    }
}

/// A single pairwise merge: `absorbed` is merged into `survivor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeStep {
    pub survivor: MergeOperand,
    pub absorbed: MergeOperand,
}

/// Contact listed in a manual review marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewEntry {
    pub id: ContactId,
    pub recency: DateTime<Utc>,
}

/// Group that was intentionally not planned for automatic merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualReview {
    /// Newest first.
    pub contacts: Vec<ReviewEntry>,
}

/// Planner output for one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePlan {
    Merge(Vec<MergeStep>),
    ManualReview(ManualReview),
}

impl MergePlan {
    pub fn steps(&self) -> &[MergeStep] {
        match self {
            Self::Merge(steps) => steps,
            Self::ManualReview(_) => &[],
        }
    }

    pub fn is_manual_review(&self) -> bool {
        matches!(self, Self::ManualReview(_))
    }
}

//! HubSpot CRM client.
//!
//! Implements [`ContactSource`] over the contacts search endpoint and
//! [`MergeExecutor`] over the contacts merge endpoint.
//!
//! # Configuration
//!
//! ```toml
//! [crm]
//! base_url = "https://api.hubapi.com"
//! token_env = "HUBSPOT_TOKEN"
//! rate_limit_per_sec = 10
//! page_size = 100
//!
//! [activity]
//! fields = ["lastcontactdate", "notes_last_contacted", "hs_analytics_last_timestamp"]
//! ```
//!
//! # Pagination
//!
//! Search results arrive in pages of `crm.page_size`; the next page is
//! requested with the `paging.next.after` cursor until the cursor is absent
//! or `crm.max_contacts` is reached. Requests are spaced at least
//! `1 / rate_limit_per_sec` seconds apart.
//!
//! # Retry Strategy
//!
//! - Search: HTTP 429, 5xx and network errors are retried with exponential
//!   backoff (1s, 2s, 4s, … capped at 32s) up to `crm.max_retries` times.
//! - Merge: only HTTP 429 is retried; any other failure is reported
//!   immediately as a [`MergeError`].
//!
//! # Last activity
//!
//! A contact's last-activity time is the first property in
//! `activity.fields` that holds a parsable timestamp.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{Contact, ContactId, LifecycleStage};
use crate::normalize::phone_search_variants;
use crate::progress::{NoProgress, RunProgressEvent, RunReporter};
use crate::traits::{ContactSource, MergeError, MergeExecutor};
use crate::window::DateWindow;

const SEARCH_PATH: &str = "/crm/v3/objects/contacts/search";
const MERGE_PATH: &str = "/crm/v3/objects/contacts/merge";
const CREATED_FIELD: &str = "createdate";

/// Properties requested for every contact, besides the activity fields.
const BASE_PROPERTIES: &[&str] = &[
    "email",
    "phone",
    CREATED_FIELD,
    "firstname",
    "lastname",
    "lifecyclestage",
];

/// HubSpot REST client used as both fetcher and merge executor.
pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
    max_contacts: usize,
    max_retries: u32,
    merge_timeout: Duration,
    window_field: String,
    activity_fields: Vec<String>,
    pacer: Pacer,
    reporter: Arc<dyn RunReporter>,
}

impl HubSpotClient {
    /// Build a client, reading the bearer token from `crm.token_env`.
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.crm.token()?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &Config, token: String) -> Result<Self> {
        let crm = &config.crm;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(crm.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: crm.base_url.trim_end_matches('/').to_string(),
            token,
            page_size: crm.page_size,
            max_contacts: crm.max_contacts,
            max_retries: crm.max_retries,
            merge_timeout: Duration::from_secs(crm.merge_timeout_secs),
            window_field: config.window.field.clone(),
            activity_fields: config.activity.fields.clone(),
            pacer: Pacer::per_second(crm.rate_limit_per_sec),
            reporter: Arc::new(NoProgress),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    fn properties(&self) -> Vec<String> {
        let mut props: Vec<String> = BASE_PROPERTIES.iter().map(|s| s.to_string()).collect();
        for field in self.activity_fields.iter().chain([&self.window_field]) {
            if !props.contains(field) {
                props.push(field.clone());
            }
        }
        props
    }

    /// Fetch every contact whose window property falls inside `window`.
    ///
    /// A failure on the first page is an error. A failure on a later page
    /// ends pagination early and returns what was collected so far.
    pub async fn search_contacts(&self, window: &DateWindow) -> Result<Vec<Contact>> {
        info!(window = %window, field = %self.window_field, "fetching contacts");

        let mut contacts = Vec::new();
        let mut after: Option<String> = None;
        let mut page = 0u32;

        loop {
            page += 1;
            let mut body = json!({
                "filterGroups": [{
                    "filters": [
                        {
                            "propertyName": self.window_field,
                            "operator": "GTE",
                            "value": window.start.to_rfc3339(),
                        },
                        {
                            "propertyName": self.window_field,
                            "operator": "LT",
                            "value": window.end.to_rfc3339(),
                        }
                    ]
                }],
                "properties": self.properties(),
                "limit": self.page_size,
                "sorts": [{ "propertyName": self.window_field, "direction": "ASCENDING" }],
            });
            if let Some(cursor) = &after {
                body["after"] = json!(cursor);
            }

            let response = match self.post_search(&body).await {
                Ok(v) => v,
                Err(e) if page > 1 => {
                    warn!(page, error = %e, "page fetch failed, continuing with {} contacts", contacts.len());
                    break;
                }
                Err(e) => return Err(e.context("Failed to fetch contacts")),
            };

            let results = response
                .get("results")
                .and_then(|r| r.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid search response: missing results array"))?;
            if results.is_empty() {
                break;
            }

            for raw in results {
                match parse_contact(raw, &self.activity_fields) {
                    Ok(contact)
                        if self.window_field == CREATED_FIELD
                            && !window.contains(contact.created_at) =>
                    {
                        warn!(contact = %contact.id, created = %contact.created_at, "created outside window, skipping");
                    }
                    Ok(contact) => contacts.push(contact),
                    Err(e) => warn!(error = %e, "skipping contact"),
                }
            }
            debug!(page, results = results.len(), total = contacts.len(), "fetched page");
            self.reporter.report(RunProgressEvent::Fetching {
                source: self.name().to_string(),
                page,
                fetched: contacts.len() as u64,
            });

            if contacts.len() >= self.max_contacts {
                contacts.truncate(self.max_contacts);
                info!(max = self.max_contacts, "contact limit reached");
                break;
            }

            after = next_cursor(&response);
            if after.is_none() {
                break;
            }
        }

        self.reporter.report(RunProgressEvent::Fetched {
            source: self.name().to_string(),
            total: contacts.len() as u64,
        });
        info!(total = contacts.len(), "fetched contacts");
        Ok(contacts)
    }

    /// Find contacts stored under any common spelling of `raw_phone`.
    ///
    /// Results are deduplicated by id, in first-seen order.
    pub async fn find_by_phone(&self, raw_phone: &str) -> Result<Vec<Contact>> {
        let variants = phone_search_variants(raw_phone);
        if variants.is_empty() {
            bail!("'{}' is not a valid 10-digit mobile number", raw_phone);
        }

        let mut found: Vec<Contact> = Vec::new();
        for variant in &variants {
            let body = json!({
                "filterGroups": [{
                    "filters": [{ "propertyName": "phone", "operator": "EQ", "value": variant }]
                }],
                "properties": self.properties(),
                "limit": self.page_size,
            });
            let response = self
                .post_search(&body)
                .await
                .with_context(|| format!("Failed to search phone variant '{}'", variant))?;

            let results = response
                .get("results")
                .and_then(|r| r.as_array())
                .map(Vec::as_slice)
                .unwrap_or_default();
            debug!(variant = %variant, hits = results.len(), "phone lookup");

            for raw in results {
                let contact = match parse_contact(raw, &self.activity_fields) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "skipping contact");
                        continue;
                    }
                };
                if !found.iter().any(|c| c.id == contact.id) {
                    found.push(contact);
                }
            }
        }
        Ok(found)
    }

    /// POST a search body with pacing and retry/backoff.
    async fn post_search(&self, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff(attempt);
                debug!(attempt, delay_secs = delay.as_secs(), "retrying search");
                tokio::time::sleep(delay).await;
            }
            self.pacer.wait().await;

            let resp = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .context("Invalid search response body");
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "HubSpot API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }
                    bail!("HubSpot API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Search failed after retries")))
    }

    async fn post_merge(
        &self,
        survivor: &ContactId,
        absorbed: &ContactId,
    ) -> Result<ContactId, MergeError> {
        let url = format!("{}{}", self.base_url, MERGE_PATH);
        let body = json!({
            "primaryObjectId": survivor.as_str(),
            "objectIdToMerge": absorbed.as_str(),
        });

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.pacer.wait().await;

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .timeout(self.merge_timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| MergeError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                let json: Value = response
                    .json()
                    .await
                    .map_err(|e| MergeError::InvalidResponse(e.to_string()))?;
                return Ok(merged_id(&json).unwrap_or_else(|| survivor.clone()));
            }

            if status.as_u16() == 429 {
                if attempts > self.max_retries {
                    return Err(MergeError::RateLimited { attempts });
                }
                tokio::time::sleep(backoff(attempts)).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(MergeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[async_trait]
impl ContactSource for HubSpotClient {
    fn name(&self) -> &str {
        "hubspot"
    }

    async fn fetch_contacts(&self, window: &DateWindow) -> Result<Vec<Contact>> {
        self.search_contacts(window).await
    }
}

#[async_trait]
impl MergeExecutor for HubSpotClient {
    async fn merge(
        &self,
        survivor: &ContactId,
        absorbed: &ContactId,
    ) -> Result<ContactId, MergeError> {
        debug!(%survivor, %absorbed, "merging");
        self.post_merge(survivor, absorbed).await
    }
}

/// Enforces a minimum interval between requests.
struct Pacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    fn per_second(rate: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / rate.max(1),
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.interval;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 2^5 seconds.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

fn next_cursor(response: &Value) -> Option<String> {
    let after = response.pointer("/paging/next/after")?;
    match after {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn merged_id(response: &Value) -> Option<ContactId> {
    match response.get("id")? {
        Value::String(s) if !s.is_empty() => Some(ContactId::new(s.clone())),
        Value::Number(n) => Some(ContactId::new(n.to_string())),
        _ => None,
    }
}

/// Convert one search result into a [`Contact`].
///
/// Creation time comes from the top-level `createdAt`, falling back to the
/// `createdate` property. A result with neither is rejected.
pub fn parse_contact(raw: &Value, activity_fields: &[String]) -> Result<Contact> {
    let id = match raw.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => bail!("search result without id"),
    };
    let empty = serde_json::Map::new();
    let props = raw
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);
    let prop = |name: &str| {
        props
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let created_at = raw
        .get("createdAt")
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)
        .or_else(|| prop(CREATED_FIELD).and_then(parse_timestamp))
        .with_context(|| format!("contact {} has no parsable creation date", id))?;

    let last_activity_at = activity_fields.iter().find_map(|field| {
        let value = prop(field.as_str())?;
        let parsed = parse_timestamp(value);
        if parsed.is_none() {
            warn!(contact = %id, field = %field, value, "unparsable activity timestamp");
        }
        parsed
    });

    Ok(Contact {
        id: ContactId::new(id),
        created_at,
        last_activity_at,
        phone: prop("phone").map(str::to_string),
        email: prop("email").map(str::to_string),
        lifecycle_stage: prop("lifecyclestage").and_then(LifecycleStage::parse),
        first_name: prop("firstname").map(str::to_string),
        last_name: prop("lastname").map(str::to_string),
    })
}

/// Parse the timestamp formats HubSpot returns: RFC 3339, epoch
/// milliseconds, or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = value.parse().ok()?;
        return Utc.timestamp_millis_opt(millis).single();
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
}

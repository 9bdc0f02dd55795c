//! # Contact Dedup
//!
//! Finds and merges duplicate CRM contacts created in a date window.
//!
//! Contacts are fetched from HubSpot, grouped by normalized phone number
//! and by normalized email, and every duplicate group gets a deterministic
//! merge plan: the most recently active contact survives. Groups of four or
//! more are left for a person to review.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌──────────────┐
//! │ ContactSource│──▶│ normalize → group │──▶│ MergeExecutor│
//! │  (HubSpot)   │   │      → plan       │   │  (HubSpot)   │
//! └──────────────┘   └─────────┬─────────┘   └──────────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//!              ┌──────────┐        ┌──────────┐
//!              │ summary  │        │   CSV    │
//!              │ (stdout) │        │  export  │
//!              └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export HUBSPOT_TOKEN=pat-...
//! dedup check                         # validate config and token
//! dedup scan --date 2025-08-14        # plan only, no changes
//! dedup scan --date 2025-08-14 --export
//! dedup merge --date 2025-08-14 --yes # execute the plans
//! dedup lookup "+91 98765 43210"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Phone and email keys |
//! | [`group`] | Duplicate grouping |
//! | [`plan`] | Merge planning |
//! | [`run`] | Run coordination |
//! | [`hubspot`] | HubSpot fetcher and merge executor |
//! | [`traits`] | Source and executor seams |
//! | [`window`] | Date windows |
//! | [`progress`] | Progress events |
//! | [`report`] | Terminal summaries |
//! | [`export`] | CSV export |

pub mod config;
pub mod export;
pub mod group;
pub mod hubspot;
pub mod models;
pub mod normalize;
pub mod plan;
pub mod progress;
pub mod report;
pub mod run;
pub mod traits;
pub mod window;

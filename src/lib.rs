//! # Archive Harvest
//!
//! An incremental harvester for a monthly HTML question archive.
//!
//! The archive publishes one rolling "latest" page plus one page per past
//! month. A sync run fetches the latest page, then walks the monthly pages
//! backward until the archive answers not-found. Every page is split into
//! dated records with content-derived ids and bulk-upserted into a
//! full-text index, so re-running a sync overwrites instead of duplicating.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────────┐
//! │  fetch   │──▶│  parse   │──▶│   bulk   │──▶│    index      │
//! │ +cache   │   │ records  │   │ ≤300/req │   │ ES/SQLite/mem │
//! └──────────┘   └──────────┘   └──────────┘   └───────────────┘
//!        ▲                                            │
//!        └──────────── sync (latest → month-1 …) ─────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qah init                         # create or recreate the index
//! qah sync                         # latest page + full backward walk
//! qah sync --latest-only           # refresh only the rolling page
//! qah search "frog"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed failures for fetch, parse, index and sync |
//! | [`identity`] | Content-derived record ids |
//! | [`cache`] | On-disk page cache |
//! | [`fetch`] | HTTP page source with read-through caching |
//! | [`parse`] | Page → records extraction |
//! | [`index`] | Search index backends |
//! | [`bulk`] | Chunked bulk upserts |
//! | [`sync`] | Crawl orchestration |
//! | [`search`] | CLI search |
//! | [`notify`] | Run status notification |
//! | [`progress`] | Sync progress on stderr |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |

pub mod bulk;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod index;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod parse;
pub mod progress;
pub mod search;
pub mod sync;

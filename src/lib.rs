//! # Kilnlog
//!
//! Studio records and artwork lookup for ceramics studios.
//!
//! Kilnlog registers walk-in customers, stores photos of intake forms and
//! finished pieces, tracks each job through a fixed workflow, and answers
//! "have we seen this piece before?" with a heuristic visual-similarity
//! search over recent records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────┐
//! │  Intake  │──▶│ Record Store  │   │  Blob    │
//! │ form+OCR │   │   (SQLite)    │   │  Store   │
//! └──────────┘   └──────┬────────┘   └────┬─────┘
//!                       │                 │
//!          ┌────────────┤        ┌────────┤
//!          ▼            ▼        ▼        ▼
//!     ┌──────────┐  ┌──────────────────────┐
//!     │   CLI    │  │  Similarity Search   │
//!     │  (kiln)  │  │  (per-request, pure) │
//!     └──────────┘  └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kiln init                                 # create database + image dir
//! kiln add --name "Maya R." --program wheel --date 2024-06-12
//! kiln attach 1 work photo.jpg              # store an artwork photo
//! kiln similar query.jpg                    # ranked visual matches
//! kiln serve                                # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Record store (CRUD, paging, text search) |
//! | [`blobs`] | File-backed image storage |
//! | [`similarity`] | Heuristic visual-similarity search |
//! | [`ocr`] | OCR provider abstraction |
//! | [`export`] | CSV and ZIP exports |
//! | [`manage`] | CLI command entry points |
//! | [`server`] | HTTP JSON API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blobs;
pub mod config;
pub mod db;
pub mod export;
pub mod manage;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod server;
pub mod similarity;
pub mod store;

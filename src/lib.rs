// src/lib.rs

//! Hospital registry fetcher library.
//!
//! Discovers data file links on public registry pages, downloads them, and
//! keeps one snapshot per file identity, replacing it only when the content
//! changes. A tick-driven scheduler decides when to run.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod schedule;
pub mod services;
pub mod storage;
pub mod utils;

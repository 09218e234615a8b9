//! Storage Integration Tests
//!
//! Buckets, persistence and snapshot isolation through `Database`.

#[path = "../common/mod.rs"]
mod common;

mod persistence;

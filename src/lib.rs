//! Blue/green deployment manager for a single git-backed application.
//!
//! Fetches the application's repository, materializes an immutable instance
//! snapshot, starts it on a fresh port, waits for it to answer, then swaps it
//! in and retires the previous instance. Exactly one instance is publicly
//! reachable at any time, and a failed deployment never takes down the
//! instance that was already serving.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod application;
pub mod domain;
pub mod infra;

//! Batch grader for student compiler submissions.
//!
//! Submissions arrive as zip archives carrying a `config.json` manifest. The
//! grader validates them into compiler instances, extracts each one into a
//! fingerprint-keyed cache, discovers test cases on disk, compiles every valid
//! instance under a worker budget and runs the instance × case cross-product
//! in round-robin order. The split:
//!
//! - **[`core`]**: Pure, deterministic logic (natural ordering, round-robin
//!   task order, result types). No I/O.
//! - **[`io`]**: Filesystem side of the grader (archive inspection,
//!   extraction cache, test discovery, config, case scaffolding).
//! - **[`schedule`]**: Bounded-parallel compile and test phases driven through
//!   the [`capability::CompilerCapability`] trait.

pub mod capability;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod schedule;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

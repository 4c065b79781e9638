//! Deterministic, pure logic shared by the grader.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod natural;
pub mod round_robin;
pub mod types;
pub mod worker_slots;

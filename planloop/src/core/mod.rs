//! Deterministic, pure logic shared by planloop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod graph;
pub mod markdown;
pub mod progress;
pub mod selector;
pub mod session_update;
pub mod status;
pub mod types;
pub mod verification;

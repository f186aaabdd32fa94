//! Shared test utilities for certgen integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with temp directories and an
//!   in-memory database
//! - `ScriptedRenderer` for injecting per-student failures and delays
//! - Builders for batch and single-certificate requests

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedRenderer, TestHarness};

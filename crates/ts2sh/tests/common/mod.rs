//! Shared test utilities for ts2sh integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated orchestrators over temp directories and an
//!   in-memory database
//! - `FakeCompiler`, a scriptable stand-in for the TypeScript compiler
//! - Builders for configurations and source sets

pub mod builders;
pub mod fake_compiler;
pub mod harness;

pub use builders::*;
pub use fake_compiler::FakeCompiler;
pub use harness::TestHarness;

//! Test utilities for use-case and HTTP-level testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository and port implementations
//! - `TestAppStateBuilder` for constructing an `AppState` over those mocks

mod app_state_builder;
mod factories;
mod subscription_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use subscription_mocks::*;

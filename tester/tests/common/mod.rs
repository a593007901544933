//! Common test utilities for the tester suites
//!
//! Each suite compiles this module on its own and uses a different subset.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{FakeArm, FakeSite};

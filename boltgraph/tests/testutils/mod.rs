//! Test utilities for BoltGraph integration tests
//!
//! - TestFixture: an on-disk database in a temporary directory
//! - BoltClient: a minimal Bolt client over TCP

#![allow(dead_code)]

pub mod bolt_client;
pub mod test_fixture;

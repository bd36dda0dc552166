//! Shared test utilities for the ClickHouse credential plugin.
//!
//! This crate provides:
//! - An in-memory ClickHouse double and a connection producer for it
//! - Proptest generators for plugin request data
//! - Test fixtures with sample statements and configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{MockClickhouse, MockConnectionProducer, MockUser};

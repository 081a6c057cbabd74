//! Sentinel trade pipeline
//!
//! Pre-trade safety checks, order book driven limit pricing, currency
//! conversion, order placement and a durable retry queue for orders the
//! broker turned away while the market was closed.

pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod persistence;
pub mod task_runner;

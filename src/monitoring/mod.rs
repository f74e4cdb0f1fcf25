#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Observability: Prometheus metrics and the monitor line notifier.

pub mod metrics;
pub mod monitor;

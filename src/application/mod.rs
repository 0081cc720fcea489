//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`.

pub mod ports;
pub mod services;

pub use ports::{
    AppRunner, DeployListener, LineSink, PortAllocator, ReadinessGate, ReadinessWaiter,
    RepositorySync, RunnerFactory, WorkingCopy,
};

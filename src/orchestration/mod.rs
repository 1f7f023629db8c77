//! # Orchestration
//!
//! Bringing the substrate up and down in a consistent order.
//!
//! - [`dependency_graph`]: start-order computation with cycle detection
//! - [`bootstrap`]: service registration, dependency-ordered start with retry
//!   and health checks, reverse-order teardown
//! - [`core`]: [`SubstrateCore`], the dependency-injection root that owns every
//!   component and registers them as services

pub mod bootstrap;
pub mod core;
pub mod dependency_graph;

pub use bootstrap::{
    BootstrapError, BootstrapReport, ServiceBootstrap, ServiceDescriptor, ServiceHealthCheck, ServiceInit,
    ServiceOptions, ServiceShutdown, ServiceStatus,
};
pub use core::{SubstrateCore, SubstrateCoreBuilder, SubstrateHealth};
pub use dependency_graph::DependencyGraph;

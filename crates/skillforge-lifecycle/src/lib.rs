//! Error-to-skill lifecycle for skillforge.
//!
//! When a host reports a runtime failure, [`SkillLifecycleManager`] turns it
//! into an [`ErrorContext`], asks the discovery service for a skill that
//! addresses it, files a new error node if none exists, and can invoke the
//! skill through the router. Adapters delivered by an invocation are
//! adopted into the manager's [`AdapterStore`](skillforge_store::AdapterStore).
//!
//! The remote services sit behind the [`DiscoveryService`] and
//! [`RouterService`] traits; [`HttpDiscoveryClient`] and [`HttpRouterClient`]
//! are the JSON/HTTP implementations.

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod router;
pub mod telemetry;
mod transport;

pub use config::LifecycleConfig;
pub use context::{
    ErrorContext, HostFailure, InvocationResult, LifecycleStage, Priority, SkillDiscoveryResult,
    SkillResolution,
};
pub use discovery::{
    DiscoveryService, ErrorClusterQueryRequest, ErrorClusterQueryResponse,
    ErrorNodeSubmissionRequest, ErrorNodeSubmissionResponse, HttpDiscoveryClient, QueryStatus,
    SkillNodeResult,
};
pub use error::{LifecycleError, Result};
pub use manager::SkillLifecycleManager;
pub use router::{HttpRouterClient, RouterInvokeRequest, RouterInvokeResponse, RouterService};

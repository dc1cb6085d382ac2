//! Offer-driven orchestrator for Riak clusters.
//!
//! The scheduler runs embedded in the process that talks to the cluster
//! master. That process implements [`scheduler::SchedulerDriver`],
//! [`scheduler::NodeManagement`], [`scheduler::StateStore`] and
//! [`scheduler::OperatorInbox`] (the last two come ready-made with
//! [`state::PgStateStore`]), builds a [`SchedulerCore`], and feeds master
//! callbacks to an [`EventLoop`] as [`SchedulerEvent`]s.
//!
//! The `orchestrator` binary is the operator tool. It queues mutating
//! requests in the store's inbox for the running scheduler to apply, and
//! reads the persisted state for listings.

pub mod cluster;
pub mod config;
pub mod error;
pub mod node;
pub mod reconciliation;
pub mod resources;
pub mod scheduler;
pub mod state;
pub mod types;

pub use cluster::Cluster;
pub use config::Config;
pub use error::{OrchestratorError, Result};
pub use node::LogicalNode;
pub use scheduler::{EventLoop, SchedulerCore, SchedulerEvent, SchedulerSettings};
pub use state::SchedulerRuntimeState;

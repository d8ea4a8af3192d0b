//! Multi-party approval for sensitive operations.
//!
//! - `config` - signer registry
//! - `policy` - thresholds and veto rules
//! - `request` - approval requests and canonical payloads
//! - `workflow` - the state machine

pub mod config;
pub mod policy;
pub mod request;
pub mod workflow;

pub use config::SignerRegistry;
pub use policy::{ApprovalPolicy, ThresholdPolicy, VetoPolicy};
pub use request::{ApprovalRequest, ApprovalStatus, Decision, Operation, OperationKind};
pub use workflow::{ApprovalWorkflow, Clock, ManualClock, SystemClock};

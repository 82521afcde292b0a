//! # ciam-core
//!
//! Flow contract shared by the authentication executors of the CIAM flow
//! engine.
//!
//! The flow engine hands every executor an immutable [`NodeContext`] and
//! receives exactly one [`ExecutorResponse`] back. Recoverable outcomes
//! (a wrong code, an unknown user) are expressed as a response with
//! [`ExecutorStatus::Failure`]; only configuration and infrastructure faults
//! surface as [`ExecutorError`].
//!
//! ## Modules
//!
//! - [`context`] - Per-invocation flow context
//! - [`response`] - Executor response, resolved identity and audit record
//! - [`error`] - Classified capability errors and fatal executor errors
//! - [`outcome`] - Short-circuiting step results
//! - [`executor`] - The executor trait and registry

pub mod context;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod response;

pub use context::{FlowType, NodeContext};
pub use error::{ExecutorError, ServiceError, ServiceErrorType, USER_NOT_FOUND};
pub use executor::{Executor, ExecutorRegistry};
pub use outcome::Outcome;
pub use response::{
    AuthenticatedUser, ExecutionRecord, ExecutorResponse, ExecutorStatus, ExecutorType, InputData,
};

//! Action kernel for Keel.
//!
//! Extracts tool calls from model output, routes them through the policy
//! engine and confirmation checks, and dispatches them to prefix-owned
//! handlers.

pub mod confirmation;
pub mod error;
pub mod extract;
pub mod handler;
pub mod router;

pub use confirmation::{ConfirmationGate, PendingConfirmation};
pub use error::ActionError;
pub use extract::{extract, JsonBlockExtractor, ToolCallExtractor};
pub use handler::{ActionHandler, ActionRegistry, MemoryHandler, PlanningHandler};
pub use router::Router;

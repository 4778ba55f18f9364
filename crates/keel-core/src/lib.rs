pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::{KeelConfig, PolicyConfig};
pub use error::{KeelError, Result};
pub use policy::{suggest_alternative, PolicyEngine};
pub use types::*;

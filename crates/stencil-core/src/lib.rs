pub mod config;
pub mod error;
pub mod event;
pub mod security;
pub mod traits;
pub mod types;

pub use config::{AppConfig, WorkflowConfig};
pub use error::{Result, StencilError};
pub use event::EventBus;
pub use types::*;

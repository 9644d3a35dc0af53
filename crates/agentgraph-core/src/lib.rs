pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{AgentGraphError, Result};
pub use event::EventBus;
pub use model::{
    Edge, ExecutionState, GatingRule, GraphDefinition, LogEntry, LogLevel, NodeDefinition, Port,
    VersionSnapshot,
};
pub use traits::GraphStore;
pub use types::*;

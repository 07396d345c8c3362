pub mod analytics;
pub mod booking;
pub mod config;
pub mod dedupe;
pub mod errors;
pub mod events;
pub mod funnel;
pub mod persistence;
pub mod sequencer;

pub use config::EngineConfig;
pub use errors::{EngineError, StoreError};
pub use funnel::{FunnelDefinition, Step, StepType};
pub use sequencer::{AdvanceOutcome, AdvanceRejection, FunnelSession, SessionContext};

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod human_loop;
pub mod llm;
pub mod memory;
pub mod persona;
pub mod session;
pub mod testing;

pub mod prelude {
    pub use crate::channel::{BotIdentity, InboundMessage, MessageSink};
    pub use crate::config::Config;
    pub use crate::context::ContextWindow;
    pub use crate::error::{ChatError, Result};
    pub use crate::gate::DeliveryGate;
    pub use crate::human_loop::{HumanLoopProvider, HumanLoopRequest, HumanLoopResponse};
    pub use crate::llm::LlmClient;
    pub use crate::memory::{DecodePolicy, Exchange, HistoryStore, UserId};
    pub use crate::persona::{Personalities, PersonalityTemplate};
    pub use crate::session::{Session, SessionConfig, TurnOutcome};
}

//! Scheduling core for actor dialogue: who talks next, which request they
//! serve, when their lines are shown.

pub mod actors;
pub mod clock;
pub mod config;
pub mod host;
pub mod scheduling;
pub mod talk;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::TalkCfg;
pub use host::{Host, PromptSource};
pub use talk::TalkService;

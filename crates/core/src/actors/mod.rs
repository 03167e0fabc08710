pub mod registry;
pub mod state;

pub use registry::ActorRegistry;
pub use state::{ActorSnapshot, ActorState, QueuedLine};

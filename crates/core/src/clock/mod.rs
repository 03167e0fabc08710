pub mod reply_clock;
pub mod tick_rate;

pub use reply_clock::{ReplyAge, ReplyClock};
pub use tick_rate::TickRate;

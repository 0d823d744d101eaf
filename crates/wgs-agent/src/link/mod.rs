//! Link acquisition with bounded retry

mod reconnect;
mod state;
mod supervisor;

pub use reconnect::ExponentialBackoff;
pub use state::{LinkAction, LinkStateMachine};
pub use supervisor::{LinkSupervisor, LINK_EVENT_CHANNEL_CAPACITY};

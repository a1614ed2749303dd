//! Live entry stream: bounded buffer fed by a push channel and backfill pages

mod backfill;
mod buffer;
mod focus;
mod live;
mod scroll;
mod session;
mod transport;

pub use live::ConnectionState;
#[cfg(test)]
pub(crate) use live::LiveEvent;
pub use scroll::{AnchorMode, NullViewport, Viewport, ViewportSignal};
pub use session::{FeedSession, FeedSettings, FeedSnapshot, FeedUpdate};
pub use transport::{FeedEvent, FeedTransport, NetworkTransport, EVENT_CHANNEL_CAPACITY};

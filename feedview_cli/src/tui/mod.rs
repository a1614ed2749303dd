//! Terminal User Interface for the traffic feed

mod app;
mod ui;

pub use app::{TuiApp, UserAction};
pub(crate) use ui::format_time;
pub use ui::draw;

//! Terminal screens for the three binaries, drawn with ratatui.

mod dashboard_view;
mod device_selector;
mod error;
mod fold_until_stop;
mod race_view;
mod server_view;

pub use dashboard_view::{draw_dashboard, DashboardView};
pub use device_selector::device_selector;
pub use error::GuiError;
pub use fold_until_stop::fold_until_stop;
pub use race_view::{draw_race, track_line, RaceView};
pub use server_view::{draw_server, ServerView};

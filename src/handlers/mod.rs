pub mod acs;
pub mod api;
pub mod relay;

pub use acs::{call_events, initiate_call};
pub use api::health_check;
pub use relay::{media_handler, realtime_handler};

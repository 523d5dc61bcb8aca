//! Statistics

pub mod metrics;

pub use metrics::{ChannelCounters, ChannelStats, DestinationStats, SessionStats};

//! Access points: remote dependencies resolved through the registry.

pub mod table;
pub mod updater;

pub use table::{default_extractor, AccessPointUpdate, AccessPoints, PropsExtractor};
pub use updater::{AccessPointsUpdater, PollResult, DEFAULT_POLL_INTERVAL};

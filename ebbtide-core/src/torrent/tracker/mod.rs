//! Tracker communication: announce types and the HTTP transport.

pub mod client;
pub mod types;

pub use client::HttpTracker;
pub use types::{AnnounceEvent, AnnounceRequest, AnnounceResponse, TrackerClient};

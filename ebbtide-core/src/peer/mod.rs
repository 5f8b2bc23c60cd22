//! Peer connection handling: handshake codec and connection-attempt tasks.

pub mod connection;
pub mod handshake;

pub use handshake::Handshake;

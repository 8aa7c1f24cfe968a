//! WhatsApp Web transport for Alya.
//!
//! Speaks to a Node.js Baileys sidecar over a local WebSocket. The sidecar
//! owns the actual WhatsApp socket; this crate spawns it, multiplexes
//! sessions over one link and adapts its frames to [`alya_bot::Transport`].

pub mod error;
pub mod process;
pub mod sidecar;
pub mod transport;
pub mod types;

pub use {
    error::{Error, Result},
    process::{SidecarProcess, locate_sidecar},
    sidecar::SidecarLink,
    transport::{SidecarSession, SidecarSettings, SidecarTransport},
};

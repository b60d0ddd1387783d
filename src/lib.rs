//! Host-resource bridge for a cycle-stepped NES emulation core.
//!
//! The core itself is an opaque guest: it receives one contiguous memory
//! region holding cartridge ROM, optional battery RAM, and a trailing
//! live input bitmask, then drives the host through callbacks for video,
//! audio, and persistence. This crate owns the host side of that
//! contract:
//!
//! - [`region::SharedRegion`] lays out the shared memory and carries the
//!   input mask tail.
//! - [`inputs::InputEncoder`] turns key events into mask bit edges.
//! - [`video::FrameRenderer`] blits completed 256x240 RGBA frames to a
//!   pluggable [`video::Surface`].
//! - [`audio::AudioOutput`] runs the four synthesized voices (or the raw
//!   sample ring) and feeds the playback device.
//! - [`save::SaveStore`] persists battery RAM per cartridge identity.
//! - [`session::Bridge`] ties the pieces into the single active session.

pub mod audio;
pub mod error;
pub mod inputs;
pub mod region;
pub mod save;
pub mod session;
pub mod video;

pub use audio::{AudioOutput, AudioPath};
pub use error::BridgeError;
pub use inputs::{Button, InputEncoder};
pub use region::{MaskWidth, SharedRegion};
pub use save::SaveStore;
pub use session::{Bridge, EmulationCore, HostBridge, Session, SessionConfig};
pub use video::{Framebuffer, Surface, FRAME_BYTES, HEIGHT, WIDTH};

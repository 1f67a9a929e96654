//! Nether-MML: tracker song to MML transpiler
//!
//! Converts a normalized [`TrackerSong`](nether_tracker::TrackerSong) into the
//! macro language played by the sound driver, then shrinks the result with
//! loss-free loop folding and subroutine extraction.
//!
//! # Architecture
//!
//! ```text
//!     ┌────────────────────┐
//!     │    TrackerSong     │  (nether-tracker)
//!     └─────────┬──────────┘
//!               │ linearize: order list → row streams, TempoResolver
//!               ▼
//!     ┌────────────────────┐
//!     │     LinearSong     │  rows + timer/ticks per row
//!     └─────────┬──────────┘
//!               │ transpile: per-channel state machine
//!               ▼
//!     ┌────────────────────┐
//!     │   Vec<Token> × 8   │
//!     └─────────┬──────────┘
//!               │ compress: loops, then subroutines across channels
//!               ▼
//!     ┌────────────────────┐
//!     │      MmlSong       │  #Title / #Timer / !subN / A..H
//!     └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nether_mml::{ConversionContext, ConversionOptions};
//! # fn load() -> nether_tracker::TrackerSong { unimplemented!() }
//!
//! let options = ConversionOptions::from_toml_str("[compression]\nlevel = \"coarse\"")?;
//! let mut context = ConversionContext::new(options);
//! let song = context.convert_song(&load())?;
//! println!("{}", song.render());
//! # Ok::<(), nether_mml::MmlError>(())
//! ```

pub mod compress;
mod config;
mod context;
mod error;
pub mod linearize;
pub mod tempo;
pub mod token;
pub mod transpile;

pub use config::{
    CompressionConfig, CompressionLevel, ConversionOptions, TimingConfig, TimingMode,
    TimingOverride,
};
pub use context::{ConversionContext, MmlChannel, MmlSong};
pub use error::{MmlError, Result};
pub use token::{Pitch, Token, render_tokens};

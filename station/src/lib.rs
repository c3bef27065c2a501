//! Host CW station built on `keyer-core`
//!
//! Sends typed text through the keyer, plays the sidetone on the default
//! audio device and prints what the decoder hears.

pub mod app;
pub mod audio;
pub mod cli;

pub use app::Station;
pub use audio::{render_buffer, render_converted, CpalOutput, NullOutput, StationSynth};
pub use cli::{parse_line, Cli, Command};

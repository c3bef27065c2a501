//! Command line and interactive line commands

use clap::{Parser, ValueEnum};
use keyer_core::{DecoderConfig, KeyerConfig, KeyerError, KeyingMode, Shape, SynthParams};

/// Keying modes selectable on the command line
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Keyboard,
    Straight,
    IambicA,
    IambicB,
    FullBug,
    SemiBug,
}

impl From<ModeArg> for KeyingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Keyboard => KeyingMode::Keyboard,
            ModeArg::Straight => KeyingMode::StraightKey,
            ModeArg::IambicA => KeyingMode::IambicA,
            ModeArg::IambicB => KeyingMode::IambicB,
            ModeArg::FullBug => KeyingMode::FullyAutomaticBug,
            ModeArg::SemiBug => KeyingMode::SemiAutomaticBug,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShapeArg {
    Sharp,
    Ramp,
    Cosine,
}

impl From<ShapeArg> for Shape {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::Sharp => Shape::Sharp,
            ShapeArg::Ramp => Shape::Ramp,
            ShapeArg::Cosine => Shape::Cosine,
        }
    }
}

/// CW station: type text to send it, decoded text is printed back
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// Keying mode
    #[arg(short, long, value_enum, default_value = "keyboard")]
    pub mode: ModeArg,

    /// Sending speed in words per minute
    #[arg(short, long, default_value_t = 20.0)]
    pub wpm: f32,

    /// Dash length in dits
    #[arg(long, default_value_t = 3.0)]
    pub weighting: f32,

    /// Sidetone frequency in Hz
    #[arg(short, long, default_value_t = 700.0)]
    pub freq: f32,

    /// Envelope rise time in milliseconds
    #[arg(long, default_value_t = 5.0)]
    pub rise_ms: f32,

    /// Envelope fall time in milliseconds
    #[arg(long, default_value_t = 5.0)]
    pub fall_ms: f32,

    /// Envelope shape
    #[arg(long, value_enum, default_value = "cosine")]
    pub shape: ShapeArg,

    /// Output gain, 0.0 to 1.0
    #[arg(long, default_value_t = 0.5)]
    pub volume: f32,

    /// Initial decoder speed, defaults to --wpm
    #[arg(long)]
    pub decoder_wpm: Option<f32>,

    /// Run without an audio device
    #[arg(long)]
    pub no_audio: bool,

    /// Sample rate used when no device supplies one
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,
}

impl Cli {
    pub fn keyer_config(&self) -> Result<KeyerConfig, KeyerError> {
        KeyerConfig::new(self.mode.into(), self.wpm, self.weighting)
    }

    pub fn synth_params(&self) -> Result<SynthParams, KeyerError> {
        SynthParams::new(
            self.sample_rate,
            self.freq,
            self.rise_ms / 1000.0,
            self.fall_ms / 1000.0,
            self.shape.into(),
            self.volume,
        )
    }

    pub fn decoder_config(&self) -> Result<DecoderConfig, KeyerError> {
        let defaults = DecoderConfig::default();
        DecoderConfig::new(
            self.decoder_wpm.unwrap_or(self.wpm),
            self.weighting,
            defaults.thresholds,
            defaults.poll_interval,
        )
    }
}

/// Line typed on stdin
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Text to send
    Send(String),
    Speed(f32),
    Mode(KeyingMode),
    Frequency(f32),
    Mute(bool),
    /// Drop text not yet sent
    Clear,
    Quit,
}

/// Parse one input line. Lines starting with `:` are commands, anything
/// else is text to send.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Command::Send(line.to_string()));
    };
    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();
    match (name, arg) {
        ("quit" | "q", None) => Ok(Command::Quit),
        ("wpm", Some(v)) => v
            .parse()
            .map(Command::Speed)
            .map_err(|_| format!("bad speed {:?}", v)),
        ("freq", Some(v)) => v
            .parse()
            .map(Command::Frequency)
            .map_err(|_| format!("bad frequency {:?}", v)),
        ("mode", Some(v)) => ModeArg::from_str(v, true)
            .map(|m| Command::Mode(m.into()))
            .map_err(|_| format!("unknown mode {:?}", v)),
        ("mute", None) => Ok(Command::Mute(true)),
        ("unmute", None) => Ok(Command::Mute(false)),
        ("clear", None) => Ok(Command::Clear),
        _ => Err(format!("unknown command {:?}", line)),
    }
}

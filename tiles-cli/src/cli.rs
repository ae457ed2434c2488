use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tiles", about = "Falling-tiles piano game played on a real (or simulated) piano")]
pub struct Cli {
    /// Song timeline (JSON). A C major scale is played when omitted.
    pub song: Option<PathBuf>,

    /// Engine config (JSON). Flags below override it.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Where note audio comes from
    #[arg(short, long, value_enum, default_value_t = InputMode::Simulate)]
    pub input: InputMode,

    /// Play the song once instead of looping
    #[arg(long)]
    pub no_loop: bool,

    /// Tile fall duration in milliseconds
    #[arg(long)]
    pub lead_time_ms: Option<f64>,

    /// Input latency to compensate, in milliseconds
    #[arg(long)]
    pub latency_ms: Option<f64>,

    /// Game tick interval in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Shift simulated notes by this many milliseconds (negative = early)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub simulate_offset_ms: f64,

    /// Print one JSON report per tick instead of the text HUD
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Default microphone (needs the `capture` feature)
    Mic,
    /// Synthesized tones of the song itself
    Simulate,
    /// Keyboard input on stdin only
    None,
}

//! Command-line argument definitions
//!
//! The `#[derive(Parser)]` and `#[derive(Subcommand)]` types live here so
//! `main.rs` stays focused on dispatch.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// RBE - reassigned bandwidth-enhanced analysis, processing and rendering
#[derive(Parser)]
#[command(name = "rbe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Analyze a sound file into bandwidth-enhanced partials
    Analyze(AnalyzeArgs),

    /// Render partials from an SDIF or SPC file to AIFF
    Synth {
        /// Partials file (.sdif or .spc)
        input: PathBuf,

        /// Output AIFF path
        #[arg(short, long)]
        output: PathBuf,

        /// Output sample rate in Hz
        #[arg(long, default_value_t = 44100.0)]
        rate: f64,

        /// Sample size in bits (8, 16, 24 or 32)
        #[arg(long, default_value_t = 16)]
        bits: u16,

        /// Fade time in seconds at the ends of each partial
        #[arg(long, default_value_t = 0.001)]
        fade: f64,
    },

    /// Morph between two labeled sounds
    Morph {
        /// Source partials (.sdif or .spc)
        source: PathBuf,

        /// Target partials (.sdif or .spc)
        target: PathBuf,

        /// Output partials path (.sdif or .spc)
        #[arg(short, long)]
        output: PathBuf,

        /// Time at which the morph leaves the source
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Time at which the morph reaches the target
        #[arg(long, default_value_t = 1.0)]
        end: f64,

        /// Amplitude morph shape; large values give a linear morph
        #[arg(long)]
        amp_shape: Option<f64>,

        /// Label of the source frequency reference partial (0 for none)
        #[arg(long, default_value_t = 0)]
        source_ref: i32,

        /// Label of the target frequency reference partial (0 for none)
        #[arg(long, default_value_t = 0)]
        target_ref: i32,
    },

    /// Warp partial times so that features at FROM times land on TO times
    Dilate {
        /// Partials file (.sdif or .spc)
        input: PathBuf,

        /// Output partials path (.sdif or .spc)
        #[arg(short, long)]
        output: PathBuf,

        /// Comma-separated initial feature times
        #[arg(long, value_delimiter = ',', required = true)]
        from: Vec<f64>,

        /// Comma-separated target feature times
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<f64>,
    },

    /// Summarize a partials file
    Info {
        /// Partials file (.sdif or .spc)
        input: PathBuf,
    },

    /// Write labeled partials to a Kyma SPC file
    Spc {
        /// Partials file (.sdif or .spc)
        input: PathBuf,

        /// Output SPC path
        #[arg(short, long)]
        output: PathBuf,

        /// MIDI note number of the sound
        #[arg(long, default_value_t = 60.0)]
        note: f64,

        /// Drop bandwidth and write sinusoidal data only
        #[arg(long)]
        sine_only: bool,

        /// Fade toward silence over this many seconds before the end
        #[arg(long, default_value_t = 0.0)]
        end_approach: f64,
    },

    /// Manage the analysis cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Play partials or an AIFF file on the default output device
    #[cfg(feature = "playback")]
    Play {
        /// Partials file (.sdif or .spc) or AIFF
        input: PathBuf,
    },
}

#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// List cached analyses
    List,
    /// Delete every cached analysis
    Clear,
}

/// Options of the `analyze` command
#[derive(Args)]
pub(crate) struct AnalyzeArgs {
    /// Sound file to analyze (AIFF, WAV, FLAC, MP3, OGG)
    pub input: PathBuf,

    /// Frequency resolution in Hz
    #[arg(short, long)]
    pub resolution: Option<f64>,

    /// Analysis window main lobe width in Hz (defaults to the resolution)
    #[arg(short, long)]
    pub window: Option<f64>,

    /// Start from a saved preset
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Save the effective parameters as a preset under this name
    #[arg(long)]
    pub save_preset: Option<String>,

    /// Amplitude floor in dB (negative)
    #[arg(long, allow_hyphen_values = true)]
    pub amp_floor: Option<f64>,

    /// Lowest retained frequency in Hz
    #[arg(long)]
    pub freq_floor: Option<f64>,

    /// Largest frequency change between linked breakpoints in Hz
    #[arg(long)]
    pub freq_drift: Option<f64>,

    /// Time between analysis frames in seconds
    #[arg(long)]
    pub hop_time: Option<f64>,

    /// Largest time correction allowed by reassignment in seconds
    #[arg(long)]
    pub crop_time: Option<f64>,

    /// Width of the bandwidth association regions in Hz
    #[arg(long)]
    pub bw_region_width: Option<f64>,

    /// Window sidelobe attenuation in dB (positive)
    #[arg(long)]
    pub sidelobe_level: Option<f64>,

    /// Skip bandwidth association (sinusoidal partials only)
    #[arg(long)]
    pub no_bandwidth: bool,

    /// Channelize and distill around this fundamental (Hz)
    #[arg(long)]
    pub distill: Option<f64>,

    /// Collate unlabeled partials into as few as possible
    #[arg(long)]
    pub collate: bool,

    /// Resample every partial at this interval in seconds
    #[arg(long)]
    pub resample: Option<f64>,

    /// Resample the input to this rate before analysis
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Bypass the analysis cache
    #[arg(long)]
    pub no_cache: bool,

    /// Output partials path (.sdif or .spc)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also render the partials to this AIFF path
    #[arg(long)]
    pub render: Option<PathBuf>,
}

//! Sound and partial files for RBE
//!
//! - AIFF sample files, read and rendered from partials
//! - SDIF partial files (`RBEP`, `1TRC`, `RBEL`)
//! - Kyma SPC spectral envelope files
//! - Sample loading through symphonia, analysis presets and a partial cache

mod aiff;
mod cache;
mod chunks;
mod config;
mod error;
mod loader;
mod sdif;
mod spc;

pub use aiff::{export_aiff, AiffFile};
pub use cache::{file_stamp, CacheEntry, PartialCache};
pub use config::{AnalysisPreset, Presets};
pub use error::{FileError, Result};
pub use loader::{LoadedSound, SampleLoader};
pub use sdif::{export_sdif, import_sdif, SdifFile, SdifFormat};
pub use spc::{export_spc, import_spc, SpcFile};

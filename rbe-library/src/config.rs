//! Analysis preset persistence
//!
//! Presets live in a plain `name.key=value` text file in the user's config
//! directory, for example `clarinet.resolution=270`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Analyzer parameters saved under a name. Unset fields keep the analyzer's
/// defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisPreset {
    pub resolution: Option<f64>,
    pub window_width: Option<f64>,
    pub amp_floor: Option<f64>,
    pub freq_floor: Option<f64>,
    pub freq_drift: Option<f64>,
    pub hop_time: Option<f64>,
    pub crop_time: Option<f64>,
    pub bw_region_width: Option<f64>,
    pub sidelobe_level: Option<f64>,
}

impl AnalysisPreset {
    const KEYS: [&'static str; 9] = [
        "resolution",
        "window_width",
        "amp_floor",
        "freq_floor",
        "freq_drift",
        "hop_time",
        "crop_time",
        "bw_region_width",
        "sidelobe_level",
    ];

    fn field_mut(&mut self, key: &str) -> Option<&mut Option<f64>> {
        Some(match key {
            "resolution" => &mut self.resolution,
            "window_width" => &mut self.window_width,
            "amp_floor" => &mut self.amp_floor,
            "freq_floor" => &mut self.freq_floor,
            "freq_drift" => &mut self.freq_drift,
            "hop_time" => &mut self.hop_time,
            "crop_time" => &mut self.crop_time,
            "bw_region_width" => &mut self.bw_region_width,
            "sidelobe_level" => &mut self.sidelobe_level,
            _ => return None,
        })
    }

    fn field(&self, key: &str) -> Option<f64> {
        match key {
            "resolution" => self.resolution,
            "window_width" => self.window_width,
            "amp_floor" => self.amp_floor,
            "freq_floor" => self.freq_floor,
            "freq_drift" => self.freq_drift,
            "hop_time" => self.hop_time,
            "crop_time" => self.crop_time,
            "bw_region_width" => self.bw_region_width,
            "sidelobe_level" => self.sidelobe_level,
            _ => None,
        }
    }

    /// Set values from `other` wherever `other` has one
    pub fn merge(&mut self, other: &AnalysisPreset) {
        for key in Self::KEYS {
            if let (Some(value), Some(slot)) = (other.field(key), self.field_mut(key)) {
                *slot = Some(value);
            }
        }
    }
}

/// Named analysis presets
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Presets {
    presets: BTreeMap<String, AnalysisPreset>,
}

impl Presets {
    /// Load presets from the default location
    ///
    /// Returns no presets if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Default presets file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rbe")
            .join("presets.txt")
    }

    pub fn get(&self, name: &str) -> Option<&AnalysisPreset> {
        self.presets.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, preset: AnalysisPreset) {
        self.presets.insert(name.into(), preset);
    }

    pub fn remove(&mut self, name: &str) -> Option<AnalysisPreset> {
        self.presets.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.presets.keys().map(String::as_str)
    }

    fn parse(content: &str) -> Self {
        let mut presets = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Some((name, param)) = key.trim().rsplit_once('.') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<f64>() else {
                tracing::warn!(key, value, "ignoring unparseable preset value");
                continue;
            };
            let mut preset = presets.presets.get(name).copied().unwrap_or_default();
            // unknown keys are ignored
            if let Some(slot) = preset.field_mut(param) {
                *slot = Some(value);
                presets.presets.insert(name.to_string(), preset);
            }
        }

        presets
    }

    fn serialize(&self) -> String {
        let mut lines = vec!["# RBE analysis presets".to_string()];
        for (name, preset) in &self.presets {
            for key in AnalysisPreset::KEYS {
                if let Some(value) = preset.field(key) {
                    lines.push(format!("{name}.{key}={value}"));
                }
            }
        }
        lines.join("\n")
    }
}

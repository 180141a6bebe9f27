//! Audition through the default output device

use crate::commands::read_partials;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rbe_audio::synthesize;
use rbe_library::AiffFile;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Mono buffer with fractional read position, stepped at `rate` per output frame
struct Voice {
    samples: Vec<f32>,
    position: f64,
    rate: f64,
}

impl Voice {
    fn next_sample(&mut self) -> Option<f32> {
        let index = self.position as usize;
        let a = *self.samples.get(index)?;
        let b = self.samples.get(index + 1).copied().unwrap_or(0.0);
        let frac = (self.position - index as f64) as f32;
        self.position += self.rate;
        Some(a + (b - a) * frac)
    }
}

pub(crate) fn play(input: &Path) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No audio output device found"))?;
    let config = device
        .default_output_config()
        .context("Failed to get audio config")?;

    let device_rate = f64::from(config.sample_rate().0);
    let channels = config.channels() as usize;

    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let (samples, source_rate) = match ext.as_deref() {
        Some("aif" | "aiff" | "aifc") => {
            let file = AiffFile::read(input)?;
            let rate = file.sample_rate();
            (file.into_samples(), rate)
        }
        _ => {
            let partials = read_partials(input)?;
            (synthesize(&partials, device_rate)?, device_rate)
        }
    };
    info!(
        device_rate,
        duration = samples.len() as f64 / source_rate,
        "playing"
    );

    let mut voice = Voice {
        samples: samples.iter().map(|&s| s as f32).collect(),
        position: 0.0,
        rate: source_rate / device_rate,
    };
    let finished = Arc::new(AtomicBool::new(false));
    let finished_in_callback = finished.clone();

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = match voice.next_sample() {
                        Some(s) => s,
                        None => {
                            finished_in_callback.store(true, Ordering::Relaxed);
                            0.0
                        }
                    };
                    frame.fill(sample);
                }
            },
            |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .context("Failed to create audio stream")?;
    stream.play().context("Failed to start audio")?;

    while !finished.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(20));
    }
    // let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

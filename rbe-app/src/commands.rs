//! Command handlers

use crate::cli::{AnalyzeArgs, CacheAction};
use anyhow::{anyhow, bail, ensure, Context, Result};
use rbe_analysis::{create_freq_reference, Analyzer};
use rbe_audio::{channelize, collate, distill, resample, Dilator, Morpher};
use rbe_library::{
    export_aiff, file_stamp, import_sdif, import_spc, AiffFile, AnalysisPreset, PartialCache,
    Presets, SampleLoader, SdifFile, SdifFormat, SpcFile,
};
use rbe_model::{utils, LinearEnvelope, Partial, PartialList};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Bounds of the reference search around a fundamental given to `--distill`
const REFERENCE_SPAN: (f64, f64) = (0.8, 1.2);

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Read partials from SPC or SDIF, chosen by extension
pub(crate) fn read_partials(path: &Path) -> Result<PartialList> {
    let partials = if has_extension(path, "spc") {
        import_spc(path)
    } else {
        import_sdif(path)
    }
    .with_context(|| format!("Failed to read partials from {}", path.display()))?;
    debug!(path = %path.display(), partials = partials.len(), "read partials");
    Ok(partials)
}

/// Write partials as SPC or SDIF, chosen by extension. SPC keeps only
/// partials whose labels fit the format.
fn write_partials(path: &Path, partials: &[Partial]) -> Result<()> {
    if has_extension(path, "spc") {
        return write_spc(path, partials, SpcFile::DEFAULT_MIDI_NOTE, true, 0.0);
    }
    SdifFile::from_partials(partials.to_vec())
        .write(path, SdifFormat::Enhanced)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), partials = partials.len(), "wrote SDIF");
    Ok(())
}

fn write_spc(
    path: &Path,
    partials: &[Partial],
    note: f64,
    enhanced: bool,
    end_approach: f64,
) -> Result<()> {
    let mut file = SpcFile::new(note)?;
    let mut skipped = 0usize;
    for partial in partials.iter().filter(|p| !p.is_empty()) {
        if (1..=SpcFile::LARGEST_LABEL).contains(&partial.label()) {
            file.add_partial(partial)?;
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        warn!(skipped, "partials without an SPC label were left out");
    }
    file.write(path, enhanced, end_approach)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), slots = file.partials().len(), "wrote SPC");
    Ok(())
}

fn preset_from_args(args: &AnalyzeArgs) -> AnalysisPreset {
    AnalysisPreset {
        resolution: args.resolution,
        window_width: args.window,
        amp_floor: args.amp_floor,
        freq_floor: args.freq_floor,
        freq_drift: args.freq_drift,
        hop_time: args.hop_time,
        crop_time: args.crop_time,
        bw_region_width: args.bw_region_width,
        sidelobe_level: args.sidelobe_level,
    }
}

/// Analyzer configured from a preset, with defaults wherever it is unset
fn build_analyzer(preset: &AnalysisPreset, associate_bandwidth: bool) -> Result<Analyzer> {
    let resolution = preset
        .resolution
        .ok_or_else(|| anyhow!("a frequency resolution is required (--resolution or --preset)"))?;
    let mut analyzer = Analyzer::with_window(resolution, preset.window_width.unwrap_or(resolution))?;

    if let Some(v) = preset.amp_floor {
        analyzer.set_amp_floor(v)?;
    }
    if let Some(v) = preset.freq_floor {
        analyzer.set_freq_floor(v)?;
    }
    if let Some(v) = preset.freq_drift {
        analyzer.set_freq_drift(v)?;
    }
    if let Some(v) = preset.hop_time {
        analyzer.set_hop_time(v)?;
    }
    if let Some(v) = preset.crop_time {
        analyzer.set_crop_time(v)?;
    }
    if let Some(v) = preset.bw_region_width {
        analyzer.set_bw_region_width(v)?;
    }
    if let Some(v) = preset.sidelobe_level {
        analyzer.set_sidelobe_level(v)?;
    }
    analyzer.set_associate_bandwidth(associate_bandwidth);
    Ok(analyzer)
}

pub(crate) fn analyze(args: AnalyzeArgs) -> Result<()> {
    let mut presets = Presets::load();
    let mut preset = match &args.preset {
        Some(name) => *presets
            .get(name)
            .ok_or_else(|| anyhow!("no preset named '{name}' in {}", Presets::config_path().display()))?,
        None => AnalysisPreset::default(),
    };
    preset.merge(&preset_from_args(&args));
    let analyzer = build_analyzer(&preset, !args.no_bandwidth)?;

    if let Some(name) = &args.save_preset {
        presets.insert(name.clone(), preset);
        presets.save().context("Failed to save presets")?;
        info!(preset = %name, "saved preset");
    }

    let loader = match args.sample_rate {
        Some(rate) => SampleLoader::with_sample_rate(rate),
        None => SampleLoader::new(),
    };
    let sound = loader
        .load(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    info!(
        title = %sound.title,
        sample_rate = sound.sample_rate,
        duration = sound.duration(),
        "loaded sound"
    );

    let settings = format!("{analyzer:?}@{}", sound.sample_rate);
    let cache = if args.no_cache {
        None
    } else {
        open_cache()
    };
    let stamp = file_stamp(&args.input)?;

    let cached = match &cache {
        Some(cache) => cache.get(&args.input, stamp.0, stamp.1, &settings)?,
        None => None,
    };
    let mut partials = match cached {
        Some(partials) => {
            info!(partials = partials.len(), "using cached analysis");
            partials
        }
        None => {
            let partials = analyzer.analyze(&sound.samples, f64::from(sound.sample_rate))?;
            if let Some(cache) = &cache {
                if let Err(e) = cache.store(&args.input, stamp.0, stamp.1, &settings, &partials) {
                    warn!(error = %e, "could not cache analysis");
                }
            }
            partials
        }
    };
    info!(partials = partials.len(), "analysis complete");

    if let Some(f0) = args.distill {
        ensure!(f0 > 0.0, "fundamental must be positive, got {f0}");
        let reference = create_freq_reference(
            &partials,
            REFERENCE_SPAN.0 * f0,
            REFERENCE_SPAN.1 * f0,
            None,
        )?;
        channelize(&mut partials, &reference, 1)?;
        let count = distill(&mut partials);
        info!(partials = count, "distilled");
    }
    if args.collate {
        let count = collate(&mut partials);
        info!(partials = count, "collated");
    }
    if let Some(interval) = args.resample {
        resample(&mut partials, interval)?;
    }

    if let Some(path) = &args.output {
        write_partials(path, &partials)?;
    }
    if let Some(path) = &args.render {
        export_aiff(path, &partials, f64::from(sound.sample_rate), AiffFile::DEFAULT_BITS)
            .with_context(|| format!("Failed to render {}", path.display()))?;
        info!(path = %path.display(), "rendered");
    }
    if args.output.is_none() && args.render.is_none() {
        print_summary(&partials);
    }
    Ok(())
}

fn open_cache() -> Option<PartialCache> {
    let path = PartialCache::default_path();
    match PartialCache::open(&path) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "analysis cache unavailable");
            None
        }
    }
}

pub(crate) fn synth(input: &Path, output: &Path, rate: f64, bits: u16, fade: f64) -> Result<()> {
    let partials = read_partials(input)?;
    let file = AiffFile::from_partials(&partials, rate, fade)?;
    file.write(output, bits)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        path = %output.display(),
        duration = file.duration(),
        "rendered"
    );
    Ok(())
}

fn find_labeled(partials: &[Partial], label: i32, which: &str) -> Result<Partial> {
    utils::copy_labeled(partials, label)
        .into_iter()
        .find(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("{which} has no partial labeled {label}"))
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn morph(
    source: &Path,
    target: &Path,
    output: &Path,
    start: f64,
    end: f64,
    amp_shape: Option<f64>,
    source_ref: i32,
    target_ref: i32,
) -> Result<()> {
    ensure!(end > start, "morph end time must follow its start time");
    let src = read_partials(source)?;
    let tgt = read_partials(target)?;

    let weight: LinearEnvelope = [(start, 0.0), (end, 1.0)].into_iter().collect();
    let mut morpher = Morpher::uniform(weight);
    if let Some(shape) = amp_shape {
        morpher.set_amp_shape(shape)?;
    }
    if source_ref != 0 {
        morpher.set_source_reference(find_labeled(&src, source_ref, "source")?)?;
    }
    if target_ref != 0 {
        morpher.set_target_reference(find_labeled(&tgt, target_ref, "target")?)?;
    }

    let morphed = morpher.morph(&src, &tgt)?;
    info!(partials = morphed.len(), "morphed");
    write_partials(output, &morphed)
}

pub(crate) fn dilate(input: &Path, output: &Path, from: &[f64], to: &[f64]) -> Result<()> {
    if from.len() != to.len() {
        bail!(
            "--from has {} times but --to has {}",
            from.len(),
            to.len()
        );
    }
    let dilator = Dilator::new(from, to)?;

    let mut partials = read_partials(input)?;
    dilator.dilate(&mut partials);
    write_partials(output, &partials)
}

pub(crate) fn info(input: &Path) -> Result<()> {
    let partials = read_partials(input)?;
    print_summary(&partials);
    Ok(())
}

fn print_summary(partials: &[Partial]) {
    let (start, end) = utils::time_span(partials);
    let breakpoints: usize = partials.iter().map(Partial::len).sum();
    let mut labels: BTreeMap<i32, usize> = BTreeMap::new();
    for p in partials {
        *labels.entry(p.label()).or_default() += 1;
    }

    println!("Partials:    {}", partials.len());
    println!("Breakpoints: {breakpoints}");
    println!("Time span:   {start:.4}s - {end:.4}s");
    if let Some(peak) = partials.iter().map(Partial::peak_amplitude).reduce(f64::max) {
        println!("Peak amp:    {peak:.4}");
    }
    match labels.len() {
        0 => {}
        1 if labels.contains_key(&0) => println!("Labels:      none"),
        _ => {
            println!("Labels:");
            for (label, count) in &labels {
                println!("  {label:>5}: {count}");
            }
        }
    }
}

pub(crate) fn spc(
    input: &Path,
    output: &Path,
    note: f64,
    sine_only: bool,
    end_approach: f64,
) -> Result<()> {
    let partials = read_partials(input)?;
    write_spc(output, &partials, note, !sine_only, end_approach)
}

pub(crate) fn cache(action: CacheAction) -> Result<()> {
    let path = PartialCache::default_path();
    let cache = PartialCache::open(&path)
        .with_context(|| format!("Failed to open cache at {}", path.display()))?;
    match action {
        CacheAction::List => {
            let entries = cache.entries()?;
            if entries.is_empty() {
                println!("Cache is empty");
            }
            for entry in entries {
                println!(
                    "{}  {} partials  [{}]",
                    entry.path.display(),
                    entry.partial_count,
                    entry.settings
                );
            }
        }
        CacheAction::Clear => {
            let count = cache.count()?;
            cache.clear()?;
            info!(removed = count, "cleared analysis cache");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbe_model::Breakpoint;

    fn tone(label: i32, freq: f64) -> Partial {
        let mut p = Partial::with_label(label);
        p.insert(0.0, Breakpoint::new(freq, 0.1, 0.0, 0.0));
        p.insert(0.5, Breakpoint::new(freq, 0.1, 0.0, 0.0));
        p
    }

    #[test]
    fn test_build_analyzer_needs_resolution() {
        assert!(build_analyzer(&AnalysisPreset::default(), true).is_err());

        let preset = AnalysisPreset {
            resolution: Some(100.0),
            hop_time: Some(0.004),
            ..Default::default()
        };
        let analyzer = build_analyzer(&preset, false).unwrap();
        assert_eq!(analyzer.freq_resolution(), 100.0);
        assert_eq!(analyzer.window_width(), 100.0);
        assert_eq!(analyzer.hop_time(), 0.004);
        assert!(!analyzer.associate_bandwidth());
    }

    #[test]
    fn test_build_analyzer_rejects_bad_values() {
        let preset = AnalysisPreset {
            resolution: Some(100.0),
            amp_floor: Some(12.0),
            ..Default::default()
        };
        assert!(build_analyzer(&preset, true).is_err());
    }

    #[test]
    fn test_partials_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let partials = vec![tone(1, 220.0), tone(2, 440.0), tone(0, 300.0)];

        let sdif = dir.path().join("tones.sdif");
        write_partials(&sdif, &partials).unwrap();
        assert_eq!(read_partials(&sdif).unwrap().len(), 3);

        let spc = dir.path().join("tones.SPC");
        write_partials(&spc, &partials).unwrap();
        let back = read_partials(&spc).unwrap();
        // the unlabeled partial is dropped, unused slots stay silent
        assert_eq!(back.len(), SpcFile::MIN_NUM_PARTIALS);
        assert_eq!(back[0].label(), 1);
        assert!((back[1].frequency_at(0.25) - 440.0).abs() < 1.0);
        assert!(back[2].peak_amplitude() < 1e-3);
    }

    #[test]
    fn test_dilate_rejects_mismatched_times() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.sdif");
        write_partials(&input, &[tone(0, 100.0)]).unwrap();
        let output = dir.path().join("out.sdif");
        assert!(dilate(&input, &output, &[0.1, 0.2], &[0.3]).is_err());

        dilate(&input, &output, &[0.5], &[1.0]).unwrap();
        let back = read_partials(&output).unwrap();
        assert!((back[0].end_time() - 1.0).abs() < 1e-6);
    }
}

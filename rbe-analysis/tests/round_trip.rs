//! Synthesize known partials, analyze the result and recover them

use rbe_analysis::{create_f0_estimate, create_freq_reference, Analyzer};
use rbe_audio::{channelize, distill, synthesize};
use rbe_model::{wrap_phase, Breakpoint, Envelope, Partial, PartialList};
use std::f64::consts::PI;

const SR: f64 = 44100.0;

fn harmonic(label: i32, freq: f64, amp: f64) -> Partial {
    let mut p = Partial::with_label(label);
    for i in 0..=10 {
        let t = 0.05 + i as f64 * 0.05;
        p.insert(t, Breakpoint::new(freq, amp, 0.0, wrap_phase(2.0 * PI * freq * t)));
    }
    p
}

fn source() -> PartialList {
    vec![harmonic(1, 220.0, 0.4), harmonic(2, 440.0, 0.2)]
}

fn loudest_near(partials: &[Partial], freq: f64) -> &Partial {
    partials
        .iter()
        .filter(|p| (p.frequency_at(0.3) - freq).abs() < 20.0)
        .max_by(|a, b| a.duration().total_cmp(&b.duration()))
        .expect("no partial near the expected frequency")
}

#[test]
fn test_analysis_recovers_synthesized_partials() {
    let samples = synthesize(&source(), SR).unwrap();
    let analyzer = Analyzer::new(150.0).unwrap();
    let partials = analyzer.analyze(&samples, SR).unwrap();
    assert!(!partials.is_empty());

    let fundamental = loudest_near(&partials, 220.0);
    assert!(fundamental.duration() > 0.3);
    assert!((fundamental.frequency_at(0.3) - 220.0).abs() < 2.0);
    assert!((fundamental.amplitude_at(0.3) - 0.4).abs() < 0.04);

    let second = loudest_near(&partials, 440.0);
    assert!((second.frequency_at(0.3) - 440.0).abs() < 2.0);
    assert!((second.amplitude_at(0.3) - 0.2).abs() < 0.03);
}

#[test]
fn test_channelize_and_distill_harmonics() {
    let samples = synthesize(&source(), SR).unwrap();
    let analyzer = Analyzer::new(150.0).unwrap();
    let mut partials = analyzer.analyze(&samples, SR).unwrap();

    let reference = create_freq_reference(&partials, 180.0, 260.0, None).unwrap();
    channelize(&mut partials, &reference, 1).unwrap();
    distill(&mut partials);

    let first = partials.iter().find(|p| p.label() == 1).unwrap();
    let second = partials.iter().find(|p| p.label() == 2).unwrap();
    assert!((first.frequency_at(0.3) - 220.0).abs() < 2.0);
    assert!((second.frequency_at(0.3) - 440.0).abs() < 2.0);
    assert_eq!(partials.iter().filter(|p| p.label() == 1).count(), 1);
}

#[test]
fn test_fundamental_estimate_of_synthesized_tone() {
    let samples = synthesize(&source(), SR).unwrap();
    let partials = Analyzer::new(150.0).unwrap().analyze(&samples, SR).unwrap();
    let f0 = create_f0_estimate(&partials, 150.0, 300.0, 0.05).unwrap();
    assert!((f0.value_at(0.3) - 220.0).abs() < 2.0);
}

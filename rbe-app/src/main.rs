//! RBE - command-line front end
//!
//! Analyze sound files into bandwidth-enhanced partials, reshape them and
//! render them back to sound.

mod cli;
mod commands;
#[cfg(feature = "playback")]
mod playback;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Analyze(args) => commands::analyze(args),
        Commands::Synth {
            input,
            output,
            rate,
            bits,
            fade,
        } => commands::synth(&input, &output, rate, bits, fade),
        Commands::Morph {
            source,
            target,
            output,
            start,
            end,
            amp_shape,
            source_ref,
            target_ref,
        } => commands::morph(
            &source, &target, &output, start, end, amp_shape, source_ref, target_ref,
        ),
        Commands::Dilate {
            input,
            output,
            from,
            to,
        } => commands::dilate(&input, &output, &from, &to),
        Commands::Info { input } => commands::info(&input),
        Commands::Spc {
            input,
            output,
            note,
            sine_only,
            end_approach,
        } => commands::spc(&input, &output, note, sine_only, end_approach),
        Commands::Cache { action } => commands::cache(action),
        #[cfg(feature = "playback")]
        Commands::Play { input } => playback::play(&input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dilate_lists() {
        let cli = Cli::parse_from([
            "rbe", "dilate", "in.sdif", "-o", "out.sdif", "--from", "0.1,0.5", "--to", "0.2,0.9",
        ]);
        match cli.command {
            Commands::Dilate { from, to, .. } => {
                assert_eq!(from, vec![0.1, 0.5]);
                assert_eq!(to, vec![0.2, 0.9]);
            }
            _ => panic!("expected dilate"),
        }
    }

    #[test]
    fn test_parse_analyze_negative_floor() {
        let cli = Cli::parse_from([
            "rbe", "analyze", "a.wav", "-r", "60", "--amp-floor", "-70", "--distill", "220",
        ]);
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.resolution, Some(60.0));
                assert_eq!(args.amp_floor, Some(-70.0));
                assert_eq!(args.distill, Some(220.0));
                assert!(!args.no_bandwidth);
            }
            _ => panic!("expected analyze"),
        }
    }
}

//! speechrt demo entry point
//!
//! Speaks its arguments through the configured backend:
//! 1. allocate the synthesizer and queue each argument as one item
//! 2. wait until the output queue drains
//! 3. deallocate and exit
//!
//! Arguments that look like SSML/JSML are queued as markup.

use anyhow::Context;
use log::{debug, error, info};
use speechrt::engine::{EngineEvent, StateMask};
use speechrt::speech::markup::looks_like_markup;
use speechrt::{Config, Speakable, Synthesizer};
use std::process;
use std::sync::Arc;

fn main() {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");
    let print_events = args.iter().any(|arg| arg == "--events" || arg == "-e");

    // Initialize logger
    if debug_mode {
        // Debug mode: write to speechrt.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("speechrt.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open speechrt.log for debug logging: {}", e);
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "speechrt version {} starting (debug mode, logging to speechrt.log)",
            speechrt::VERSION
        );
    } else {
        // Normal mode: minimal logging to stderr, only errors
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }

    let texts: Vec<&String> = args.iter().filter(|arg| !arg.starts_with('-')).collect();
    if texts.is_empty() {
        eprintln!("Usage: {} [--debug] [--events] <text>...", speechrt::APP_NAME);
        process::exit(2);
    }

    if let Err(e) = run(&texts, print_events) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(texts: &[&String], print_events: bool) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    debug!("Using config {:?}", config.path());

    let synth = Synthesizer::from_config(&config).context("creating synthesizer")?;
    info!("Backend: {}", synth.backend_id());

    if print_events {
        synth.add_engine_listener(Arc::new(|event: &EngineEvent| {
            match serde_json::to_string(event) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to encode event: {}", e),
            }
        }));
    }

    synth.allocate().context("allocating synthesizer")?;

    for text in texts {
        let speakable = if looks_like_markup(text) {
            Speakable::Markup(text.to_string())
        } else {
            Speakable::Text(text.to_string())
        };
        synth.speak(speakable, None)?;
    }

    // Each item gets its own timeout budget
    let timeout = config.wait_timeout().map(|t| t * texts.len() as u32);
    let state = synth
        .wait_engine_state(StateMask::QUEUE_EMPTY, timeout)
        .context("waiting for speech to finish")?;
    if !state.matches(StateMask::QUEUE_EMPTY) {
        error!("Timed out with items still queued ({})", state);
    }

    synth.deallocate().context("deallocating synthesizer")?;
    Ok(())
}

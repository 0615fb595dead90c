//! OBT chain runner CLI
//!
//! Command-line host for the obt-core chain compiler. It adds:
//! - An in-memory document with a small CSS selector engine
//! - Event dispatch with bubbling, delegation and single-fire listeners
//! - A demo instruction library (arithmetic, strings, document updates)
//! - TOML scene files and text/JSON reports

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod dispatcher;
mod document;
mod library;
mod report;
mod selector;
mod session;

use config::{FireConfig, NodeConfig, OutputFormat, Scene};
use session::Session;

/// OBT chain runner - compile On/By/To attributes and fire events at them
#[derive(Parser, Debug)]
#[command(name = "obt-cli")]
#[command(about = "Compile and run OBT attribute chains on an in-memory document", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a scene file (scene.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// On attribute of a single ad-hoc node
    #[arg(long, value_name = "ATTR")]
    on: Option<String>,

    /// By attribute of the ad-hoc node
    #[arg(long, value_name = "ATTR", default_value = "")]
    by: String,

    /// To attribute of the ad-hoc node
    #[arg(long, value_name = "ATTR", default_value = "")]
    to: String,

    /// Event to fire at the ad-hoc node (can be repeated)
    #[arg(short, long, value_name = "EVENT")]
    fire: Vec<String>,

    /// Continue past groups that fail to compile
    #[arg(long)]
    lenient: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("OBT Chain Runner v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using obt-core v{}", obt_core::VERSION);

    let scene = if let Some(on) = &args.on {
        simple_scene(on, &args)
    } else if let Some(config_path) = &args.config {
        log::info!("Loading scene from: {:?}", config_path);
        config::load_scene(config_path)?
    } else {
        println!("OBT Chain Runner - No input specified");
        println!("\nQuick Start:");
        println!("  obt-cli --on \"click|push(2,3) add\" --to \"=|text\" --fire click");
        println!("\nFor whole scenes:");
        println!("  obt-cli --config scene.toml");
        println!("\nUse --help for more options");
        return Ok(());
    };

    let report = Session::run(&scene)?;

    let json = args.json || scene.output.format == OutputFormat::Json;
    if json {
        println!("{}", report.render_json().context("Failed to serialize report")?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

/// One node named `node` carrying the command-line attributes
fn simple_scene(on: &str, args: &Args) -> Scene {
    let mut scene = Scene::default();
    scene.builder.strict = !args.lenient;
    scene.nodes.push(NodeConfig {
        id: "node".to_string(),
        tag: "div".to_string(),
        parent: None,
        class: String::new(),
        attrs: Default::default(),
        text: String::new(),
        on: on.to_string(),
        by: args.by.clone(),
        to: args.to.clone(),
    });
    scene.fires = args
        .fire
        .iter()
        .map(|event| FireConfig {
            node: "node".to_string(),
            event: event.clone(),
            detail: None,
            bubbles: true,
        })
        .collect();
    scene
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

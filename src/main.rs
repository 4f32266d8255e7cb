use std::process::exit;

use anyhow::Result;
use clap::Parser;
use dashboard_tiles::{
    dashboard::Dashboard,
    settings::{Args, Settings},
    TileEngine,
};
use tracing::{info, Level};

fn main() {
    let args = Args::parse();

    let settings = match Settings::from_file(&args.config) {
        Ok(ret) => ret,
        Err(error) => {
            eprintln!("Problem while loading settings. {error}");
            exit(1);
        }
    };

    init_tracing(settings.log.level);

    if let Err(error) = run(&args, &settings) {
        eprintln!("{error:#}");
        exit(1);
    }
}

// stdout carries the JSON output
fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args, settings: &Settings) -> Result<()> {
    let dashboard = Dashboard::load(&settings.dashboard, settings.window.as_ref())?;
    let engine = TileEngine::new(settings.engine);
    let entry_point = settings.dashboard.entry_point;

    let output = match &args.drill_down {
        Some(key) => {
            let records = dashboard.drill_down(&engine, entry_point, key)?;
            info!("Tile `{key}` drills down to {} records", records.len());
            serde_json::to_string_pretty(&records)?
        }
        None => serde_json::to_string_pretty(&dashboard.tile_results(&engine, entry_point))?,
    };
    println!("{output}");
    Ok(())
}

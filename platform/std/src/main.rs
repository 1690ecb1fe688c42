use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;
use embassy_executor::Spawner;
use log::*;
use reflow_oven::config::{Element, OvenConfig};
use reflow_oven::control_loop::control_loop_task;
use reflow_oven::heater::element_task;
use reflow_oven::inputs::interface_task;
use reflow_oven::outputs::output_task;
use reflow_oven::oven::oven_task;
use reflow_oven::process_image::ProcessImage;
use reflow_oven::profile_library::ProfileLibrary;
use reflow_oven::{temperature_sensor::run_temperature_sensor, usb_interface::usb_task};
use static_cell::StaticCell;

/// Reflow oven firmware running against a simulated oven.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Oven configuration as JSON; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra profile in the text format, named after the file stem
    #[arg(long = "profile")]
    profiles: Vec<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

static IMAGE: ProcessImage = ProcessImage::new();
static LIBRARY: StaticCell<ProfileLibrary> = StaticCell::new();

fn load_config(path: &Path) -> Result<OvenConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json_core::from_str::<OvenConfig>(&text)
        .map(|(config, _)| config)
        .map_err(|e| format!("{}: {:?}", path.display(), e))
}

fn import_profile(library: &mut ProfileLibrary, path: &Path) -> Result<(), String> {
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| format!("{}: no usable profile name", path.display()))?;
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    library
        .import_text(name, &text)
        .map_err(|e| format!("{}: {}", path.display(), e.to_str()))
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(args.log_level)
        .format_timestamp_nanos()
        .init();

    let config = match args.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            error!("Bad configuration {}", e);
            exit(1);
        }
    };

    let library = LIBRARY.init(ProfileLibrary::with_builtin());
    for path in &args.profiles {
        if let Err(e) = import_profile(library, path) {
            error!("Profile not imported {}", e);
            exit(1);
        }
    }
    info!("Reflow oven {}, {} profiles available", reflow_oven::VERSION, library.len());

    for element in Element::ALL {
        spawner.spawn(element_task(&IMAGE, element, config.ssr_window, config.ssr_tick_ms).unwrap());
    }
    spawner.spawn(run_temperature_sensor(&IMAGE, config.ssr_tick_ms).unwrap());
    spawner.spawn(control_loop_task(&IMAGE, config).unwrap());
    spawner.spawn(oven_task(&IMAGE, library, config).unwrap());

    spawner.spawn(interface_task().unwrap());
    spawner.spawn(output_task(spawner).unwrap());
    spawner.spawn(usb_task().unwrap());
}

use std::time::Duration;

use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use govee_ble_controller::effects::{scene_names, MUSIC_MODES, SCENES};
use govee_ble_controller::*;
use tracing::{debug, error, info, instrument, trace};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// MAC address or platform id of the LED strip
    #[arg(short, long)]
    address: Option<String>,

    /// Seconds without commands before the link is closed
    #[arg(long, default_value_t = 120)]
    idle_timeout: u64,

    /// Seconds to scan for the device before giving up
    #[arg(long, default_value_t = 10)]
    scan_timeout: u64,

    /// Attempts per command before giving up
    #[arg(long, default_value_t = 3)]
    attempts: u8,

    /// Override the write characteristic UUID
    #[arg(long)]
    write_uuid: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn music_mode_names() -> impl Iterator<Item = &'static str> {
    MUSIC_MODES.iter().map(|mode| mode.name)
}

#[derive(Subcommand)]
enum Commands {
    /// Demonstration of LED features
    Demo {
        /// Duration of each demo step in seconds
        #[arg(short, long, default_value_t = 5)]
        duration: u64,
    },
    /// Turn LED strip on
    On,
    /// Turn LED strip off
    Off,
    /// Set to red color
    Red,
    /// Set to green color
    Green,
    /// Set to blue color
    Blue,
    /// Set to white color
    White,
    /// Set brightness
    Brightness {
        /// Brightness level (0-100, or 0-255 with --full-range)
        #[arg(short, long, default_value_t = 100)]
        level: u8,
        /// Read the level on a 0-255 scale
        #[arg(long)]
        full_range: bool,
    },
    /// Set color temperature
    ColorTemp {
        /// Color temperature in Kelvin (1000-10000)
        #[arg(short, long, default_value_t = 4000)]
        kelvin: u32,
    },
    /// Set custom RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
        /// Use the single-color mode instead of addressing all segments
        #[arg(long)]
        simple: bool,
    },
    /// Set the color of individual segments
    Segment {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
        /// Segments to color (1-15, comma separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        segments: Vec<u8>,
    },
    /// Activate a scene
    Scene {
        #[arg(value_parser = PossibleValuesParser::new(scene_names()))]
        name: String,
    },
    /// Activate a music mode
    Music {
        #[arg(value_parser = PossibleValuesParser::new(music_mode_names()))]
        mode: String,
        /// Microphone sensitivity (0-255)
        #[arg(short, long)]
        sensitivity: Option<u8>,
    },
    /// Send a state query
    Query,
    /// Send a raw 20-byte frame given as hex
    Raw {
        /// Frame bytes, e.g. 3301010000000000000000000000000000000033
        frame: String,
    },
    /// List known scenes and music modes
    Scenes,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("govee_ble_controller=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let command = cli.command.unwrap_or(Commands::Demo { duration: 5 });
    if let Commands::Scenes = command {
        print_tables();
        return Ok(());
    }

    let address = cli
        .address
        .ok_or_else(|| eyre!("--address is required for device commands"))?;

    let mut config = DeviceConfig::default()
        .with_idle_timeout(Duration::from_secs(cli.idle_timeout))
        .with_scan_timeout(Duration::from_secs(cli.scan_timeout))
        .with_max_attempts(cli.attempts);
    if let Some(uuid) = cli.write_uuid.as_deref() {
        config = config.with_write_uuid(uuid)?;
    }

    let resolver = match BtleResolver::new(config.clone()).await {
        Ok(resolver) => resolver,
        Err(e) => {
            error!("Failed to initialize Bluetooth: {}", e);
            return Err(e.into());
        }
    };
    let mut strip = LedStrip::new(address, resolver, config);

    let result = run(&mut strip, command).await;
    strip.disconnect().await;
    result
}

async fn run<R: DeviceResolver>(strip: &mut LedStrip<R>, command: Commands) -> Result<()> {
    match command {
        Commands::Demo { duration } => {
            run_demo(strip, duration).await?;
        }
        Commands::On => {
            strip.power_on().await?;
        }
        Commands::Off => {
            strip.power_off().await?;
        }
        Commands::Red => {
            // First ensure device is on, then set color
            strip.power_on().await?;
            strip.set_color(255, 0, 0).await?;
        }
        Commands::Green => {
            strip.power_on().await?;
            strip.set_color(0, 255, 0).await?;
        }
        Commands::Blue => {
            strip.power_on().await?;
            strip.set_color(0, 0, 255).await?;
        }
        Commands::White => {
            strip.power_on().await?;
            strip.set_color(255, 255, 255).await?;
        }
        Commands::Brightness { level, full_range } => {
            // We need to ensure the device is on for brightness changes to be visible
            strip.power_on().await?;
            if full_range {
                strip.set_brightness_255(level).await?;
            } else {
                strip.set_brightness(level).await?;
            }
        }
        Commands::ColorTemp { kelvin } => {
            strip.power_on().await?;
            strip.set_color_temp_kelvin(kelvin).await?;
        }
        Commands::Color {
            red,
            green,
            blue,
            simple,
        } => {
            strip.power_on().await?;
            if simple {
                strip.set_color_simple(red, green, blue).await?;
            } else {
                strip.set_color(red, green, blue).await?;
            }
        }
        Commands::Segment {
            red,
            green,
            blue,
            segments,
        } => {
            strip.power_on().await?;
            strip.set_segment_color(red, green, blue, &segments).await?;
        }
        Commands::Scene { name } => {
            strip.power_on().await?;
            strip.set_scene(&name).await?;
        }
        Commands::Music { mode, sensitivity } => {
            strip.power_on().await?;
            strip.set_music_mode(&mode, sensitivity).await?;
        }
        Commands::Query => {
            strip.query_state().await?;
        }
        Commands::Raw { frame } => {
            let frame = Frame::from_hex(&frame)?;
            debug!("Parsed raw frame {:?}", frame);
            strip.send_raw(frame).await?;
        }
        Commands::Scenes => print_tables(),
    }

    Ok(())
}

fn print_tables() {
    println!("Scenes:");
    for scene in SCENES {
        println!("  {:<12} {:#04x}", scene.name, scene.id);
    }
    println!("Music modes:");
    for mode in MUSIC_MODES {
        println!("  {:<12} {:#04x}", mode.name, mode.id);
    }
}

/// Sleep for specified number of seconds
#[instrument]
async fn sleep(seconds: u64) {
    trace!("Sleeping for {}s", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    trace!("Sleep completed");
}

/// Run a demonstration of various LED strip features
#[instrument(skip(strip))]
async fn run_demo<R: DeviceResolver>(strip: &mut LedStrip<R>, duration: u64) -> Result<()> {
    info!("Running LED strip demo with {}s intervals", duration);

    info!("Turning LEDs on");
    strip.power_on().await?;
    sleep(duration).await;

    for (name, (red, green, blue)) in [
        ("red", (255, 0, 0)),
        ("green", (0, 255, 0)),
        ("blue", (0, 0, 255)),
    ] {
        info!("Setting color to {}", name);
        strip.set_color(red, green, blue).await?;
        sleep(duration).await;
    }

    info!("Setting brightness to 50%");
    strip.set_brightness(50).await?;
    sleep(duration).await;

    info!("Setting brightness to 100%");
    strip.set_brightness(100).await?;
    sleep(duration).await;

    info!("Setting warm white (2700K)");
    strip.set_color_temp_kelvin(2700).await?;
    sleep(duration).await;

    info!("Setting cool white (6500K)");
    strip.set_color_temp_kelvin(6500).await?;
    sleep(duration).await;

    info!("Coloring odd segments red and even segments blue");
    let odd: Vec<u8> = (1..=15).step_by(2).collect();
    let even: Vec<u8> = (2..=14).step_by(2).collect();
    strip.set_segment_color(255, 0, 0, &odd).await?;
    strip.set_segment_color(0, 0, 255, &even).await?;
    sleep(duration).await;

    for name in ["sunrise", "rainbow"] {
        info!("Setting scene {}", name);
        strip.set_scene(name).await?;
        sleep(duration).await;
    }

    info!("Setting music mode energetic");
    strip.set_music_mode("energetic", None).await?;
    sleep(duration).await;

    // Go back to static white
    info!("Back to static white");
    strip.set_color(255, 255, 255).await?;
    sleep(1).await;

    // End demo by turning off the lights
    info!("Turning LEDs off to end demo");
    strip.power_off().await?;

    info!("Demo completed!");
    Ok(())
}

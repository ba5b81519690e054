use color_eyre::eyre::{eyre, Result};
use govee_ble_controller::*;
use std::env;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: goveed <id/mac address>";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the OK/ERR replies
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("govee_ble_controller=warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    // Get a target id/mac address from command line arguments.
    // If not provided, exit.
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{USAGE}");
        std::process::exit(0);
    }

    let config = DeviceConfig::default();
    let resolver = BtleResolver::new(config.clone()).await?;
    let mut strip = LedStrip::new(args[1].as_str(), resolver, config);

    // Connect up front so a missing device is reported immediately
    strip.connection().ensure_connected().await?;
    println!("OK");

    // Mainloop: wait for user input, line by line
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match handle(&mut strip, line.trim()).await {
            Ok(()) => println!("OK"),
            Err(e) => {
                warn!("Command {:?} failed: {}", line.trim(), e);
                println!("ERR {e}");
            }
        }
    }

    strip.disconnect().await;
    Ok(())
}

fn parse_list(arg: Option<&str>, what: &str) -> Result<Vec<u8>> {
    arg.ok_or_else(|| eyre!("no {what} given"))?
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<u8>()
                .map_err(|_| eyre!("invalid {what}: {s:?}"))
        })
        .collect()
}

fn parse_rgb(arg: Option<&str>) -> Result<(u8, u8, u8)> {
    match parse_list(arg, "color")?.as_slice() {
        &[red, green, blue] => Ok((red, green, blue)),
        _ => Err(eyre!(
            "invalid color format, use R,G,B (e.g., 255,0,0 for red)"
        )),
    }
}

/// Runs one `command[:args]` line against the strip
async fn handle<R: DeviceResolver>(strip: &mut LedStrip<R>, input: &str) -> Result<()> {
    let mut cmd = input.split(':');
    match cmd.next() {
        Some("power_on") => strip.power_on().await?,
        Some("power_off") => strip.power_off().await?,
        Some("set_color") => {
            let (red, green, blue) = parse_rgb(cmd.next())?;
            strip.set_color(red, green, blue).await?;
        }
        Some("set_brightness") => {
            let brightness: u8 = cmd
                .next()
                .ok_or_else(|| eyre!("no brightness given"))?
                .trim()
                .parse()
                .map_err(|_| eyre!("invalid brightness"))?;
            if brightness > 100 {
                return Err(eyre!("brightness must be between 0 and 100"));
            }
            strip.set_brightness(brightness).await?;
        }
        Some("set_brightness_255") => {
            let brightness: u8 = cmd
                .next()
                .ok_or_else(|| eyre!("no brightness given"))?
                .trim()
                .parse()
                .map_err(|_| eyre!("brightness must be between 0 and 255"))?;
            strip.set_brightness_255(brightness).await?;
        }
        Some("set_color_simple") => {
            let (red, green, blue) = parse_rgb(cmd.next())?;
            strip.set_color_simple(red, green, blue).await?;
        }
        Some("set_color_temp") => {
            let kelvin: u32 = cmd
                .next()
                .ok_or_else(|| eyre!("no color temperature given"))?
                .trim()
                .parse()
                .map_err(|_| eyre!("invalid color temperature"))?;
            strip.set_color_temp_kelvin(kelvin).await?;
        }
        Some("set_segments") => {
            let (red, green, blue) = parse_rgb(cmd.next())?;
            let segments = parse_list(cmd.next(), "segments")?;
            strip.set_segment_color(red, green, blue, &segments).await?;
        }
        Some("set_scene") => {
            let name = cmd.next().ok_or_else(|| eyre!("no scene given"))?;
            strip.set_scene(name).await?;
        }
        Some("set_music") => {
            let mut args = cmd.next().ok_or_else(|| eyre!("no music mode given"))?.split(',');
            let mode = args.next().unwrap_or_default();
            let sensitivity = match args.next() {
                Some(s) => Some(
                    s.trim()
                        .parse::<u8>()
                        .map_err(|_| eyre!("invalid sensitivity"))?,
                ),
                None => None,
            };
            strip.set_music_mode(mode, sensitivity).await?;
        }
        Some("query") => strip.query_state().await?,
        Some("raw") => {
            let frame = Frame::from_hex(cmd.next().ok_or_else(|| eyre!("no frame given"))?)?;
            strip.send_raw(frame).await?;
        }
        Some("disconnect") => strip.disconnect().await,
        Some(other) => return Err(eyre!("unknown command: {other}")),
        None => return Err(eyre!("no command given")),
    }
    Ok(())
}

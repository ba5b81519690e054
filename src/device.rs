use tracing::{debug, info, instrument, warn};

use crate::commands::{self, DEFAULT_SENSITIVITY, MAX_KELVIN, MIN_KELVIN};
use crate::config::DeviceConfig;
use crate::connection::{ConnectionManager, SessionState};
use crate::effects::{music_mode_by_name, scene_by_name, SCENES};
use crate::fragment::fragment;
use crate::protocol::Frame;
use crate::transport::DeviceResolver;
use crate::{Error, Result};

/// Converts a 0-255 brightness to the device's 1-100 percentage
pub fn brightness_from_255(value: u8) -> u8 {
    (u32::from(value) * 100 / 255).clamp(1, 100) as u8
}

/// Converts a 0-100 percentage to a 0-255 brightness
pub fn brightness_to_255(percent: u8) -> u8 {
    (u32::from(percent.min(100)) * 255 / 100) as u8
}

/// Main struct for controlling a Govee LED strip
///
/// State is optimistic: the device is not asked to confirm it, so the
/// fields reflect the last command that was written successfully.
pub struct LedStrip<R: DeviceResolver> {
    connection: ConnectionManager<R>,
    /// Current power state
    pub is_on: bool,
    /// Current RGB color (red, green, blue)
    pub rgb_color: (u8, u8, u8),
    /// Current brightness (0-100)
    pub brightness: u8,
    /// Current color temperature in Kelvin if using white light
    pub color_temp_kelvin: Option<u32>,
    /// Name of the active scene or music mode
    pub effect: Option<String>,
}

impl<R: DeviceResolver> LedStrip<R> {
    /// Creates a strip controller; the link is opened by the first command
    pub fn new(address: impl Into<String>, resolver: R, config: DeviceConfig) -> LedStrip<R> {
        Self::with_connection(ConnectionManager::new(address, resolver, config))
    }

    /// Wraps an existing, possibly shared, connection
    pub fn with_connection(connection: ConnectionManager<R>) -> LedStrip<R> {
        LedStrip {
            connection,
            is_on: false,
            rgb_color: (255, 255, 255),
            brightness: 100,
            color_temp_kelvin: None,
            effect: None,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<R> {
        &self.connection
    }

    pub fn address(&self) -> &str {
        self.connection.address()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.state() == SessionState::Connected
    }

    /// Brightness on a 0-255 scale
    pub fn brightness_255(&self) -> u8 {
        brightness_to_255(self.brightness)
    }

    /// Turns the LED strip on
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn power_on(&mut self) -> Result<()> {
        debug!("Turning LED strip on");
        self.connection.send_command(&commands::power(true)).await?;
        self.is_on = true;
        self.effect = None;
        info!("LED strip powered on");
        Ok(())
    }

    /// Turns the LED strip off
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn power_off(&mut self) -> Result<()> {
        debug!("Turning LED strip off");
        self.connection.send_command(&commands::power(false)).await?;
        self.is_on = false;
        info!("LED strip powered off");
        Ok(())
    }

    /// Sets the brightness level
    ///
    /// # Arguments
    ///
    /// * `value` - Brightness level (0-100)
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_brightness(&mut self, value: u8) -> Result<()> {
        let limited_value = value.min(100);
        if value > 100 {
            warn!(
                "Brightness value {} out of range (0-100), limiting to 100",
                value
            );
        }

        debug!("Setting brightness to {}%", limited_value);
        self.connection
            .send_command(&commands::brightness(limited_value.into()))
            .await?;
        self.brightness = limited_value;

        info!("Brightness set to {}%", limited_value);
        Ok(())
    }

    /// Sets the brightness from a 0-255 value, never going fully dark
    pub async fn set_brightness_255(&mut self, value: u8) -> Result<()> {
        self.set_brightness(brightness_from_255(value)).await
    }

    /// Sets every segment to one RGB color
    ///
    /// # Arguments
    ///
    /// * `red_value` - Red component (0-255)
    /// * `green_value` - Green component (0-255)
    /// * `blue_value` - Blue component (0-255)
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_color(&mut self, red_value: u8, green_value: u8, blue_value: u8) -> Result<()> {
        debug!(
            "Setting color to RGB({}, {}, {})",
            red_value, green_value, blue_value
        );
        self.connection
            .send_command(&commands::color_rgb(
                red_value.into(),
                green_value.into(),
                blue_value.into(),
            ))
            .await?;

        self.rgb_color = (red_value, green_value, blue_value);
        self.color_temp_kelvin = None;
        self.effect = None;
        info!(
            "Color set to RGB({}, {}, {})",
            red_value, green_value, blue_value
        );
        Ok(())
    }

    /// Sets one color through the single-color mode, for firmware that
    /// ignores the segment mask
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_color_simple(&mut self, red_value: u8, green_value: u8, blue_value: u8) -> Result<()> {
        self.connection
            .send_command(&commands::color_rgb_simple(
                red_value.into(),
                green_value.into(),
                blue_value.into(),
            ))
            .await?;

        self.rgb_color = (red_value, green_value, blue_value);
        self.color_temp_kelvin = None;
        self.effect = None;
        info!(
            "Color set to RGB({}, {}, {}) in simple mode",
            red_value, green_value, blue_value
        );
        Ok(())
    }

    /// Sets the color of individual segments (1-15)
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_segment_color(
        &mut self,
        red_value: u8,
        green_value: u8,
        blue_value: u8,
        segments: &[u8],
    ) -> Result<()> {
        let ignored: Vec<u8> = segments
            .iter()
            .copied()
            .filter(|seg| !(1..=commands::SEGMENT_COUNT).contains(seg))
            .collect();
        if !ignored.is_empty() {
            warn!("Ignoring segments outside 1-15: {:?}", ignored);
        }

        self.connection
            .send_command(&commands::segment_color(
                red_value.into(),
                green_value.into(),
                blue_value.into(),
                segments,
            ))
            .await?;
        self.effect = None;
        info!("Segments {:?} set to RGB({}, {}, {})", segments, red_value, green_value, blue_value);
        Ok(())
    }

    /// Sets white light by color temperature
    ///
    /// # Arguments
    ///
    /// * `value` - Color temperature in Kelvin (1000-10000)
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_color_temp_kelvin(&mut self, value: u32) -> Result<()> {
        let temp = value.clamp(MIN_KELVIN, MAX_KELVIN);
        if temp != value {
            warn!(
                "Color temperature {} out of range ({}-{}), adjusting to {}",
                value, MIN_KELVIN, MAX_KELVIN, temp
            );
        }

        debug!("Setting color temperature to {}K", temp);
        self.connection.send_command(&commands::color_temp(temp)).await?;

        self.color_temp_kelvin = Some(temp);
        self.effect = None;
        info!("Color temperature set to {}K", temp);
        Ok(())
    }

    /// Activates a scene by name (see [`SCENES`])
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_scene(&mut self, name: &str) -> Result<()> {
        let scene = scene_by_name(name).ok_or_else(|| Error::UnknownEffect(name.to_string()))?;

        debug!("Setting scene {} ({:#04x})", scene.name, scene.id);
        self.connection.send_command(&commands::scene(scene.id)).await?;
        self.effect = Some(scene.name.to_string());
        info!("Scene set to {}", scene.name);
        Ok(())
    }

    /// Activates a scene by raw id, including ids missing from [`SCENES`]
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_scene_id(&mut self, scene_id: u8) -> Result<()> {
        self.connection.send_command(&commands::scene(scene_id)).await?;
        self.effect = Some(
            SCENES
                .iter()
                .find(|scene| scene.id == scene_id)
                .map(|scene| scene.name.to_string())
                .unwrap_or_else(|| format!("scene {:#04x}", scene_id)),
        );
        info!("Scene set to {:#04x}", scene_id);
        Ok(())
    }

    /// Activates a music mode by name
    ///
    /// # Arguments
    ///
    /// * `name` - Music mode (see [`crate::effects::MUSIC_MODES`])
    /// * `sensitivity` - Microphone sensitivity, defaults to 0x63
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn set_music_mode(&mut self, name: &str, sensitivity: Option<u8>) -> Result<()> {
        let mode =
            music_mode_by_name(name).ok_or_else(|| Error::UnknownEffect(name.to_string()))?;
        let sensitivity = sensitivity.unwrap_or(DEFAULT_SENSITIVITY);

        debug!(
            "Setting music mode {} ({:#04x}) with sensitivity {:#04x}",
            mode.name, mode.id, sensitivity
        );
        self.connection
            .send_command(&commands::music_mode(mode.id, sensitivity))
            .await?;
        self.effect = Some(mode.name.to_string());
        info!("Music mode set to {}", mode.name);
        Ok(())
    }

    /// Asks the device to report its state
    ///
    /// Replies arrive as notifications, which are not read here; the query
    /// doubles as a keep-alive.
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn query_state(&self) -> Result<()> {
        self.connection.send_command(&commands::state_query()).await
    }

    /// Sends a keep-alive frame, rearming the idle disconnect
    pub async fn keep_alive(&self) -> Result<()> {
        self.connection.send_command(&commands::keep_alive()).await
    }

    /// Sends an already encoded frame as-is
    #[instrument(skip(self), fields(address = %self.address()))]
    pub async fn send_raw(&self, frame: Frame) -> Result<()> {
        debug!("Sending raw frame {:?}", frame);
        self.connection.send_command(&frame).await
    }

    /// Sends a payload too long for one frame as a fragment sequence
    #[instrument(skip(self, header, data), fields(address = %self.address(), len = data.len()))]
    pub async fn send_fragmented(&self, protocol_type: u8, header: &[u8], data: &[u8]) -> Result<()> {
        let frames = fragment(protocol_type, header, data)?;
        self.connection.send_frames(&frames).await
    }

    /// Closes the link; the next command reconnects
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeResolver, Script};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn strip() -> (LedStrip<FakeResolver>, Arc<Script>) {
        let (resolver, script) = FakeResolver::scripted();
        (
            LedStrip::new("AA:BB:CC:DD:EE:FF", resolver, DeviceConfig::default()),
            script,
        )
    }

    #[test]
    fn brightness_scales() {
        assert_eq!(brightness_from_255(255), 100);
        assert_eq!(brightness_from_255(128), 50);
        assert_eq!(brightness_from_255(0), 1);
        assert_eq!(brightness_to_255(100), 255);
        assert_eq!(brightness_to_255(50), 127);
        assert_eq!(brightness_to_255(200), 255);
    }

    #[tokio::test]
    async fn turn_on_with_color() {
        let (mut strip, script) = strip();
        strip.power_on().await.unwrap();
        strip.set_brightness(150).await.unwrap();
        strip.set_color(255, 0, 0).await.unwrap();

        assert!(strip.is_on);
        assert!(strip.is_connected());
        assert_eq!(strip.brightness, 100);
        assert_eq!(strip.rgb_color, (255, 0, 0));
        assert_eq!(
            script.written(),
            vec![
                commands::power(true),
                commands::brightness(100),
                commands::color_rgb(255, 0, 0),
            ]
        );
    }

    #[tokio::test]
    async fn simple_color_and_full_range_brightness() {
        let (mut strip, script) = strip();
        strip.set_color_simple(10, 20, 30).await.unwrap();
        strip.set_brightness_255(128).await.unwrap();

        assert_eq!(strip.rgb_color, (10, 20, 30));
        assert_eq!(strip.brightness, 50);
        assert_eq!(strip.brightness_255(), 127);
        assert_eq!(
            script.written(),
            vec![
                commands::color_rgb_simple(10, 20, 30),
                commands::brightness(50),
            ]
        );
    }

    #[tokio::test]
    async fn color_temperature_is_sent_as_rgb() {
        let (mut strip, script) = strip();
        strip.set_scene("rainbow").await.unwrap();
        strip.set_color_temp_kelvin(20000).await.unwrap();

        assert_eq!(strip.color_temp_kelvin, Some(MAX_KELVIN));
        assert_eq!(strip.effect, None);
        assert_eq!(script.written()[1], commands::color_temp(10000));
    }

    #[tokio::test]
    async fn unknown_effects_are_rejected_before_sending() {
        let (mut strip, script) = strip();
        assert!(matches!(
            strip.set_scene("disco").await,
            Err(Error::UnknownEffect(name)) if name == "disco"
        ));
        assert!(matches!(
            strip.set_music_mode("polka", None).await,
            Err(Error::UnknownEffect(_))
        ));
        assert_eq!(Script::count(&script.resolves), 0);
        assert!(script.written().is_empty());
    }

    #[tokio::test]
    async fn effects_update_state() {
        let (mut strip, script) = strip();
        strip.set_scene("Movie").await.unwrap();
        assert_eq!(strip.effect.as_deref(), Some("movie"));

        strip.set_music_mode("energetic", None).await.unwrap();
        assert_eq!(strip.effect.as_deref(), Some("energetic"));

        strip.set_scene_id(0x42).await.unwrap();
        assert_eq!(strip.effect.as_deref(), Some("scene 0x42"));

        assert_eq!(
            script.written(),
            vec![
                commands::scene(0x04),
                commands::music_mode(0x05, 0x63),
                commands::scene(0x42),
            ]
        );
    }

    #[tokio::test]
    async fn failed_command_leaves_state_untouched() {
        let (mut strip, script) = strip();
        script.fail_writes(&[0, 1, 2]);

        assert!(strip.power_on().await.is_err());
        assert!(!strip.is_on);
        assert!(!strip.is_connected());

        script.hidden.store(true, Ordering::SeqCst);
        assert!(matches!(
            strip.set_brightness(10).await,
            Err(Error::DeviceNotFound(_))
        ));
        assert_eq!(strip.brightness, 100);
    }

    #[tokio::test]
    async fn segments_raw_and_fragments() {
        let (mut strip, script) = strip();
        strip.set_segment_color(0, 255, 0, &[1, 2, 16]).await.unwrap();
        let raw = Frame::from_hex("aa010000000000000000000000000000000000ab").unwrap();
        strip.send_raw(raw).await.unwrap();
        strip.send_fragmented(0xA3, &[0x01], &[0x7E; 40]).await.unwrap();

        let written = script.written();
        assert_eq!(written[0], commands::segment_color(0, 255, 0, &[1, 2]));
        assert_eq!(written[1], commands::state_query());
        assert_eq!(&written[2..], fragment(0xA3, &[0x01], &[0x7E; 40]).unwrap().as_slice());
        assert_eq!(Script::count(&script.connects), 1);
    }

    #[tokio::test]
    async fn disconnect_then_reconnect() {
        let (strip, script) = strip();
        strip.query_state().await.unwrap();
        strip.disconnect().await;
        assert!(!strip.is_connected());

        strip.keep_alive().await.unwrap();
        assert!(strip.is_connected());
        assert_eq!(Script::count(&script.connects), 2);
    }
}

/*!
 # Command builders

 Each builder produces one finished frame. Numeric inputs are clamped into
 their valid range instead of being rejected.
*/

use tracing::debug;

use crate::protocol::{
    build_frame, Frame, ACTION_BRIGHTNESS, ACTION_COLOR, ACTION_POWER, COMMAND, MODE_MANUAL,
    MODE_MUSIC, MODE_SCENE, MODE_SEGMENTS, QUERY,
};

/// Number of independently addressable segments
pub const SEGMENT_COUNT: u8 = 15;
/// Segment mask selecting every segment (low byte, high byte)
pub const ALL_SEGMENTS: (u8, u8) = (0xFF, 0x7F);
/// Music mode sensitivity used by the Govee app
pub const DEFAULT_SENSITIVITY: u8 = 0x63;

/// Supported color temperature range for the Kelvin conversion
pub const MIN_KELVIN: u32 = 1000;
pub const MAX_KELVIN: u32 = 10000;

/// Sub-command of the segmented color mode that sets an RGB value
const SEGMENT_SET_COLOR: u8 = 0x01;

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Turns the strip on or off
pub fn power(on: bool) -> Frame {
    build_frame(COMMAND, ACTION_POWER, &[if on { 0x01 } else { 0x00 }])
}

/// Sets brightness as a percentage (0-100)
pub fn brightness(percent: i32) -> Frame {
    let limited = percent.clamp(0, 100);
    if limited != percent {
        debug!("Brightness {} out of range (0-100), clamped to {}", percent, limited);
    }
    build_frame(COMMAND, ACTION_BRIGHTNESS, &[limited as u8])
}

/// Sets every segment to one RGB color
pub fn color_rgb(red: i32, green: i32, blue: i32) -> Frame {
    segmented_color(red, green, blue, ALL_SEGMENTS)
}

/// Sets the color using the older non-segmented manual mode
///
/// Segmented models such as the H617A ignore this.
pub fn color_rgb_simple(red: i32, green: i32, blue: i32) -> Frame {
    build_frame(
        COMMAND,
        ACTION_COLOR,
        &[
            MODE_MANUAL,
            clamp_channel(red),
            clamp_channel(green),
            clamp_channel(blue),
        ],
    )
}

/// Sets the color of the given segments (1-15); other numbers are ignored
pub fn segment_color(red: i32, green: i32, blue: i32, segments: &[u8]) -> Frame {
    segmented_color(red, green, blue, segment_mask(segments))
}

fn segmented_color(red: i32, green: i32, blue: i32, (mask_lo, mask_hi): (u8, u8)) -> Frame {
    build_frame(
        COMMAND,
        ACTION_COLOR,
        &[
            MODE_SEGMENTS,
            SEGMENT_SET_COLOR,
            clamp_channel(red),
            clamp_channel(green),
            clamp_channel(blue),
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            mask_lo,
            mask_hi,
        ],
    )
}

/// Builds the two-byte segment bitmask
///
/// Segment `n` sets bit `n - 1` of a 15-bit mask: segments 1-8 land in the
/// low byte, 9-15 in the high byte.
pub fn segment_mask(segments: &[u8]) -> (u8, u8) {
    let mask = segments
        .iter()
        .filter(|&&seg| (1..=SEGMENT_COUNT).contains(&seg))
        .fold(0u16, |mask, &seg| mask | 1 << (seg - 1));
    ((mask & 0xFF) as u8, (mask >> 8) as u8)
}

/// Approximates the RGB color of a black body at `kelvin`
///
/// Tanner Helland's fit, clamped to 1000-10000K. Channels are truncated,
/// not rounded.
pub fn kelvin_to_rgb(kelvin: u32) -> (u8, u8, u8) {
    let temp = kelvin.clamp(MIN_KELVIN, MAX_KELVIN) as f64 / 100.0;

    let red = if temp <= 66.0 {
        255.0
    } else {
        329.698727446 * (temp - 60.0).powf(-0.1332047592)
    };

    let green = if temp <= 66.0 {
        99.4708025861 * temp.ln() - 161.1195681661
    } else {
        288.1221695283 * (temp - 60.0).powf(-0.0755148492)
    };

    let blue = if temp >= 66.0 {
        255.0
    } else if temp <= 19.0 {
        0.0
    } else {
        138.5177312231 * (temp - 10.0).ln() - 305.0447927307
    };

    let channel = |value: f64| value.clamp(0.0, 255.0) as u8;
    (channel(red), channel(green), channel(blue))
}

/// Sets white light of the given temperature
///
/// There is no native color temperature command, so the temperature is
/// converted to RGB and sent as a segmented color.
pub fn color_temp(kelvin: u32) -> Frame {
    let (red, green, blue) = kelvin_to_rgb(kelvin);
    debug!(
        "Color temperature {}K maps to RGB({}, {}, {})",
        kelvin, red, green, blue
    );
    color_rgb(red.into(), green.into(), blue.into())
}

/// Activates a built-in scene (see [`crate::effects::SCENES`])
pub fn scene(scene_id: u8) -> Frame {
    build_frame(COMMAND, ACTION_COLOR, &[MODE_SCENE, scene_id])
}

/// Activates a music mode (see [`crate::effects::MUSIC_MODES`])
pub fn music_mode(mode_id: u8, sensitivity: u8) -> Frame {
    build_frame(COMMAND, ACTION_COLOR, &[MODE_MUSIC, mode_id, sensitivity])
}

/// Asks the device to report its state
pub fn state_query() -> Frame {
    build_frame(QUERY, ACTION_POWER, &[])
}

/// Keeps the link busy; identical to [`state_query`]
pub fn keep_alive() -> Frame {
    state_query()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{MUSIC_MODES, SCENES};
    use crate::protocol::checksum;

    fn hex(frame: Frame) -> String {
        frame.to_hex()
    }

    #[test]
    fn power_vectors() {
        assert_eq!(hex(power(true)), "3301010000000000000000000000000000000033");
        assert_eq!(hex(power(false)), "3301000000000000000000000000000000000032");
    }

    #[test]
    fn brightness_is_clamped() {
        let frame = brightness(100);
        assert_eq!(frame.kind(), 0x33);
        assert_eq!(frame.action(), 0x04);
        assert_eq!(frame.as_bytes()[2], 100);
        assert_eq!(brightness(0).as_bytes()[2], 0);
        assert_eq!(brightness(200).as_bytes()[2], 100);
        assert_eq!(brightness(-10).as_bytes()[2], 0);
        assert_eq!(checksum(brightness(50).as_bytes()), 0);
    }

    #[test]
    fn color_uses_segmented_mode() {
        let frame = color_rgb(0xFF, 0x00, 0x00);
        assert_eq!(
            &frame.as_bytes()[..14],
            &[0x33, 0x05, 0x15, 0x01, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x7F]
        );
        assert_eq!(checksum(frame.as_bytes()), 0);
    }

    #[test]
    fn color_channels_are_clamped() {
        let bytes = *color_rgb(300, -10, 128).as_bytes();
        assert_eq!(&bytes[4..7], &[255, 0, 128]);
    }

    #[test]
    fn simple_color_mode() {
        let frame = color_rgb_simple(0xAA, 0xBB, 0xCC);
        assert_eq!(&frame.as_bytes()[..6], &[0x33, 0x05, 0x02, 0xAA, 0xBB, 0xCC]);
        assert_eq!(color_rgb_simple(999, 0, 0).as_bytes()[3], 0xFF);
    }

    #[test]
    fn segment_masks() {
        let all: Vec<u8> = (1..=15).collect();
        assert_eq!(segment_mask(&all), (0xFF, 0x7F));
        assert_eq!(segment_mask(&[1]), (0x01, 0x00));
        assert_eq!(segment_mask(&[8]), (0x80, 0x00));
        assert_eq!(segment_mask(&[9]), (0x00, 0x01));
        assert_eq!(segment_mask(&[15]), (0x00, 0x40));
        assert_eq!(segment_mask(&[1, 9]), (0x01, 0x01));
        assert_eq!(segment_mask(&[]), (0x00, 0x00));
        assert_eq!(segment_mask(&[0, 16, 20]), (0x00, 0x00));
        assert_eq!(segment_mask(&[3, 3, 3]), (0x04, 0x00));
    }

    #[test]
    fn segment_color_frame() {
        assert_eq!(
            hex(segment_color(1, 2, 3, &[1, 9, 15])),
            "3305150101020300000000000141000000000062"
        );
        let bytes = *segment_color(255, 0, 0, &[0, 16]).as_bytes();
        assert_eq!((bytes[12], bytes[13]), (0x00, 0x00));
    }

    #[test]
    fn kelvin_reference_values() {
        assert_eq!(kelvin_to_rgb(1000), (255, 67, 0));
        assert_eq!(kelvin_to_rgb(2700), (255, 166, 87));
        assert_eq!(kelvin_to_rgb(4000), (255, 205, 166));
        assert_eq!(kelvin_to_rgb(5500), (255, 237, 222));
        assert_eq!(kelvin_to_rgb(6500), (255, 254, 250));
        assert_eq!(kelvin_to_rgb(6600), (255, 255, 255));
        assert_eq!(kelvin_to_rgb(10000), (201, 218, 255));
    }

    #[test]
    fn kelvin_warm_and_cool() {
        let (r, g, b) = kelvin_to_rgb(2700);
        assert_eq!(r, 255);
        assert!(g > 100);
        assert!(b < g);

        let (r, _, b) = kelvin_to_rgb(6500);
        assert_eq!(r, 255);
        assert!(b > 200);
    }

    #[test]
    fn kelvin_out_of_range_is_clamped() {
        assert_eq!(kelvin_to_rgb(500), kelvin_to_rgb(1000));
        assert_eq!(kelvin_to_rgb(20000), kelvin_to_rgb(10000));
        assert_eq!(kelvin_to_rgb(0), kelvin_to_rgb(1000));
        assert_eq!(kelvin_to_rgb(u32::MAX), kelvin_to_rgb(10000));
    }

    #[test]
    fn color_temp_frame() {
        assert_eq!(
            hex(color_temp(2700)),
            "33051501ffa6570000000000ff7f0000000000ac"
        );
        assert_eq!(color_temp(4000).as_bytes()[2], 0x15);
    }

    #[test]
    fn scene_vectors() {
        assert_eq!(hex(scene(0x00)), "3305040000000000000000000000000000000032");
        assert_eq!(hex(scene(0x01)), "3305040100000000000000000000000000000033");
        assert_eq!(hex(scene(0x04)), "3305040400000000000000000000000000000036");
        assert_eq!(hex(scene(0x16)), "3305041600000000000000000000000000000024");
        for entry in SCENES {
            assert_eq!(checksum(scene(entry.id).as_bytes()), 0, "scene {}", entry.name);
        }
    }

    #[test]
    fn music_vectors() {
        assert_eq!(hex(music_mode(0x05, 0x63)), "3305130563000000000000000000000000000043");
        assert_eq!(hex(music_mode(0x04, 0x63)), "3305130463000000000000000000000000000042");
        assert_eq!(hex(music_mode(0x03, 0x63)), "3305130363000000000000000000000000000045");
        assert_eq!(hex(music_mode(0x32, 0x63)), "3305133263000000000000000000000000000074");
        assert_eq!(
            &music_mode(0x06, DEFAULT_SENSITIVITY).as_bytes()[..5],
            &[0x33, 0x05, 0x13, 0x06, 0x63]
        );
        for entry in MUSIC_MODES {
            let frame = music_mode(entry.id, DEFAULT_SENSITIVITY);
            assert_eq!(checksum(frame.as_bytes()), 0, "music mode {}", entry.name);
        }
    }

    #[test]
    fn state_query_and_keep_alive() {
        assert_eq!(hex(state_query()), "aa010000000000000000000000000000000000ab");
        assert_eq!(keep_alive(), state_query());
    }
}

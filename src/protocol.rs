/*!
 # Govee BLE frame codec

 Every unit written to the control characteristic is exactly 20 bytes:
 a type marker, an action byte, up to 17 parameter bytes (zero-padded)
 and an XOR checksum of the first 19 bytes.
*/

use std::fmt;

use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

/// Size of every frame on the wire
pub const FRAME_LEN: usize = 20;
/// Bytes covered by the checksum
pub const DATA_LEN: usize = FRAME_LEN - 1;
/// Maximum parameter bytes after the type and action bytes
pub const MAX_PARAMS: usize = DATA_LEN - 2;

/// Type marker for commands
pub const COMMAND: u8 = 0x33;
/// Type marker for state queries
pub const QUERY: u8 = 0xAA;

/// Action bytes
pub const ACTION_POWER: u8 = 0x01;
pub const ACTION_BRIGHTNESS: u8 = 0x04;
pub const ACTION_COLOR: u8 = 0x05;

/// Sub-modes carried in the first parameter byte of an `ACTION_COLOR` frame
pub const MODE_MANUAL: u8 = 0x02;
pub const MODE_SCENE: u8 = 0x04;
pub const MODE_MUSIC: u8 = 0x13;
pub const MODE_SEGMENTS: u8 = 0x15;

/// GATT service exposing the control characteristics
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d1910);
/// Characteristic commands are written to
pub const WRITE_UUID: Uuid = Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b11);
/// Characteristic state notifications are read from
pub const READ_UUID: Uuid = Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b10);

/// XOR of all bytes in `data`
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// A checksummed 20-byte frame, immutable once built
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Seals `data` by writing its checksum into the last byte
    pub(crate) fn seal(mut data: [u8; FRAME_LEN]) -> Frame {
        data[DATA_LEN] = checksum(&data[..DATA_LEN]);
        Frame(data)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_LEN] {
        self.0
    }

    /// Type marker (byte 0)
    pub fn kind(&self) -> u8 {
        self.0[0]
    }

    /// Action or sequence byte (byte 1)
    pub fn action(&self) -> u8 {
        self.0[1]
    }

    /// Lowercase hex rendering, as captured in BLE traffic logs
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parses a frame from hex, ignoring whitespace
    pub fn from_hex(s: &str) -> Result<Frame> {
        let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() % 2 != 0 {
            return Err(Error::Encoding(format!("odd number of hex digits in {:?}", s)));
        }
        let bytes = digits
            .chunks(2)
            .map(|pair| {
                let text: String = pair.iter().collect();
                if !pair.iter().all(char::is_ascii_hexdigit) {
                    return Err(Error::Encoding(format!("invalid hex byte {:?}", text)));
                }
                u8::from_str_radix(&text, 16)
                    .map_err(|_| Error::Encoding(format!("invalid hex byte {:?}", text)))
            })
            .collect::<Result<Vec<u8>>>()?;
        Frame::try_from(bytes.as_slice())
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.to_hex())
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = Error;

    /// Accepts an externally supplied frame only if it is 20 bytes long and
    /// its checksum byte matches
    fn try_from(bytes: &[u8]) -> Result<Frame> {
        let data: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| {
            Error::Encoding(format!(
                "frame must be {} bytes, got {}",
                FRAME_LEN,
                bytes.len()
            ))
        })?;
        let expected = checksum(&data[..DATA_LEN]);
        if data[DATA_LEN] != expected {
            return Err(Error::Encoding(format!(
                "bad checksum {:#04x}, expected {:#04x}",
                data[DATA_LEN], expected
            )));
        }
        Ok(Frame(data))
    }
}

/// Builds a single command frame
///
/// # Arguments
///
/// * `command_type` - Type marker (`COMMAND` or `QUERY`)
/// * `action` - Action byte
/// * `params` - Parameter bytes; anything past the first 17 is dropped
pub fn build_frame(command_type: u8, action: u8, params: &[u8]) -> Frame {
    let params = if params.len() > MAX_PARAMS {
        warn!(
            "Frame params too long ({} bytes), truncating to {}",
            params.len(),
            MAX_PARAMS
        );
        &params[..MAX_PARAMS]
    } else {
        params
    };

    let mut data = [0u8; FRAME_LEN];
    data[0] = command_type;
    data[1] = action;
    data[2..2 + params.len()].copy_from_slice(params);
    Frame::seal(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_vectors() {
        assert_eq!(checksum(&[0u8; 19]), 0x00);
        let mut power_on = [0u8; 19];
        power_on[..3].copy_from_slice(&[0x33, 0x01, 0x01]);
        assert_eq!(checksum(&power_on), 0x33);
        let mut query = [0u8; 19];
        query[..2].copy_from_slice(&[0xAA, 0x01]);
        assert_eq!(checksum(&query), 0xAB);
    }

    #[test]
    fn frame_is_padded_and_checksummed() {
        let frame = build_frame(COMMAND, ACTION_POWER, &[]);
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), FRAME_LEN);
        assert!(bytes[2..DATA_LEN].iter().all(|&b| b == 0));
        assert_eq!(checksum(bytes), 0);
    }

    #[test]
    fn checksum_holds_for_every_param_length() {
        let params: Vec<u8> = (0xE0..=0xF0).collect();
        for len in 0..=MAX_PARAMS {
            let frame = build_frame(0x33, 0x7F, &params[..len]);
            assert_eq!(frame.as_bytes()[DATA_LEN], checksum(&frame.as_bytes()[..DATA_LEN]));
            assert_eq!(checksum(frame.as_bytes()), 0);
            assert_eq!(&frame.as_bytes()[2..2 + len], &params[..len]);
        }
    }

    #[test]
    fn long_params_are_truncated() {
        let params: Vec<u8> = (1..=20).collect();
        let frame = build_frame(0x33, 0x01, &params);
        assert_eq!(&frame.as_bytes()[2..19], &params[..17]);
        assert_eq!(frame, build_frame(0x33, 0x01, &params[..17]));
    }

    #[test]
    fn build_is_deterministic() {
        let a = build_frame(0x33, 0x05, &[0x04, 0x16]);
        let b = build_frame(0x33, 0x05, &[0x04, 0x16]);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn hex_round_trip_and_validation() {
        let frame = Frame::from_hex("33 01 01 00000000000000000000000000000000 33").unwrap();
        assert_eq!(frame, build_frame(COMMAND, ACTION_POWER, &[0x01]));
        assert_eq!(frame.to_hex(), "3301010000000000000000000000000000000033");

        assert!(matches!(
            Frame::from_hex("3301010000000000000000000000000000000034"),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(Frame::from_hex("3301"), Err(Error::Encoding(_))));
        assert!(matches!(Frame::from_hex("zz"), Err(Error::Encoding(_))));
        assert!(matches!(
            Frame::from_hex("+301010000000000000000000000000000000003"),
            Err(Error::Encoding(_))
        ));
    }
}

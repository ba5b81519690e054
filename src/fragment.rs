/*!
 # Multi-frame fragmentation

 Payloads that do not fit in a single frame are sent as an ordered
 sequence: one initial frame (byte 1 = `0x00`) carrying the header and the
 first bytes of data, zero or more continuation frames (byte 1 = 1..N) with
 17 data bytes each, and a terminator frame (byte 1 = `0xFF`) with the last
 chunk. The device parses the stream by byte 1, so order must be kept.
*/

use tracing::{debug, trace};

use crate::protocol::{Frame, DATA_LEN, FRAME_LEN};
use crate::{Error, Result};

/// Byte 1 of the initial frame
pub const INITIAL_MARKER: u8 = 0x00;
/// Byte 1 of the terminator frame
pub const TERMINATOR_MARKER: u8 = 0xFF;

/// Data bytes carried by a continuation or terminator frame
const CHUNK_LEN: usize = DATA_LEN - 2;
/// Offset of the header in the initial frame
const HEADER_OFFSET: usize = 4;
/// Longest header that leaves the initial frame well-formed
pub const MAX_HEADER_LEN: usize = DATA_LEN - HEADER_OFFSET;
/// Byte 3 of the initial frame holds continuations + 2
const MAX_CONTINUATIONS: usize = u8::MAX as usize - 2;

/// Splits `data` into an ordered, individually checksummed frame sequence
///
/// # Arguments
///
/// * `protocol_type` - Byte 0 of every frame in the sequence
/// * `header` - Bytes placed at offset 4 of the initial frame (at most 15)
/// * `data` - Payload to spread over the sequence
///
/// The sequence length always equals byte 3 of the initial frame.
pub fn fragment(protocol_type: u8, header: &[u8], data: &[u8]) -> Result<Vec<Frame>> {
    if header.len() > MAX_HEADER_LEN {
        return Err(Error::Encoding(format!(
            "fragment header is {} bytes, at most {} fit",
            header.len(),
            MAX_HEADER_LEN
        )));
    }

    let data_offset = HEADER_OFFSET + header.len();
    let remaining_space = DATA_LEN - data_offset;

    let mut initial = [0u8; FRAME_LEN];
    initial[0] = protocol_type;
    initial[1] = INITIAL_MARKER;
    initial[2] = 0x01;
    initial[HEADER_OFFSET..data_offset].copy_from_slice(header);

    let mut terminator = [0u8; FRAME_LEN];
    terminator[0] = protocol_type;
    terminator[1] = TERMINATOR_MARKER;

    let mut continuations = Vec::new();

    if data.len() <= remaining_space {
        initial[data_offset..data_offset + data.len()].copy_from_slice(data);
    } else {
        let (head, excess) = data.split_at(remaining_space);
        initial[data_offset..DATA_LEN].copy_from_slice(head);

        // `chunks` leaves a full-size final chunk when the excess divides evenly
        let chunks: Vec<&[u8]> = excess.chunks(CHUNK_LEN).collect();
        if chunks.len() - 1 > MAX_CONTINUATIONS {
            return Err(Error::Encoding(format!(
                "payload of {} bytes needs {} continuation frames, at most {} are addressable",
                data.len(),
                chunks.len() - 1,
                MAX_CONTINUATIONS
            )));
        }

        if let Some((last, rest)) = chunks.split_last() {
            for (i, chunk) in rest.iter().enumerate() {
                let mut buffer = [0u8; FRAME_LEN];
                buffer[0] = protocol_type;
                buffer[1] = (i + 1) as u8;
                buffer[2..2 + chunk.len()].copy_from_slice(chunk);
                continuations.push(Frame::seal(buffer));
            }
            terminator[2..2 + last.len()].copy_from_slice(last);
        }
    }

    initial[3] = (continuations.len() + 2) as u8;

    let mut frames = Vec::with_capacity(continuations.len() + 2);
    frames.push(Frame::seal(initial));
    frames.extend(continuations);
    frames.push(Frame::seal(terminator));

    debug!(
        "Fragmented {} data bytes into {} frames",
        data.len(),
        frames.len()
    );
    for frame in &frames {
        trace!("Fragment {:?}", frame);
    }
    Ok(frames)
}

//! Chunked report framing for the auxiliary strip image transfer.
//!
//! The encoded image is carried in fixed 1024-byte output reports. Each
//! report starts with an 8-byte header:
//!
//! ```text
//! [0x02, 0x0B, 0x00, is_last, len_lo, len_hi, index_lo, index_hi]
//! ```
//!
//! followed by up to 1016 payload bytes, zero-padded to the full report
//! length. `is_last` is 1 exactly on the frame that carries the final
//! remaining bytes, and the chunk index counts frames, not bytes. Frames
//! must reach the firmware in order and must not interleave with other
//! writes on the same handle.

/// Total report length, including the header.
pub const REPORT_LENGTH: usize = 1024;

/// Header length in bytes.
pub const HEADER_LENGTH: usize = 8;

/// Payload capacity per report.
pub const PAYLOAD_LENGTH: usize = REPORT_LENGTH - HEADER_LENGTH;

/// Output report id for image transfers.
pub const REPORT_ID: u8 = 0x02;

/// Command byte selecting the strip image transfer.
pub const COMMAND_SET_STRIP_IMAGE: u8 = 0x0B;

/// Split an encoded image into the exact report sequence to write.
///
/// An empty input produces no reports.
#[must_use]
pub fn chunk_strip_reports(data: &[u8]) -> Vec<[u8; REPORT_LENGTH]> {
    let mut reports = Vec::with_capacity(data.len().div_ceil(PAYLOAD_LENGTH));

    for (index, payload) in data.chunks(PAYLOAD_LENGTH).enumerate() {
        let is_last = (index + 1) * PAYLOAD_LENGTH >= data.len();
        let len = payload.len();

        let mut report = [0u8; REPORT_LENGTH];
        report[0] = REPORT_ID;
        report[1] = COMMAND_SET_STRIP_IMAGE;
        report[2] = 0x00;
        report[3] = u8::from(is_last);
        report[4] = (len & 0xFF) as u8;
        report[5] = ((len >> 8) & 0xFF) as u8;
        report[6] = (index & 0xFF) as u8;
        report[7] = ((index >> 8) & 0xFF) as u8;
        report[HEADER_LENGTH..HEADER_LENGTH + len].copy_from_slice(payload);

        reports.push(report);
    }

    reports
}

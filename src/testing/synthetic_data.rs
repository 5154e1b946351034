//! Synthetic frames and SDP blobs
//!
//! Deterministic stand-ins for what a real engine and media server produce,
//! so the session manager can be exercised offline.

use crate::types::{FrameFormat, VideoFrame};
use bytes::Bytes;

/// Create an I420 frame whose content shifts with `sequence`
///
/// `width` and `height` are expected to be even.
pub fn synthetic_frame(sequence: u64, width: u32, height: u32) -> VideoFrame {
    let w = width as usize;
    let h = height as usize;
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut data = vec![128u8; y_size + uv_size * 2];

    // Luma gradient that moves each frame
    let base = (sequence % 256) as u8;
    for y in 0..h {
        for x in 0..w {
            data[y * w + x] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    VideoFrame::new(width, height, FrameFormat::I420, Bytes::from(data)).with_sequence(sequence, 0)
}

/// Local offer as a receive-only video peer would produce it
pub fn synthetic_offer_sdp(engine_id: u64) -> String {
    format!(
        "v=0\r\no=- {engine_id} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
         a=group:BUNDLE 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
         c=IN IP4 0.0.0.0\r\na=mid:0\r\na=recvonly\r\na=rtpmap:96 H264/90000\r\n"
    )
}

/// Media server answer for a given stream
pub fn synthetic_answer_sdp(stream: &str, sequence: u64) -> String {
    format!(
        "v=0\r\no=- {sequence} 1 IN IP4 10.0.0.1\r\ns={stream}\r\nt=0 0\r\n\
         m=video 8000 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 10.0.0.1\r\n\
         a=mid:0\r\na=sendonly\r\na=rtpmap:96 H264/90000\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frame_layout() {
        let frame = synthetic_frame(3, 16, 8);
        assert_eq!(frame.size_bytes(), 16 * 8 + 2 * (8 * 4));
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.format, FrameFormat::I420);
        assert_eq!(frame.data[0], 3);
    }

    #[test]
    fn test_sdp_blobs_are_sdp() {
        assert!(synthetic_offer_sdp(1).starts_with("v=0"));
        assert!(synthetic_offer_sdp(1).contains("a=recvonly"));
        assert!(synthetic_answer_sdp("cam1", 1).contains("s=cam1"));
    }
}

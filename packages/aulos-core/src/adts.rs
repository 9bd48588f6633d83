//! ADTS frame boundary detection.
//!
//! AAC audio arrives as a byte stream whose chunk boundaries never line up
//! with codec frame boundaries. This module locates frame starts by scanning
//! for the ADTS sync word and validating the fixed header region against the
//! session's expected encoder profile.
//!
//! Validation is deliberately strict: every reserved and expected bit must
//! match or the candidate is rejected and scanning resumes one byte later.
//! Sync-word bit patterns occur freely inside compressed payload data, so a
//! loose match would cut frames mid-payload; the trade-off is that unusual
//! but legitimate headers from a different encoder profile are rejected.
//! The expected values are therefore configuration ([`AdtsProfile`]), derived
//! from the track's known encoding parameters, never universal constants.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{ADTS_HEADER_LEN, ADTS_SYNC_BYTE, ADTS_SYNC_MASK};

/// Sample rates by ADTS sampling frequency index (indices 0-12).
const SAMPLE_RATE_TABLE: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Expected fixed-header values for the stream's encoder profile.
///
/// One profile is established per stream session from the track's known
/// encoding parameters; every frame in the session must match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdtsProfile {
    /// MPEG version bit: 0 for MPEG-4, 1 for MPEG-2.
    pub mpeg_version: u8,
    /// Whether the frames omit the CRC word (protection_absent = 1).
    pub protection_absent: bool,
    /// Audio object type minus one: 1 for AAC-LC.
    pub profile: u8,
    /// Sampling frequency index into the ADTS rate table.
    pub sampling_frequency_index: u8,
    /// Private bit, zero for every encoder we ingest.
    pub private_bit: u8,
    /// Channel configuration: 2 for stereo.
    pub channel_configuration: u8,
    /// Original/copy bit.
    pub original_copy: u8,
    /// Home bit.
    pub home: u8,
}

impl Default for AdtsProfile {
    /// The library's standard encode: 44.1kHz stereo AAC-LC without CRC.
    fn default() -> Self {
        Self {
            mpeg_version: 0,
            protection_absent: true,
            profile: 1,
            sampling_frequency_index: 4,
            private_bit: 0,
            channel_configuration: 2,
            original_copy: 0,
            home: 0,
        }
    }
}

impl AdtsProfile {
    /// Returns the sample rate in Hz for this profile's frequency index,
    /// or `None` for reserved indices.
    #[must_use]
    pub fn sample_rate_hz(&self) -> Option<u32> {
        SAMPLE_RATE_TABLE
            .get(self.sampling_frequency_index as usize)
            .copied()
    }

    /// Scans `window` for the first validated frame start.
    ///
    /// Returns the byte offset of the sync word, or `None` when no candidate
    /// in the window passes validation. A candidate needs the full
    /// [`ADTS_HEADER_LEN`] bytes in the window to be accepted, so a sync word
    /// split across a chunk boundary is found once the following chunk has
    /// been appended, never before.
    ///
    /// Pure and stateless: must be re-invoked on every growth of the
    /// accumulating buffer.
    #[must_use]
    pub fn find_frame_start(&self, window: &[u8]) -> Option<usize> {
        let last = window.len().checked_sub(ADTS_HEADER_LEN)?;
        (0..=last).find(|&i| self.matches_at(window, i))
    }

    /// Parses and validates the header at offset `i`. The caller guarantees
    /// `window[i..]` holds at least `ADTS_HEADER_LEN` bytes.
    fn matches_at(&self, window: &[u8], i: usize) -> bool {
        match AdtsHeader::parse(&window[i..]) {
            Some(header) => self.accepts(&header),
            None => false,
        }
    }

    /// Checks every fixed header field against the expected profile.
    #[must_use]
    pub fn accepts(&self, header: &AdtsHeader) -> bool {
        header.mpeg_version == self.mpeg_version
            && header.protection_absent == self.protection_absent
            && header.profile == self.profile
            && header.sampling_frequency_index == self.sampling_frequency_index
            && header.private_bit == self.private_bit
            && header.channel_configuration == self.channel_configuration
            && header.original_copy == self.original_copy
            && header.home == self.home
    }
}

/// Decoded fields of one ADTS fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub mpeg_version: u8,
    pub protection_absent: bool,
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub private_bit: u8,
    pub channel_configuration: u8,
    pub original_copy: u8,
    pub home: u8,
    /// Total frame length in bytes, header included.
    pub frame_length: u16,
}

impl AdtsHeader {
    /// Parses the fixed header at the start of `data`.
    ///
    /// Returns `None` when `data` is shorter than the header, the sync word
    /// is absent, or the layer bits are non-zero (always zero for AAC —
    /// rejected at parse time rather than profile time because no valid
    /// profile could ever accept them).
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ADTS_HEADER_LEN {
            return None;
        }
        // Sync word: all of byte 0, top 4 bits of byte 1.
        if data[0] != ADTS_SYNC_BYTE || data[1] & ADTS_SYNC_MASK != ADTS_SYNC_MASK {
            return None;
        }
        // Layer bits are zero for AAC.
        if (data[1] & 0x06) >> 1 != 0 {
            return None;
        }
        let frame_length = (u16::from(data[3] & 0x03) << 11)
            | (u16::from(data[4]) << 3)
            | (u16::from(data[5] & 0xE0) >> 5);
        Some(Self {
            mpeg_version: (data[1] & 0x08) >> 3,
            protection_absent: data[1] & 0x01 == 0x01,
            profile: (data[2] & 0xC0) >> 6,
            sampling_frequency_index: (data[2] & 0x3C) >> 2,
            private_bit: (data[2] & 0x02) >> 1,
            channel_configuration: ((data[2] & 0x01) << 2) | ((data[3] & 0xC0) >> 6),
            original_copy: (data[3] & 0x20) >> 5,
            home: (data[3] & 0x10) >> 4,
            frame_length,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a syntactically valid ADTS frame for the given profile:
    /// a 7-byte header followed by `payload_len` filler bytes.
    pub fn make_frame(profile: &AdtsProfile, payload_len: usize) -> Vec<u8> {
        let frame_length = (ADTS_HEADER_LEN + payload_len) as u16;
        let mut frame = vec![0u8; ADTS_HEADER_LEN + payload_len];
        frame[0] = ADTS_SYNC_BYTE;
        frame[1] = ADTS_SYNC_MASK
            | (profile.mpeg_version << 3)
            | u8::from(profile.protection_absent);
        frame[2] = (profile.profile << 6)
            | (profile.sampling_frequency_index << 2)
            | (profile.private_bit << 1)
            | ((profile.channel_configuration & 0x04) >> 2);
        frame[3] = ((profile.channel_configuration & 0x03) << 6)
            | (profile.original_copy << 5)
            | (profile.home << 4)
            | ((frame_length >> 11) as u8 & 0x03);
        frame[4] = (frame_length >> 3) as u8;
        frame[5] = ((frame_length & 0x07) as u8) << 5 | 0x1F;
        frame[6] = 0xFC;
        // Payload filler that cannot contain a stray sync byte.
        for byte in frame.iter_mut().skip(ADTS_HEADER_LEN) {
            *byte = 0xAB;
        }
        frame
    }
}

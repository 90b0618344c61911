//! PPM (Flipnote Studio) decoder
//!
//! Layout of a PPM file:
//! - `0x0000`: `PARA` magic, animation/sound data sizes, frame count - 1, version
//! - `0x0010`: metadata (lock, thumbnail index, author chain, timestamp)
//! - `0x00A0`: 64x48 4-bit thumbnail
//! - `0x06A0`: animation header, frame offset table and frame data
//! - per-frame sound effect flags, then a 32-byte sound header and the tracks
//! - 128-byte RSA-1024/SHA-1 signature and 16 bytes of padding

mod frame;
pub mod thumbnail;

use crate::audio::adpcm::decode_ppm_adpcm;
use crate::audio::pcm::ResampleMode;
use crate::decoder::FlipnoteDecoder;
use crate::error::{check_index, FlipnoteError, Result};
use crate::format::{
    Author, AuthorChain, AudioTrack, CameraFlags, FlipnoteFormat, FlipnoteMeta, NoteTimestamp,
    Rgba, SoundEffectFlags, TrackSpan,
};
use crate::fsid::ppm_fsid_region;
use crate::reader::ByteReader;

/// Frame width in pixels
pub const PPM_WIDTH: usize = 256;
/// Frame height in pixels
pub const PPM_HEIGHT: usize = 192;
/// Layers per frame
pub const PPM_NUM_LAYERS: usize = 2;
/// Ink colours per layer
pub const PPM_COLORS_PER_LAYER: usize = 1;
/// Audio sample rate in Hz
pub const PPM_AUDIO_SAMPLE_RATE: u32 = 8192;
/// Offset of the metadata block
pub const PPM_META_OFFSET: usize = 0x0010;
/// Offset of the animation header
pub const PPM_ANIMATION_HEADER_OFFSET: usize = 0x06A0;
/// Size of the sound header preceding the track data
pub const PPM_SOUND_HEADER_SIZE: usize = 32;
/// Signature length (RSA-1024)
pub const PPM_SIGNATURE_SIZE: usize = 128;
/// Framerate for each frame speed setting
pub const PPM_FRAMERATES: [f64; 9] = [0.5, 0.5, 1.0, 2.0, 4.0, 6.0, 12.0, 20.0, 30.0];

/// Frame palette: white, black, red, blue
pub const PPM_PALETTE: [Rgba; 4] = [
    Rgba::rgb(0xFF, 0xFF, 0xFF),
    Rgba::rgb(0x0E, 0x0E, 0x0E),
    Rgba::rgb(0xFF, 0x2A, 0x2A),
    Rgba::rgb(0x0A, 0x39, 0xFF),
];

const PPM_TRACKS: [AudioTrack; 4] = [
    AudioTrack::Bgm,
    AudioTrack::Se1,
    AudioTrack::Se2,
    AudioTrack::Se3,
];

/// Decoder for a PPM file resident in memory
#[derive(Debug)]
pub struct PpmDecoder<'a> {
    reader: ByteReader<'a>,
    meta: FlipnoteMeta,
    format_version: u16,
    frame_offsets: Vec<usize>,
    sound_flags_offset: usize,
    sound_header_offset: usize,
    tracks: [TrackSpan; 4],
    layer_buffers: [Vec<u8>; PPM_NUM_LAYERS],
    prev_layer_buffers: [Vec<u8>; PPM_NUM_LAYERS],
    last_decoded: Option<usize>,
}

/// `MMMMMM_XXXXXXXXXXXXX_NNN` from the 18-byte filename field
fn format_filename(bytes: &[u8]) -> String {
    let mac: String = bytes[0..3].iter().map(|b| format!("{b:02X}")).collect();
    let random: String = bytes[3..16].iter().map(|&b| b as char).collect();
    let edits = u16::from_le_bytes([bytes[16], bytes[17]]);
    format!("{mac}_{random}_{edits:03}")
}

fn author(name: String, fsid: String, filename: String) -> Author {
    Author {
        region: ppm_fsid_region(&fsid),
        name,
        fsid,
        filename,
    }
}

impl<'a> PpmDecoder<'a> {
    /// Parse the header, metadata, frame table and sound header
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        if reader.read_bytes(4).ok() != Some(b"PARA".as_slice()) {
            return Err(FlipnoteError::UnknownFormat);
        }
        let animation_data_size = reader.read_u32_le()? as usize;
        let _sound_data_size = reader.read_u32_le()?;
        let frame_count = reader.read_u16_le()? as usize + 1;
        let format_version = reader.read_u16_le()?;

        reader.seek_to(PPM_META_OFFSET)?;
        let lock = reader.read_u16_le()?;
        let thumb_index = reader.read_u16_le()? as usize;
        let root_name = reader.read_fixed_utf16(11)?;
        let parent_name = reader.read_fixed_utf16(11)?;
        let current_name = reader.read_fixed_utf16(11)?;
        let parent_fsid = reader.read_hex(8, true)?;
        let current_fsid = reader.read_hex(8, true)?;
        let parent_filename = format_filename(reader.read_bytes(18)?);
        let current_filename = format_filename(reader.read_bytes(18)?);
        let root_fsid = reader.read_hex(8, true)?;
        let root_fragment = reader.read_hex(8, false)?;
        let modified = NoteTimestamp(reader.read_u32_le()?);

        let is_spinoff = current_fsid != parent_fsid || current_fsid != root_fsid;
        let authors = AuthorChain {
            root: author(root_name, root_fsid, root_fragment),
            parent: author(parent_name, parent_fsid, parent_filename),
            current: author(current_name, current_fsid, current_filename),
        };

        // animation header
        reader.seek_to(PPM_ANIMATION_HEADER_OFFSET)?;
        let table_len = reader.read_u16_le()? as usize;
        reader.seek_to(PPM_ANIMATION_HEADER_OFFSET + 6)?;
        let animation_flags = reader.read_u16_le()?;
        if table_len / 4 < frame_count {
            return Err(FlipnoteError::MalformedContainer(format!(
                "frame table holds {} entries for {frame_count} frames",
                table_len / 4
            )));
        }
        let frame_data_base = PPM_ANIMATION_HEADER_OFFSET + 8 + table_len;
        let mut frame_offsets = Vec::with_capacity(frame_count);
        for i in 0..frame_count {
            let offset = frame_data_base + reader.read_u32_le()? as usize;
            if offset >= data.len() {
                return Err(FlipnoteError::MalformedContainer(format!(
                    "frame {i} offset 0x{offset:X} beyond end of file"
                )));
            }
            frame_offsets.push(offset);
        }

        // sound header
        let sound_flags_offset = PPM_ANIMATION_HEADER_OFFSET + animation_data_size;
        let sound_header_offset = (sound_flags_offset + frame_count).next_multiple_of(4);
        reader.seek_to(sound_header_offset)?;
        let mut lengths = [0usize; 4];
        for length in lengths.iter_mut() {
            *length = reader.read_u32_le()? as usize;
        }
        let frame_speed = Self::speed_from_raw(reader.read_u8()?, "frame")?;
        let bgm_speed = Self::speed_from_raw(reader.read_u8()?, "BGM")?;

        let mut tracks = [TrackSpan::default(); 4];
        let mut offset = sound_header_offset + PPM_SOUND_HEADER_SIZE;
        for (span, &length) in tracks.iter_mut().zip(lengths.iter()) {
            *span = TrackSpan { offset, length };
            offset += length;
        }
        if offset > data.len() {
            return Err(FlipnoteError::MalformedContainer(format!(
                "sound data ends at 0x{offset:X}, file is {} bytes",
                data.len()
            )));
        }

        let meta = FlipnoteMeta {
            lock: lock == 1,
            loop_playback: animation_flags & 0x2 != 0,
            is_spinoff,
            frame_count,
            frame_speed,
            bgm_speed,
            thumb_index,
            layer_visibility: [
                animation_flags & 0x10 == 0,
                animation_flags & 0x20 == 0,
                false,
            ],
            authors: Some(authors),
            created: None,
            modified: Some(modified),
            app_version: None,
        };

        tracing::debug!(
            frame_count,
            frame_speed,
            bgm_speed,
            format_version,
            "parsed PPM header"
        );

        Ok(PpmDecoder {
            reader,
            meta,
            format_version,
            frame_offsets,
            sound_flags_offset,
            sound_header_offset,
            tracks,
            layer_buffers: std::array::from_fn(|_| vec![0; PPM_WIDTH * PPM_HEIGHT]),
            prev_layer_buffers: std::array::from_fn(|_| vec![0; PPM_WIDTH * PPM_HEIGHT]),
            last_decoded: None,
        })
    }

    fn speed_from_raw(raw: u8, what: &str) -> Result<u8> {
        8u8.checked_sub(raw).ok_or_else(|| {
            FlipnoteError::MalformedContainer(format!("invalid {what} speed byte {raw}"))
        })
    }

    /// Format version word from the file header
    pub fn format_version(&self) -> u16 {
        self.format_version
    }

    /// Byte offset of each frame's data
    pub fn frame_offsets(&self) -> &[usize] {
        &self.frame_offsets
    }

    /// Byte range of a track, if the track exists in PPM
    pub fn track_span(&self, track: AudioTrack) -> Option<TrackSpan> {
        PPM_TRACKS
            .iter()
            .position(|&t| t == track)
            .map(|i| self.tracks[i])
    }

    fn check_frame(&self, index: usize) -> Result<()> {
        check_index("frame", index, self.meta.frame_count)
    }

    fn frame_header(&mut self, index: usize) -> Result<u8> {
        self.check_frame(index)?;
        self.reader.seek_to(self.frame_offsets[index])?;
        self.reader.read_u8()
    }

    fn sound_data_end(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.length)
            .sum::<usize>()
            + self.sound_header_offset
            + PPM_SOUND_HEADER_SIZE
    }
}

impl<'a> FlipnoteDecoder for PpmDecoder<'a> {
    fn format(&self) -> FlipnoteFormat {
        FlipnoteFormat::Ppm
    }

    fn width(&self) -> usize {
        PPM_WIDTH
    }

    fn height(&self) -> usize {
        PPM_HEIGHT
    }

    fn num_layers(&self) -> usize {
        PPM_NUM_LAYERS
    }

    fn colors_per_layer(&self) -> usize {
        PPM_COLORS_PER_LAYER
    }

    fn meta(&self) -> &FlipnoteMeta {
        &self.meta
    }

    fn framerate(&self) -> f64 {
        PPM_FRAMERATES[self.meta.frame_speed as usize]
    }

    fn bgm_framerate(&self) -> f64 {
        PPM_FRAMERATES[self.meta.bgm_speed as usize]
    }

    fn sample_rate(&self) -> u32 {
        PPM_AUDIO_SAMPLE_RATE
    }

    fn resample_mode(&self) -> ResampleMode {
        ResampleMode::Linear
    }

    fn halves_bgm_in_master_mix(&self) -> bool {
        true
    }

    fn global_palette(&self) -> &'static [Rgba] {
        &PPM_PALETTE
    }

    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        self.check_frame(index)?;
        if let Err(err) = self.decode_frame_chain(index) {
            // buffers may hold a half-decoded frame now
            self.last_decoded = None;
            return Err(err);
        }
        Ok(&self.layer_buffers)
    }

    fn frame_palette_indices(&mut self, index: usize) -> Result<Vec<u8>> {
        let header = self.frame_header(index)?;
        let inverted = header & 0x1 == 0;
        let pen = |value: u8| match value {
            2 => 2,
            3 => 3,
            _ if inverted => 0,
            _ => 1,
        };
        Ok(vec![
            if inverted { 1 } else { 0 },
            pen((header >> 1) & 0x3),
            pen((header >> 3) & 0x3),
        ])
    }

    fn layer_order(&mut self, index: usize) -> Result<Vec<usize>> {
        self.check_frame(index)?;
        Ok(vec![1, 0])
    }

    fn layer_depths(&mut self, index: usize) -> Result<Vec<u8>> {
        self.check_frame(index)?;
        Ok(vec![0; PPM_NUM_LAYERS])
    }

    fn camera_flags(&mut self, index: usize) -> Result<CameraFlags> {
        self.check_frame(index)?;
        Ok(CameraFlags::empty())
    }

    fn frame_author(&mut self, index: usize) -> Result<String> {
        self.check_frame(index)?;
        Ok(self
            .meta
            .authors
            .as_ref()
            .map(|a| a.current.fsid.clone())
            .unwrap_or_default())
    }

    fn sound_effect_flags(&mut self, index: usize) -> Result<SoundEffectFlags> {
        self.check_frame(index)?;
        self.reader.seek_to(self.sound_flags_offset + index)?;
        let byte = self.reader.read_u8()?;
        Ok(SoundEffectFlags::from_bits_truncate(byte & 0x7))
    }

    fn has_audio_track(&self, track: AudioTrack) -> bool {
        self.track_span(track).is_some_and(|span| span.length > 0)
    }

    fn decode_audio_track(&mut self, track: AudioTrack) -> Result<Vec<i16>> {
        let span = self
            .track_span(track)
            .filter(|span| span.length > 0)
            .ok_or(FlipnoteError::MissingTrack(track))?;
        self.reader.seek_to(span.offset)?;
        let bytes = self.reader.read_bytes(span.length)?;
        Ok(decode_ppm_adpcm(bytes))
    }

    fn signed_body(&self) -> Result<&[u8]> {
        let end = self.sound_data_end();
        self.reader.data().get(..end).ok_or_else(|| {
            FlipnoteError::MalformedContainer(format!("signed body end 0x{end:X} beyond file"))
        })
    }

    fn signature(&self) -> Result<&[u8]> {
        let start = self.sound_data_end();
        self.reader
            .data()
            .get(start..start + PPM_SIGNATURE_SIZE)
            .ok_or_else(|| FlipnoteError::MalformedContainer("PPM signature truncated".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_format() {
        let mut bytes = vec![0xF7, 0x8D, 0xA8];
        bytes.extend_from_slice(b"0D02B4CE33A6B");
        bytes.extend_from_slice(&7u16.to_le_bytes());
        assert_eq!(format_filename(&bytes), "F78DA8_0D02B4CE33A6B_007");
    }

    #[test]
    fn test_rejects_non_ppm() {
        assert!(matches!(
            PpmDecoder::new(b"KFH\x14\0\0\0\0"),
            Err(FlipnoteError::UnknownFormat)
        ));
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let mut data = b"PARA".to_vec();
        data.resize(0x40, 0);
        assert!(matches!(
            PpmDecoder::new(&data),
            Err(FlipnoteError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_speed_byte_is_inverted() {
        assert_eq!(PpmDecoder::speed_from_raw(0, "frame").unwrap(), 8);
        assert_eq!(PpmDecoder::speed_from_raw(8, "frame").unwrap(), 0);
        assert!(PpmDecoder::speed_from_raw(9, "frame").is_err());
    }
}

//! KWZ metadata: the `KFH` file header, `KMI` frame entries and the `KSN`
//! sound header

use super::sections::Section;
use super::KWZ_FRAMERATES;
use crate::error::{FlipnoteError, Result};
use crate::format::{
    Author, AuthorChain, CameraFlags, FlipnoteMeta, LayerMask, NoteTimestamp, SoundEffectFlags,
    TrackSpan,
};
use crate::fsid::{format_kwz_fsid, kwz_fsid_region};
use crate::reader::ByteReader;

/// Size of one `KMI` frame entry
pub const KWZ_FRAME_ENTRY_SIZE: usize = 28;
/// Offset of the frame count inside the `KFH` body (CRC included)
pub const KFH_QUICK_META_OFFSET: usize = 0xC4;
/// Size of the `KSN` header preceding the track data
pub const KSN_HEADER_SIZE: usize = 28;
/// Length of a stored FSID
pub const KWZ_FSID_SIZE: usize = 10;

/// One `KMI` entry describing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    /// Palette nibbles and per-layer keyframe bits
    pub flags: u32,
    /// Byte length of each layer's data in `KMC`
    pub layer_sizes: [u16; 3],
    /// FSID of the frame author
    pub author: [u8; KWZ_FSID_SIZE],
    /// 3D depth per layer
    pub layer_depths: [u8; 3],
    /// Sound effects starting on this frame
    pub sound_flags: u8,
    /// Layers holding a camera photo
    pub camera_flags: u8,
}

impl FrameEntry {
    /// Parse a 28-byte entry
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let flags = reader.read_u32_le()?;
        let mut layer_sizes = [0u16; 3];
        for size in layer_sizes.iter_mut() {
            *size = reader.read_u16_le()?;
        }
        let mut author = [0u8; KWZ_FSID_SIZE];
        author.copy_from_slice(reader.read_bytes(KWZ_FSID_SIZE)?);
        let mut layer_depths = [0u8; 3];
        layer_depths.copy_from_slice(reader.read_bytes(3)?);
        let sound_flags = reader.read_u8()?;
        reader.seek_to(0x1A)?;
        let camera_flags = reader.read_u8()?;
        Ok(FrameEntry {
            flags,
            layer_sizes,
            author,
            layer_depths,
            sound_flags,
            camera_flags,
        })
    }

    /// Layers that are stored as a diff against the previous frame
    pub fn diffing_layers(&self) -> LayerMask {
        LayerMask::from_bits_truncate(!(self.flags >> 4) as u8 & 0x7)
    }

    /// Paper, then two ink colours for each of layers A, B and C
    pub fn palette_indices(&self) -> Vec<u8> {
        [0, 8, 12, 16, 20, 24, 28]
            .iter()
            .map(|shift| ((self.flags >> shift) & 0xF) as u8)
            .collect()
    }

    /// Total bytes of layer data in `KMC`
    pub fn data_len(&self) -> usize {
        self.layer_sizes.iter().map(|&s| s as usize).sum()
    }

    /// Sound effects triggered on the frame
    pub fn sound_effects(&self) -> SoundEffectFlags {
        SoundEffectFlags::from_bits_truncate(self.sound_flags & 0xF)
    }

    /// Camera layers of the frame
    pub fn camera(&self) -> CameraFlags {
        CameraFlags::from_bits_truncate(self.camera_flags & 0x7)
    }
}

/// Fields stored at the end of the `KFH` body
struct PlaybackFields {
    frame_count: usize,
    thumb_index: usize,
    flags: u16,
    frame_speed: u8,
    layer_flags: u8,
}

fn read_playback_fields(reader: &mut ByteReader<'_>) -> Result<PlaybackFields> {
    let frame_count = reader.read_u16_le()? as usize;
    let thumb_index = reader.read_u16_le()? as usize;
    let flags = reader.read_u16_le()?;
    let frame_speed = reader.read_u8()?;
    let layer_flags = reader.read_u8()?;
    if frame_speed as usize >= KWZ_FRAMERATES.len() {
        return Err(FlipnoteError::MalformedContainer(format!(
            "invalid frame speed {frame_speed}"
        )));
    }
    Ok(PlaybackFields {
        frame_count,
        thumb_index,
        flags,
        frame_speed,
        layer_flags,
    })
}

fn meta_from_playback(fields: &PlaybackFields) -> FlipnoteMeta {
    FlipnoteMeta {
        lock: fields.flags & 0x1 != 0,
        loop_playback: fields.flags & 0x2 != 0,
        frame_count: fields.frame_count,
        frame_speed: fields.frame_speed,
        bgm_speed: fields.frame_speed,
        thumb_index: fields.thumb_index,
        layer_visibility: [
            fields.layer_flags & 0x1 == 0,
            fields.layer_flags & 0x2 == 0,
            fields.layer_flags & 0x4 == 0,
        ],
        ..FlipnoteMeta::default()
    }
}

/// Read only the playback fields of `KFH`
pub fn parse_quick_meta(reader: &mut ByteReader<'_>, kfh: Section) -> Result<FlipnoteMeta> {
    reader.seek_to(kfh.body_offset() + KFH_QUICK_META_OFFSET)?;
    let fields = read_playback_fields(reader)?;
    Ok(meta_from_playback(&fields))
}

/// Read the whole `KFH` body, author chain included
pub fn parse_full_meta(
    reader: &mut ByteReader<'_>,
    kfh: Section,
    dsi_library_note: bool,
) -> Result<FlipnoteMeta> {
    // skip the CRC
    reader.seek_to(kfh.body_offset() + 4)?;
    let created = NoteTimestamp(reader.read_u32_le()?);
    let modified = NoteTimestamp(reader.read_u32_le()?);
    let app_version = reader.read_u32_le()?;

    let mut fsids = Vec::with_capacity(3);
    for _ in 0..3 {
        fsids.push(format_kwz_fsid(
            reader.read_bytes(KWZ_FSID_SIZE)?,
            dsi_library_note,
        ));
    }
    let mut names = Vec::with_capacity(3);
    for _ in 0..3 {
        names.push(reader.read_fixed_utf16(11)?);
    }
    let mut filenames = Vec::with_capacity(3);
    for _ in 0..3 {
        filenames.push(reader.read_fixed_ascii(28)?);
    }
    let fields = read_playback_fields(reader)?;

    let mut authors = fsids
        .into_iter()
        .zip(names)
        .zip(filenames)
        .map(|((fsid, name), filename)| Author {
            region: kwz_fsid_region(&fsid, dsi_library_note),
            name,
            fsid,
            filename,
        });
    let (Some(root), Some(parent), Some(current)) =
        (authors.next(), authors.next(), authors.next())
    else {
        return Err("incomplete KFH author chain".into());
    };

    let is_spinoff = current.fsid != parent.fsid || current.fsid != root.fsid;
    Ok(FlipnoteMeta {
        is_spinoff,
        authors: Some(AuthorChain {
            root,
            parent,
            current,
        }),
        created: Some(created),
        modified: Some(modified),
        app_version: Some(app_version),
        ..meta_from_playback(&fields)
    })
}

/// Parsed `KSN` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundHeader {
    /// Frame speed the BGM was recorded at
    pub bgm_speed: u8,
    /// BGM, then SE1 to SE4
    pub tracks: [TrackSpan; 5],
}

/// Parse the `KSN` header and locate the tracks
pub fn parse_sound_header(reader: &mut ByteReader<'_>, ksn: Section) -> Result<SoundHeader> {
    reader.seek_to(ksn.body_offset())?;
    let bgm_speed = reader.read_u32_le()?;
    if bgm_speed as usize >= KWZ_FRAMERATES.len() {
        return Err(FlipnoteError::MalformedContainer(format!(
            "invalid BGM speed {bgm_speed}"
        )));
    }
    let mut lengths = [0usize; 5];
    for length in lengths.iter_mut() {
        *length = reader.read_u32_le()? as usize;
    }

    let mut tracks = [TrackSpan::default(); 5];
    let mut offset = ksn.body_offset() + KSN_HEADER_SIZE;
    for (span, &length) in tracks.iter_mut().zip(lengths.iter()) {
        *span = TrackSpan { offset, length };
        offset += length;
    }
    if offset > ksn.end() {
        return Err(FlipnoteError::MalformedContainer(format!(
            "KSN tracks end at 0x{offset:X}, section ends at 0x{:X}",
            ksn.end()
        )));
    }
    Ok(SoundHeader {
        bgm_speed: bgm_speed as u8,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; KWZ_FRAME_ENTRY_SIZE];
        bytes[0..4].copy_from_slice(&0x6543_2101u32.to_le_bytes());
        bytes[4..6].copy_from_slice(&38u16.to_le_bytes());
        bytes[6..8].copy_from_slice(&100u16.to_le_bytes());
        bytes[8..10].copy_from_slice(&200u16.to_le_bytes());
        bytes[0x0A] = 0xAB;
        bytes[0x14..0x17].copy_from_slice(&[3, 1, 2]);
        bytes[0x17] = 0x09;
        bytes[0x1A] = 0x02;
        bytes
    }

    #[test]
    fn test_frame_entry_fields() {
        let entry = FrameEntry::parse(&entry_bytes()).unwrap();
        assert_eq!(entry.layer_sizes, [38, 100, 200]);
        assert_eq!(entry.data_len(), 338);
        assert_eq!(entry.author[0], 0xAB);
        assert_eq!(entry.layer_depths, [3, 1, 2]);
        assert_eq!(entry.sound_effects(), SoundEffectFlags::SE1 | SoundEffectFlags::SE4);
        assert_eq!(entry.camera(), CameraFlags::LAYER_B);
    }

    #[test]
    fn test_palette_nibbles() {
        let entry = FrameEntry::parse(&entry_bytes()).unwrap();
        assert_eq!(entry.palette_indices(), vec![1, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_diffing_layers() {
        let mut bytes = entry_bytes();
        // bits 4-6 clear: every layer depends on the previous frame
        bytes[0] = 0x01;
        assert_eq!(FrameEntry::parse(&bytes).unwrap().diffing_layers(), LayerMask::all());
        // layer B is a keyframe
        bytes[0] = 0x21;
        assert_eq!(
            FrameEntry::parse(&bytes).unwrap().diffing_layers(),
            LayerMask::A | LayerMask::C
        );
        bytes[0] = 0x71;
        assert!(FrameEntry::parse(&bytes).unwrap().diffing_layers().is_empty());
    }

    #[test]
    fn test_short_entry_is_malformed() {
        assert!(FrameEntry::parse(&[0u8; 12]).is_err());
    }
}

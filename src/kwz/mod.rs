//! KWZ (Flipnote Studio 3D) decoder
//!
//! A KWZ file is a sequence of sections:
//! - `KFH`: file header (authors, timestamps, frame count and speed)
//! - `KTN`: JPEG thumbnail
//! - `KSN`: sound header and ADPCM tracks
//! - `KMI`: one 28-byte entry per frame
//! - `KMC`: tile bitstreams for every frame layer
//! - `KIC`: replaces `KFH` in folder icons
//!
//! followed by a 256-byte RSA-2048/SHA-256 signature.

mod audio;
mod frame;
pub mod meta;
pub mod sections;
pub mod tables;

pub use frame::{decode_layer_tiles, DecodeStats, KWZ_UNCHANGED_LAYER_SIZE};
pub use meta::{FrameEntry, SoundHeader};
pub use sections::{Section, SectionMap};

use serde::{Deserialize, Serialize};

use crate::audio::adpcm::decode_kwz_adpcm;
use crate::audio::pcm::ResampleMode;
use crate::decoder::FlipnoteDecoder;
use crate::error::{check_index, FlipnoteError, Result};
use crate::format::{
    AudioTrack, CameraFlags, FlipnoteFormat, FlipnoteMeta, ImageRect, LayerMask, Rgba,
    SoundEffectFlags,
};
use crate::fsid::format_kwz_fsid;
use crate::reader::ByteReader;
use meta::KWZ_FRAME_ENTRY_SIZE;
use sections::KWZ_SIGNATURE_SIZE;

/// Frame width in pixels
pub const KWZ_WIDTH: usize = 320;
/// Frame height in pixels
pub const KWZ_HEIGHT: usize = 240;
/// Layers per frame
pub const KWZ_NUM_LAYERS: usize = 3;
/// Ink colours per layer
pub const KWZ_COLORS_PER_LAYER: usize = 2;
/// Audio sample rate in Hz
pub const KWZ_AUDIO_SAMPLE_RATE: u32 = 16364;
/// Pixels removed from each edge when `border_crop` is set
pub const KWZ_BORDER_CROP: usize = 5;
/// Visible size of a folder icon
pub const KWZ_FOLDER_ICON_SIZE: usize = 24;
/// Framerate for each frame speed setting
pub const KWZ_FRAMERATES: [f64; 11] = [0.2, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 12.0, 20.0, 24.0, 30.0];

/// Global palette: white, black, red, yellow, green, blue, transparent
pub const KWZ_PALETTE: [Rgba; 7] = [
    Rgba::rgb(0xFF, 0xFF, 0xFF),
    Rgba::rgb(0x10, 0x10, 0x10),
    Rgba::rgb(0xFF, 0x10, 0x10),
    Rgba::rgb(0xFF, 0xE7, 0x00),
    Rgba::rgb(0x00, 0x86, 0x31),
    Rgba::rgb(0x00, 0x38, 0xCE),
    Rgba([0xFF, 0xFF, 0xFF, 0x00]),
];

/// Options applied when opening a KWZ file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KwzSettings {
    /// Read only the playback fields of the file header
    pub quick_meta: bool,
    /// Note was converted from a PPM by the DSi Library service
    pub dsi_library_note: bool,
    /// Hide the 5-pixel border around the frame
    pub border_crop: bool,
    /// Recover the BGM's initial step index when none is given
    pub guess_initial_bgm_state: bool,
    /// Initial BGM predictor
    pub initial_bgm_predictor: Option<i32>,
    /// Initial BGM step index
    pub initial_bgm_step_index: Option<u8>,
    /// Initial predictor for SE1 to SE4
    pub initial_se_predictors: Option<[i32; 4]>,
    /// Initial step index for SE1 to SE4
    pub initial_se_step_indices: Option<[u8; 4]>,
}

/// What kind of file the sections describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KwzKind {
    /// Regular animation
    Note,
    /// Single-frame folder icon (`KIC` section)
    FolderIcon,
    /// Single-frame handwritten comment (no `KSN` section)
    Comment,
}

/// Decoder for a KWZ file resident in memory
#[derive(Debug)]
pub struct KwzDecoder<'a> {
    reader: ByteReader<'a>,
    settings: KwzSettings,
    sections: SectionMap,
    kind: KwzKind,
    meta: FlipnoteMeta,
    frame_entries_offset: usize,
    frame_data_offsets: Vec<usize>,
    sound: Option<SoundHeader>,
    layer_buffers: [Vec<u8>; KWZ_NUM_LAYERS],
    last_decoded: Option<usize>,
    last_mask: LayerMask,
    stats: DecodeStats,
}

impl<'a> KwzDecoder<'a> {
    /// Scan the sections and parse metadata, frame table and sound header
    pub fn new(data: &'a [u8], settings: KwzSettings) -> Result<Self> {
        if FlipnoteFormat::detect(data) != Some(FlipnoteFormat::Kwz) {
            return Err(FlipnoteError::UnknownFormat);
        }
        let mut reader = ByteReader::new(data);
        let sections = SectionMap::scan(&mut reader)?;

        let kind = if sections.contains("KIC") {
            KwzKind::FolderIcon
        } else if !sections.contains("KSN") {
            KwzKind::Comment
        } else {
            KwzKind::Note
        };

        let mut meta = match sections.get("KFH") {
            Some(kfh) if settings.quick_meta => meta::parse_quick_meta(&mut reader, kfh)?,
            Some(kfh) => meta::parse_full_meta(&mut reader, kfh, settings.dsi_library_note)?,
            None => FlipnoteMeta {
                frame_count: 1,
                layer_visibility: [true; 3],
                ..FlipnoteMeta::default()
            },
        };
        match kind {
            KwzKind::FolderIcon => {
                meta.frame_count = 1;
                meta.frame_speed = 0;
                meta.bgm_speed = 0;
            }
            KwzKind::Comment => meta.frame_count = 1,
            KwzKind::Note => {}
        }

        let sound = match sections.get("KSN") {
            Some(ksn) => Some(meta::parse_sound_header(&mut reader, ksn)?),
            None => None,
        };
        if let Some(sound) = &sound {
            meta.bgm_speed = sound.bgm_speed;
        }

        let kmi = sections.require("KMI")?;
        let kmc = sections.require("KMC")?;
        let frame_count = meta.frame_count;
        if kmi.length / KWZ_FRAME_ENTRY_SIZE < frame_count {
            return Err(FlipnoteError::MalformedContainer(format!(
                "KMI holds {} entries for {frame_count} frames",
                kmi.length / KWZ_FRAME_ENTRY_SIZE
            )));
        }

        let frame_entries_offset = kmi.body_offset();
        let mut frame_data_offsets = Vec::with_capacity(frame_count);
        let mut ptr = kmc.body_offset() + 4;
        for i in 0..frame_count {
            frame_data_offsets.push(ptr);
            let start = frame_entries_offset + i * KWZ_FRAME_ENTRY_SIZE;
            ptr += FrameEntry::parse(&data[start..start + KWZ_FRAME_ENTRY_SIZE])?.data_len();
        }
        if ptr > kmc.end() {
            return Err(FlipnoteError::MalformedContainer(format!(
                "frame data ends at 0x{ptr:X}, KMC ends at 0x{:X}",
                kmc.end()
            )));
        }

        tracing::debug!(
            ?kind,
            frame_count,
            frame_speed = meta.frame_speed,
            bgm_speed = meta.bgm_speed,
            "parsed KWZ header"
        );

        Ok(KwzDecoder {
            reader,
            settings,
            sections,
            kind,
            meta,
            frame_entries_offset,
            frame_data_offsets,
            sound,
            layer_buffers: std::array::from_fn(|_| vec![0; KWZ_WIDTH * KWZ_HEIGHT]),
            last_decoded: None,
            last_mask: LayerMask::empty(),
            stats: DecodeStats::default(),
        })
    }

    /// Settings the decoder was opened with
    pub fn settings(&self) -> &KwzSettings {
        &self.settings
    }

    /// File subtype
    pub fn kind(&self) -> KwzKind {
        self.kind
    }

    /// Section map
    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    /// Work counters since construction or the last [`KwzDecoder::reset_stats`]
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Zero the work counters
    pub fn reset_stats(&mut self) {
        self.stats = DecodeStats::default();
    }

    /// Parsed `KSN` header, absent for comments and folder icons
    pub fn sound_header(&self) -> Option<&SoundHeader> {
        self.sound.as_ref()
    }

    /// JPEG bytes of the `KTN` thumbnail
    pub fn thumbnail_jpeg(&self) -> Option<&'a [u8]> {
        let ktn = self.sections.get("KTN")?;
        // body starts with a CRC
        self.reader.data().get(ktn.body_offset() + 4..ktn.end())
    }

    /// The `KMI` entry of frame `index`
    pub fn frame_entry(&self, index: usize) -> Result<FrameEntry> {
        self.check_frame(index)?;
        let start = self.frame_entries_offset + index * KWZ_FRAME_ENTRY_SIZE;
        let bytes = self
            .reader
            .data()
            .get(start..start + KWZ_FRAME_ENTRY_SIZE)
            .ok_or_else(|| {
                FlipnoteError::MalformedContainer(format!("frame {index} entry truncated"))
            })?;
        FrameEntry::parse(bytes)
    }

    fn check_frame(&self, index: usize) -> Result<()> {
        check_index("frame", index, self.meta.frame_count)
    }
}

impl<'a> FlipnoteDecoder for KwzDecoder<'a> {
    fn format(&self) -> FlipnoteFormat {
        FlipnoteFormat::Kwz
    }

    fn width(&self) -> usize {
        KWZ_WIDTH
    }

    fn height(&self) -> usize {
        KWZ_HEIGHT
    }

    fn num_layers(&self) -> usize {
        KWZ_NUM_LAYERS
    }

    fn colors_per_layer(&self) -> usize {
        KWZ_COLORS_PER_LAYER
    }

    fn image_rect(&self) -> ImageRect {
        if self.kind == KwzKind::FolderIcon {
            ImageRect {
                x: 0,
                y: 0,
                width: KWZ_FOLDER_ICON_SIZE,
                height: KWZ_FOLDER_ICON_SIZE,
            }
        } else if self.settings.border_crop {
            ImageRect {
                x: KWZ_BORDER_CROP,
                y: KWZ_BORDER_CROP,
                width: KWZ_WIDTH - 2 * KWZ_BORDER_CROP,
                height: KWZ_HEIGHT - 2 * KWZ_BORDER_CROP,
            }
        } else {
            ImageRect {
                x: 0,
                y: 0,
                width: KWZ_WIDTH,
                height: KWZ_HEIGHT,
            }
        }
    }

    fn meta(&self) -> &FlipnoteMeta {
        &self.meta
    }

    fn framerate(&self) -> f64 {
        KWZ_FRAMERATES[self.meta.frame_speed as usize]
    }

    fn bgm_framerate(&self) -> f64 {
        KWZ_FRAMERATES[self.meta.bgm_speed as usize]
    }

    fn sample_rate(&self) -> u32 {
        KWZ_AUDIO_SAMPLE_RATE
    }

    fn resample_mode(&self) -> ResampleMode {
        ResampleMode::NearestNeighbor
    }

    fn halves_bgm_in_master_mix(&self) -> bool {
        false
    }

    fn global_palette(&self) -> &'static [Rgba] {
        &KWZ_PALETTE
    }

    fn decode_frame(&mut self, index: usize) -> Result<&[Vec<u8>]> {
        self.decode_frame_layers(index, LayerMask::all())
    }

    fn frame_palette_indices(&mut self, index: usize) -> Result<Vec<u8>> {
        Ok(self.frame_entry(index)?.palette_indices())
    }

    fn layer_order(&mut self, index: usize) -> Result<Vec<usize>> {
        let depths = self.frame_entry(index)?.layer_depths;
        let mut order: Vec<usize> = (0..KWZ_NUM_LAYERS).collect();
        // deepest layer first; sort_by is stable so ties keep index order
        order.sort_by(|&a, &b| depths[b].cmp(&depths[a]));
        Ok(order)
    }

    fn layer_depths(&mut self, index: usize) -> Result<Vec<u8>> {
        Ok(self.frame_entry(index)?.layer_depths.to_vec())
    }

    fn camera_flags(&mut self, index: usize) -> Result<CameraFlags> {
        Ok(self.frame_entry(index)?.camera())
    }

    fn frame_author(&mut self, index: usize) -> Result<String> {
        let entry = self.frame_entry(index)?;
        Ok(format_kwz_fsid(&entry.author, self.settings.dsi_library_note))
    }

    fn sound_effect_flags(&mut self, index: usize) -> Result<SoundEffectFlags> {
        Ok(self.frame_entry(index)?.sound_effects())
    }

    fn has_audio_track(&self, track: AudioTrack) -> bool {
        self.sound
            .as_ref()
            .is_some_and(|sound| sound.tracks[track.index()].length > 0)
    }

    fn decode_audio_track(&mut self, track: AudioTrack) -> Result<Vec<i16>> {
        let span = self
            .sound
            .as_ref()
            .map(|sound| sound.tracks[track.index()])
            .filter(|span| span.length > 0)
            .ok_or(FlipnoteError::MissingTrack(track))?;
        self.reader.seek_to(span.offset)?;
        let bytes = self.reader.read_bytes(span.length)?;
        let state = audio::initial_state(&self.settings, track, bytes);
        Ok(decode_kwz_adpcm(bytes, state))
    }

    fn signed_body(&self) -> Result<&[u8]> {
        Ok(&self.reader.data()[..self.sections.body_end()])
    }

    fn signature(&self) -> Result<&[u8]> {
        let start = self.sections.body_end();
        self.reader
            .data()
            .get(start..start + KWZ_SIGNATURE_SIZE)
            .ok_or_else(|| FlipnoteError::MalformedContainer("KWZ signature truncated".into()))
    }
}

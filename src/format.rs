//! Types shared by the PPM and KWZ decoders
//!
//! Format detection, audio track identifiers, per-frame flag sets, palette
//! colours and the metadata record handed to UI collaborators.

use bitflags::bitflags;
use serde::Serialize;

use crate::fsid::Region;

/// Container format of a Flipnote buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlipnoteFormat {
    /// Flipnote Studio (DSiWare) animation
    Ppm,
    /// Flipnote Studio 3D animation
    Kwz,
}

impl FlipnoteFormat {
    /// Detect the format from magic bytes.
    ///
    /// PPM files start with `PARA`; KWZ files start with a `KFH` or `KIC`
    /// section tag followed by its 32-bit length field.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() >= 4 && &data[0..4] == b"PARA" {
            return Some(FlipnoteFormat::Ppm);
        }
        if data.len() >= 8 && (&data[0..3] == b"KFH" || &data[0..3] == b"KIC") {
            return Some(FlipnoteFormat::Kwz);
        }
        None
    }

    /// Short lowercase name, also used as a file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            FlipnoteFormat::Ppm => "ppm",
            FlipnoteFormat::Kwz => "kwz",
        }
    }
}

/// Audio track identifier. PPM notes only carry BGM and SE1-SE3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AudioTrack {
    /// Background music
    Bgm,
    /// Sound effect 1
    Se1,
    /// Sound effect 2
    Se2,
    /// Sound effect 3
    Se3,
    /// Sound effect 4 (KWZ only)
    Se4,
}

impl AudioTrack {
    /// All tracks in storage order
    pub const ALL: [AudioTrack; 5] = [
        AudioTrack::Bgm,
        AudioTrack::Se1,
        AudioTrack::Se2,
        AudioTrack::Se3,
        AudioTrack::Se4,
    ];

    /// Position in storage order (BGM = 0)
    pub fn index(&self) -> usize {
        match self {
            AudioTrack::Bgm => 0,
            AudioTrack::Se1 => 1,
            AudioTrack::Se2 => 2,
            AudioTrack::Se3 => 3,
            AudioTrack::Se4 => 4,
        }
    }

    /// Sound effect slot (0-based) or `None` for BGM
    pub fn effect_slot(&self) -> Option<usize> {
        self.index().checked_sub(1)
    }

    /// Matching per-frame usage flag, `None` for BGM
    pub fn effect_flag(&self) -> Option<SoundEffectFlags> {
        match self {
            AudioTrack::Bgm => None,
            AudioTrack::Se1 => Some(SoundEffectFlags::SE1),
            AudioTrack::Se2 => Some(SoundEffectFlags::SE2),
            AudioTrack::Se3 => Some(SoundEffectFlags::SE3),
            AudioTrack::Se4 => Some(SoundEffectFlags::SE4),
        }
    }

    /// Parse `bgm`, `se1` .. `se4`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bgm" => Some(AudioTrack::Bgm),
            "se1" => Some(AudioTrack::Se1),
            "se2" => Some(AudioTrack::Se2),
            "se3" => Some(AudioTrack::Se3),
            "se4" => Some(AudioTrack::Se4),
            _ => None,
        }
    }
}

bitflags! {
    /// Sound effects triggered on a frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SoundEffectFlags: u8 {
        /// Sound effect 1 starts on this frame
        const SE1 = 0x01;
        /// Sound effect 2 starts on this frame
        const SE2 = 0x02;
        /// Sound effect 3 starts on this frame
        const SE3 = 0x04;
        /// Sound effect 4 starts on this frame (KWZ only)
        const SE4 = 0x08;
    }
}

bitflags! {
    /// Layers of a KWZ frame that contain a camera photo
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CameraFlags: u8 {
        /// Layer A
        const LAYER_A = 0x01;
        /// Layer B
        const LAYER_B = 0x02;
        /// Layer C
        const LAYER_C = 0x04;
    }
}

bitflags! {
    /// Selection of KWZ layers to decode
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerMask: u8 {
        /// Layer A
        const A = 0x01;
        /// Layer B
        const B = 0x02;
        /// Layer C
        const C = 0x04;
    }
}

impl LayerMask {
    /// Mask with only `layer` set
    pub fn layer(layer: usize) -> Self {
        LayerMask::from_bits_truncate(1 << layer)
    }

    /// True when `layer` is selected
    pub fn has_layer(&self, layer: usize) -> bool {
        self.contains(LayerMask::layer(layer))
    }
}

/// RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    /// Opaque colour from RGB components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Rgba([r, g, b, 0xFF])
    }
}

/// Visible sub-rectangle of the full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageRect {
    /// Left edge within the frame
    pub x: usize,
    /// Top edge within the frame
    pub y: usize,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

/// Byte range of one audio track inside the file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackSpan {
    /// Start offset
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
}

/// Seconds elapsed since 2000-01-01 00:00:00, as stored by both formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct NoteTimestamp(pub u32);

impl NoteTimestamp {
    /// Offset between the Nintendo epoch and the Unix epoch
    pub const UNIX_EPOCH_OFFSET: u64 = 946_684_800;

    /// Seconds since 1970-01-01 UTC
    pub fn unix_seconds(&self) -> u64 {
        self.0 as u64 + Self::UNIX_EPOCH_OFFSET
    }
}

/// One link of the author chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Author {
    /// Display name
    pub name: String,
    /// Flipnote Studio ID
    pub fsid: String,
    /// Region guessed from the FSID
    pub region: Region,
    /// Filename (or filename fragment for the PPM root author)
    pub filename: String,
}

/// Root, parent and current author of a note
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorChain {
    /// Original author of the first version
    pub root: Author,
    /// Author of the version this note was edited from
    pub parent: Author,
    /// Author of this version
    pub current: Author,
}

/// Metadata record exposed to UI collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlipnoteMeta {
    /// Note is locked against editing
    pub lock: bool,
    /// Playback loops
    pub loop_playback: bool,
    /// Note was edited by someone other than its original author
    pub is_spinoff: bool,
    /// Number of frames
    pub frame_count: usize,
    /// In-app frame speed setting
    pub frame_speed: u8,
    /// Frame speed at which the BGM was recorded
    pub bgm_speed: u8,
    /// Frame used as the thumbnail
    pub thumb_index: usize,
    /// Per-layer visibility
    pub layer_visibility: [bool; 3],
    /// Author chain; `None` when decoded in quick mode
    pub authors: Option<AuthorChain>,
    /// Creation time (KWZ only)
    pub created: Option<NoteTimestamp>,
    /// Last modification time
    pub modified: Option<NoteTimestamp>,
    /// Application version that saved the note (KWZ only)
    pub app_version: Option<u32>,
}

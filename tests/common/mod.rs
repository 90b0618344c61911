//! Synthetic PPM and KWZ files for integration tests
#![allow(dead_code)]

pub const PPM_PIXELS: usize = 256 * 192;
pub const KWZ_PIXELS: usize = 320 * 240;
pub const KWZ_TILES: u32 = 40 * 30;

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn utf16_field(text: &str, units: usize) -> Vec<u8> {
    let mut out: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    out.resize(units * 2, 0);
    out
}

fn ascii_field(text: &str, len: usize) -> Vec<u8> {
    let mut out = text.as_bytes().to_vec();
    out.resize(len, 0);
    out
}

/// LSB-first writer producing 16-bit little-endian words
pub struct BitWriter {
    words: Vec<u16>,
    acc: u32,
    used: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter {
            words: Vec::new(),
            acc: 0,
            used: 0,
        }
    }

    pub fn write(&mut self, value: u32, n: u32) {
        self.acc |= value << self.used;
        self.used += n;
        while self.used >= 16 {
            self.words.push(self.acc as u16);
            self.acc >>= 16;
            self.used -= 16;
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.words.push(self.acc as u16);
        }
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

// ---------------------------------------------------------------------------
// PPM

/// Encode a frame from two 256x192 bitmaps, storing non-empty lines raw
pub fn ppm_frame(header: u8, translation: Option<(i8, i8)>, layers: [&[u8]; 2]) -> Vec<u8> {
    let mut out = vec![if translation.is_some() {
        header | 0x20
    } else {
        header
    }];
    if let Some((dx, dy)) = translation {
        out.push(dx as u8);
        out.push(dy as u8);
    }
    let mut data = Vec::new();
    for layer in layers {
        let mut encoding = [0u8; 48];
        for (y, line) in layer.chunks_exact(256).enumerate() {
            if line.iter().all(|&p| p == 0) {
                continue;
            }
            encoding[y >> 2] |= 3 << ((y & 3) * 2);
            for chunk in line.chunks_exact(8) {
                let byte = chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (bit, &p)| acc | ((p & 1) << bit));
                data.push(byte);
            }
        }
        out.extend_from_slice(&encoding);
    }
    out.extend(data);
    out
}

/// Empty keyframe with the given header bits
pub fn ppm_blank_frame(header: u8) -> Vec<u8> {
    let blank = vec![0u8; PPM_PIXELS];
    ppm_frame(header | 0x80, None, [&blank, &blank])
}

pub struct PpmBuilder {
    pub frames: Vec<Vec<u8>>,
    pub sound_flags: Vec<u8>,
    pub tracks: [Vec<u8>; 4],
    pub frame_speed: u8,
    pub bgm_speed: u8,
    pub lock: bool,
    pub animation_flags: u16,
    pub root_fsid: [u8; 8],
    pub parent_fsid: [u8; 8],
    pub current_fsid: [u8; 8],
    pub current_name: String,
    pub timestamp: u32,
}

impl Default for PpmBuilder {
    fn default() -> Self {
        let fsid = [0x1D, 0x6C, 0x3A, 0x0F, 0xE0, 0xF3, 0x40, 0x14];
        PpmBuilder {
            frames: Vec::new(),
            sound_flags: Vec::new(),
            tracks: Default::default(),
            frame_speed: 8,
            bgm_speed: 8,
            lock: false,
            animation_flags: 0,
            root_fsid: fsid,
            parent_fsid: fsid,
            current_fsid: fsid,
            current_name: "current".to_string(),
            timestamp: 0x1F2E_3D4C,
        }
    }
}

impl PpmBuilder {
    pub fn frame(mut self, frame: Vec<u8>) -> Self {
        self.frames.push(frame);
        self
    }

    fn filename(edits: u16) -> Vec<u8> {
        let mut out = vec![0xF7, 0x8D, 0xA8];
        out.extend_from_slice(b"0D02B4CE33A6B");
        out.extend_from_slice(&edits.to_le_bytes());
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let frame_count = self.frames.len();
        assert!(frame_count > 0, "a PPM needs at least one frame");

        let mut out = vec![0u8; 0x6A0];
        out[0..4].copy_from_slice(b"PARA");
        put_u16(&mut out, 0x0C, (frame_count - 1) as u16);
        put_u16(&mut out, 0x0E, 0x24);

        put_u16(&mut out, 0x10, self.lock as u16);
        out[0x14..0x2A].copy_from_slice(&utf16_field("root", 11));
        out[0x2A..0x40].copy_from_slice(&utf16_field("parent", 11));
        out[0x40..0x56].copy_from_slice(&utf16_field(&self.current_name, 11));
        out[0x56..0x5E].copy_from_slice(&self.parent_fsid);
        out[0x5E..0x66].copy_from_slice(&self.current_fsid);
        out[0x66..0x78].copy_from_slice(&Self::filename(1));
        out[0x78..0x8A].copy_from_slice(&Self::filename(2));
        out[0x8A..0x92].copy_from_slice(&self.root_fsid);
        out[0x92..0x9A].copy_from_slice(&[0xF7, 0x8D, 0xA8, 0x30, 0x44, 0x30, 0x32, 0x42]);
        put_u32(&mut out, 0x9A, self.timestamp);

        let table_len = frame_count * 4;
        let mut animation = Vec::new();
        animation.extend_from_slice(&(table_len as u16).to_le_bytes());
        animation.extend_from_slice(&[0; 4]);
        animation.extend_from_slice(&self.animation_flags.to_le_bytes());
        let mut offset = 0u32;
        for frame in &self.frames {
            animation.extend_from_slice(&offset.to_le_bytes());
            offset += frame.len() as u32;
        }
        for frame in &self.frames {
            animation.extend_from_slice(frame);
        }
        put_u32(&mut out, 0x04, animation.len() as u32);
        out.extend(animation);

        let mut sound_flags = self.sound_flags.clone();
        sound_flags.resize(frame_count, 0);
        out.extend(sound_flags);
        while out.len() % 4 != 0 {
            out.push(0);
        }

        for track in &self.tracks {
            out.extend_from_slice(&(track.len() as u32).to_le_bytes());
        }
        out.push(8 - self.frame_speed);
        out.push(8 - self.bgm_speed);
        out.extend_from_slice(&[0; 14]);
        let sound_size: usize = self.tracks.iter().map(Vec::len).sum();
        put_u32(&mut out, 0x08, sound_size as u32);
        for track in &self.tracks {
            out.extend_from_slice(track);
        }

        // signature and padding
        out.extend_from_slice(&[0; 128 + 16]);
        out
    }
}

// ---------------------------------------------------------------------------
// KWZ

/// Layer whose 38 bytes mark it as identical to the previous frame
pub fn kwz_unchanged_layer() -> Vec<u8> {
    let mut layer = vec![0xFD; 37];
    layer.push(0x7D);
    layer
}

/// Layer filling every tile with one common line
pub fn kwz_fill_layer(common_index: u8) -> Vec<u8> {
    vec![common_index << 3; KWZ_TILES as usize]
}

pub struct KwzFrame {
    pub flags: u32,
    pub layers: [Vec<u8>; 3],
    pub depths: [u8; 3],
    pub sound_flags: u8,
    pub camera_flags: u8,
    pub author: [u8; 10],
}

impl KwzFrame {
    pub fn new(flags: u32, layers: [Vec<u8>; 3]) -> Self {
        KwzFrame {
            flags,
            layers,
            depths: [0; 3],
            sound_flags: 0,
            camera_flags: 0,
            author: [0x14, 0xE4, 0x94, 0xE6, 0xE6, 0xF5, 0xFD, 0xD9, 0x11, 0x00],
        }
    }

    fn entry(&self) -> Vec<u8> {
        let mut out = vec![0u8; 28];
        put_u32(&mut out, 0, self.flags);
        for (i, layer) in self.layers.iter().enumerate() {
            put_u16(&mut out, 4 + i * 2, layer.len() as u16);
        }
        out[0x0A..0x14].copy_from_slice(&self.author);
        out[0x14..0x17].copy_from_slice(&self.depths);
        out[0x17] = self.sound_flags;
        out[0x1A] = self.camera_flags;
        out
    }
}

pub struct KwzBuilder {
    pub frames: Vec<KwzFrame>,
    pub frame_speed: u8,
    pub bgm_speed: u32,
    pub flags: u16,
    pub layer_flags: u8,
    /// `None` leaves out `KSN`, making the file a comment
    pub tracks: Option<[Vec<u8>; 5]>,
    pub folder_icon: bool,
    pub include_kmi: bool,
    pub thumbnail: Option<Vec<u8>>,
    pub fsids: [[u8; 10]; 3],
    pub names: [String; 3],
    pub filenames: [String; 3],
    pub created: u32,
    pub modified: u32,
    pub app_version: u32,
}

impl Default for KwzBuilder {
    fn default() -> Self {
        let fsid = [0x14, 0xE4, 0x94, 0xE6, 0xE6, 0xF5, 0xFD, 0xD9, 0x11, 0x00];
        KwzBuilder {
            frames: Vec::new(),
            frame_speed: 10,
            bgm_speed: 10,
            flags: 0,
            layer_flags: 0,
            tracks: Some(Default::default()),
            folder_icon: false,
            include_kmi: true,
            thumbnail: None,
            fsids: [fsid; 3],
            names: ["root".into(), "parent".into(), "current".into()],
            filenames: [
                "czcWFOPGK3WE0CUKS4PBMJ5SSxx".into(),
                "czcWFOPGK3WE0CUKS4PBMJ5SSyy".into(),
                "czcWFOPGK3WE0CUKS4PBMJ5SSzz".into(),
            ],
            created: 0x2000_0000,
            modified: 0x2000_1000,
            app_version: 0x0002_0000,
        }
    }
}

fn section(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

impl KwzBuilder {
    pub fn frame(mut self, frame: KwzFrame) -> Self {
        self.frames.push(frame);
        self
    }

    fn header_body(&self) -> Vec<u8> {
        let mut body = vec![0u8; 4];
        body.extend_from_slice(&self.created.to_le_bytes());
        body.extend_from_slice(&self.modified.to_le_bytes());
        body.extend_from_slice(&self.app_version.to_le_bytes());
        for fsid in &self.fsids {
            body.extend_from_slice(fsid);
        }
        for name in &self.names {
            body.extend(utf16_field(name, 11));
        }
        for filename in &self.filenames {
            body.extend(ascii_field(filename, 28));
        }
        body.extend_from_slice(&(self.frames.len() as u16).to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&self.flags.to_le_bytes());
        body.push(self.frame_speed);
        body.push(self.layer_flags);
        body
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.folder_icon {
            out.extend(section(b"KIC\x01", &[0; 12]));
        } else {
            out.extend(section(b"KFH\x14", &self.header_body()));
        }
        if let Some(jpeg) = &self.thumbnail {
            let mut body = vec![0u8; 4];
            body.extend_from_slice(jpeg);
            out.extend(section(b"KTN\x02", &body));
        }
        if let Some(tracks) = &self.tracks {
            let mut body = self.bgm_speed.to_le_bytes().to_vec();
            for track in tracks {
                body.extend_from_slice(&(track.len() as u32).to_le_bytes());
            }
            body.extend_from_slice(&[0; 4]);
            for track in tracks {
                body.extend_from_slice(track);
            }
            out.extend(section(b"KSN\x01", &body));
        }
        if self.include_kmi {
            let entries: Vec<u8> = self.frames.iter().flat_map(KwzFrame::entry).collect();
            out.extend(section(b"KMI\x05", &entries));
        }
        let mut frame_data = vec![0u8; 4];
        for frame in &self.frames {
            for layer in &frame.layers {
                frame_data.extend_from_slice(layer);
            }
        }
        out.extend(section(b"KMC\x02", &frame_data));

        out.extend_from_slice(&[0; 256]);
        out
    }
}

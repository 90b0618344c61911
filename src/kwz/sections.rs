//! KWZ section map
//!
//! A KWZ file is a run of sections, each a 4-byte tag (only the first three
//! characters are meaningful) and a little-endian `u32` body length, followed
//! by a 256-byte signature.

use crate::error::{FlipnoteError, Result};
use crate::reader::ByteReader;

/// Most sections a file may carry
pub const KWZ_MAX_SECTIONS: usize = 6;
/// Size of a section header (tag + length)
pub const KWZ_SECTION_HEADER_SIZE: usize = 8;
/// Signature length (RSA-2048)
pub const KWZ_SIGNATURE_SIZE: usize = 256;

/// Location of one section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Offset of the section header
    pub offset: usize,
    /// Body length, excluding the 8-byte header
    pub length: usize,
}

impl Section {
    /// Offset of the first body byte
    pub fn body_offset(&self) -> usize {
        self.offset + KWZ_SECTION_HEADER_SIZE
    }

    /// Offset one past the last body byte
    pub fn end(&self) -> usize {
        self.body_offset() + self.length
    }
}

/// Sections of a KWZ file in file order
#[derive(Debug, Clone, Default)]
pub struct SectionMap {
    sections: Vec<(String, Section)>,
    body_end: usize,
}

impl SectionMap {
    /// Walk the section headers from offset 0.
    ///
    /// Stops after [`KWZ_MAX_SECTIONS`] or once the cursor reaches the
    /// signature area. `KMC` and `KMI` must both be present.
    pub fn scan(reader: &mut ByteReader<'_>) -> Result<Self> {
        let file_len = reader.len();
        let limit = file_len.saturating_sub(KWZ_SIGNATURE_SIZE);
        let mut map = SectionMap::default();
        let mut ptr = 0;

        while map.sections.len() < KWZ_MAX_SECTIONS && ptr < limit {
            reader.seek_to(ptr)?;
            let tag = reader.read_bytes(4)?;
            let tag = String::from_utf8_lossy(&tag[..3]).into_owned();
            let length = reader.read_u32_le()? as usize;
            let section = Section {
                offset: ptr,
                length,
            };
            if section.end() > file_len {
                return Err(FlipnoteError::MalformedContainer(format!(
                    "section {tag} at 0x{ptr:X} runs past end of file"
                )));
            }
            tracing::debug!(%tag, offset = ptr, length, "found section");
            map.sections.push((tag, section));
            ptr = section.end();
        }

        map.body_end = ptr;
        map.require("KMC")?;
        map.require("KMI")?;
        Ok(map)
    }

    /// Look up a section by its three-letter tag
    pub fn get(&self, tag: &str) -> Option<Section> {
        self.sections
            .iter()
            .find(|(t, _)| t == tag)
            .map(|&(_, section)| section)
    }

    /// Like [`SectionMap::get`], failing when the section is absent
    pub fn require(&self, tag: &str) -> Result<Section> {
        self.get(tag).ok_or_else(|| {
            FlipnoteError::MalformedContainer(format!("missing mandatory {tag} section"))
        })
    }

    /// True when the section is present
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Tags in file order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(tag, _)| tag.as_str())
    }

    /// End of the last scanned section, where the signed body stops
    pub fn body_end(&self) -> usize {
        self.body_end
    }
}

//! MP4 box types and per-track state.

use super::sample_table::SampleTableBuilder;
use trackmap_media::StreamKind;

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const UDTA: Self = Self(*b"udta");
    /// QuickTime `©nam` (title).
    pub const NAME: Self = Self([0xA9, b'n', b'a', b'm']);
    /// QuickTime `©too` (encoding tool).
    pub const TOOL: Self = Self([0xA9, b't', b'o', b'o']);

    pub fn from_id(id: u32) -> Self {
        Self(id.to_be_bytes())
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Whether the box holds child boxes the demuxer walks.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            Self::MOOV | Self::TRAK | Self::MDIA | Self::MINF | Self::STBL | Self::UDTA
        )
    }

    /// Display name used in element traces.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::FTYP => "FileType",
            Self::MOOV => "Movie",
            Self::MDAT => "MediaData",
            Self::MVHD => "MovieHeader",
            Self::TRAK => "Track",
            Self::TKHD => "TrackHeader",
            Self::MDIA => "Media",
            Self::MDHD => "MediaHeader",
            Self::HDLR => "Handler",
            Self::MINF => "MediaInformation",
            Self::STBL => "SampleTable",
            Self::STSD => "SampleDescription",
            Self::STTS => "TimeToSample",
            Self::STSS => "SyncSample",
            Self::STSC => "SampleToChunk",
            Self::STSZ => "SampleSize",
            Self::STCO => "ChunkOffset",
            Self::CO64 => "ChunkOffset64",
            Self::CTTS => "CompositionOffset",
            Self::FREE | Self::SKIP => "Free",
            Self::UDTA => "UserData",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Text,
    Subtitle,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"text" | b"sbtl" => Self::Text,
            b"subt" | b"clcp" => Self::Subtitle,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn stream_kind(&self) -> StreamKind {
        match self {
            Self::Video => StreamKind::Video,
            Self::Audio => StreamKind::Audio,
            Self::Text | Self::Subtitle => StreamKind::Subtitle,
            Self::Unknown(_) => StreamKind::Other,
        }
    }
}

/// Track information gathered while walking a `trak` box.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub track_id: u32,
    pub handler_type: HandlerType,
    /// Track duration in media timescale.
    pub duration: u64,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// ISO 639-2/T language from mdhd.
    pub language: Option<String>,
    /// Sample entry FourCC of the first sample description.
    pub codec: Option<[u8; 4]>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bits_per_sample: Option<u16>,
    pub samples: SampleTableBuilder,
}

impl TrackInfo {
    pub fn new() -> Self {
        Self {
            track_id: 0,
            handler_type: HandlerType::Unknown([0; 4]),
            duration: 0,
            timescale: 0,
            language: None,
            codec: None,
            width: None,
            height: None,
            sample_rate: None,
            channels: None,
            bits_per_sample: None,
            samples: SampleTableBuilder::new(),
        }
    }

    /// Convert a media-timescale value to microseconds.
    pub fn to_micros(&self, ticks: u64) -> i64 {
        if self.timescale == 0 {
            return 0;
        }
        (ticks as u128 * 1_000_000 / self.timescale as u128) as i64
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 * 1000.0 / self.timescale as f64
        }
    }
}

impl Default for TrackInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a packed ISO 639-2/T code (three 5-bit letters offset by 0x60).
pub fn unpack_language(packed: u16) -> Option<String> {
    let letters = [(packed >> 10) & 0x1F, (packed >> 5) & 0x1F, packed & 0x1F];
    if letters.iter().any(|&l| l == 0) {
        return None;
    }
    let code: String = letters.iter().map(|&l| (l as u8 + 0x60) as char).collect();
    (code != "und").then_some(code)
}

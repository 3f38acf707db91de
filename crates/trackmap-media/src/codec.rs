//! Codec identities and tag lookup tables.
//!
//! Containers identify codecs in three ways: a FourCC (MP4 sample entries,
//! AVI stream handlers), a TwoCC (WAVE format tags) or a Matroska CodecID
//! string. [`CodecLookup`] maps any of them to a [`Codec`].

use std::fmt;

/// Resolved codec identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Codec {
    #[default]
    Unknown,

    // Uncompressed / lightly compressed audio
    Lpcm,
    LogPcm,
    Dpcm,
    Adpcm,

    // Lossless audio
    Flac,
    Alac,

    // Lossy audio
    MpegL1,
    MpegL2,
    MpegL3,
    Aac,
    Ac3,
    Eac3,
    TrueHd,
    Dts,
    Vorbis,
    Opus,
    Wma,

    // Video
    Mpeg1,
    Mpeg2,
    Mpeg4Asp,
    H263,
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Theora,
    Vc1,
    Mjpeg,
    ProRes,

    // Subtitles
    Srt,
    Ssa,
    Ass,
    WebVtt,
    Pgs,
    VobSub,
    DvbSub,
}

impl Codec {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Whether sample sizes are fixed by channel count and bit depth.
    pub fn is_pcm_family(&self) -> bool {
        matches!(self, Self::Lpcm | Self::LogPcm | Self::Dpcm | Self::Adpcm)
    }

    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Lpcm => "PCM",
            Self::LogPcm => "LogPCM",
            Self::Dpcm => "DPCM",
            Self::Adpcm => "ADPCM",
            Self::Flac => "FLAC",
            Self::Alac => "ALAC",
            Self::MpegL1 => "MP1",
            Self::MpegL2 => "MP2",
            Self::MpegL3 => "MP3",
            Self::Aac => "AAC",
            Self::Ac3 => "AC-3",
            Self::Eac3 => "E-AC-3",
            Self::TrueHd => "TrueHD",
            Self::Dts => "DTS",
            Self::Vorbis => "Vorbis",
            Self::Opus => "Opus",
            Self::Wma => "WMA",
            Self::Mpeg1 => "MPEG-1",
            Self::Mpeg2 => "MPEG-2",
            Self::Mpeg4Asp => "MPEG-4",
            Self::H263 => "H.263",
            Self::H264 => "AVC",
            Self::H265 => "HEVC",
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
            Self::Theora => "Theora",
            Self::Vc1 => "VC-1",
            Self::Mjpeg => "MJPEG",
            Self::ProRes => "ProRes",
            Self::Srt => "SRT",
            Self::Ssa => "SSA",
            Self::Ass => "ASS",
            Self::WebVtt => "WebVTT",
            Self::Pgs => "PGS",
            Self::VobSub => "VobSub",
            Self::DvbSub => "DVB Subtitle",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codec identifier as found in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CodecTag {
    /// Four-character code.
    FourCc([u8; 4]),
    /// WAVE format tag.
    TwoCc(u16),
    /// Matroska CodecID string (e.g. `V_MPEG4/ISO/AVC`).
    Matroska(String),
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FourCc(cc) => write!(f, "{}", String::from_utf8_lossy(cc)),
            Self::TwoCc(tag) => write!(f, "0x{:04X}", tag),
            Self::Matroska(id) => f.write_str(id),
        }
    }
}

/// Maps container codec tags to codec identities.
pub trait CodecLookup {
    /// Resolve a tag, returning [`Codec::Unknown`] when the tag is not known.
    fn resolve(&self, tag: &CodecTag) -> Codec;
}

/// Lookup backed by the built-in FourCC, TwoCC and Matroska tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodecTable;

impl CodecLookup for BuiltinCodecTable {
    fn resolve(&self, tag: &CodecTag) -> Codec {
        match tag {
            CodecTag::FourCc(cc) => codec_from_fourcc(*cc),
            CodecTag::TwoCc(tag) => codec_from_twocc(*tag),
            CodecTag::Matroska(id) => codec_from_matroska_id(id),
        }
    }
}

/// Resolve a FourCC.
pub fn codec_from_fourcc(cc: [u8; 4]) -> Codec {
    match &cc {
        // Video
        b"avc1" | b"avc3" | b"H264" | b"h264" | b"X264" | b"x264" => Codec::H264,
        b"hvc1" | b"hev1" | b"HEVC" | b"hevc" | b"H265" => Codec::H265,
        b"mp4v" | b"XVID" | b"xvid" | b"DIVX" | b"divx" | b"DX50" | b"FMP4" => Codec::Mpeg4Asp,
        b"mp1v" | b"MPG1" => Codec::Mpeg1,
        b"mp2v" | b"MPG2" | b"mpg2" => Codec::Mpeg2,
        b"s263" | b"H263" | b"h263" => Codec::H263,
        b"vp08" | b"VP80" => Codec::Vp8,
        b"vp09" | b"VP90" => Codec::Vp9,
        b"av01" | b"AV01" => Codec::Av1,
        b"WVC1" | b"wvc1" | b"vc-1" => Codec::Vc1,
        b"mjpg" | b"MJPG" | b"jpeg" | b"mjpa" => Codec::Mjpeg,
        b"apch" | b"apcn" | b"apcs" | b"apco" | b"ap4h" | b"ap4x" => Codec::ProRes,
        b"theo" | b"THEO" => Codec::Theora,

        // Audio
        b"mp4a" => Codec::Aac,
        b"ac-3" | b"sac3" => Codec::Ac3,
        b"ec-3" => Codec::Eac3,
        b"mlpa" => Codec::TrueHd,
        b"dtsc" | b"dtsh" | b"dtsl" => Codec::Dts,
        b"Opus" | b"opus" => Codec::Opus,
        b"fLaC" => Codec::Flac,
        b"alac" => Codec::Alac,
        b".mp3" => Codec::MpegL3,
        b"lpcm" | b"sowt" | b"twos" | b"in24" | b"in32" | b"fl32" | b"fl64" | b"raw " => {
            Codec::Lpcm
        }
        b"alaw" | b"ulaw" => Codec::LogPcm,
        b"ima4" => Codec::Adpcm,

        // Subtitles
        b"wvtt" => Codec::WebVtt,

        _ => Codec::Unknown,
    }
}

/// Resolve a WAVE format tag.
pub fn codec_from_twocc(tag: u16) -> Codec {
    match tag {
        0x0001 | 0x0003 => Codec::Lpcm,
        0x0006 | 0x0007 => Codec::LogPcm,
        0x0002 | 0x0011 | 0x0069 => Codec::Adpcm,
        0x0050 => Codec::MpegL2,
        0x0055 => Codec::MpegL3,
        0x00FF | 0x1600 | 0x1610 => Codec::Aac,
        0x0160..=0x0163 => Codec::Wma,
        0x2000 => Codec::Ac3,
        0x2001 => Codec::Dts,
        0x566F => Codec::Vorbis,
        0x704F => Codec::Opus,
        0xF1AC => Codec::Flac,
        _ => Codec::Unknown,
    }
}

/// Resolve a Matroska CodecID.
pub fn codec_from_matroska_id(codec_id: &str) -> Codec {
    match codec_id {
        // Video codecs
        "V_MPEG4/ISO/AVC" => Codec::H264,
        "V_MPEGH/ISO/HEVC" => Codec::H265,
        "V_AV1" => Codec::Av1,
        "V_VP8" => Codec::Vp8,
        "V_VP9" => Codec::Vp9,
        "V_MPEG1" => Codec::Mpeg1,
        "V_MPEG2" => Codec::Mpeg2,
        "V_MPEG4/ISO/SP" | "V_MPEG4/ISO/ASP" | "V_MPEG4/ISO/AP" => Codec::Mpeg4Asp,
        "V_THEORA" => Codec::Theora,
        "V_MJPEG" => Codec::Mjpeg,
        "V_PRORES" => Codec::ProRes,

        // Audio codecs
        "A_AC3" => Codec::Ac3,
        "A_EAC3" => Codec::Eac3,
        "A_TRUEHD" => Codec::TrueHd,
        "A_FLAC" => Codec::Flac,
        "A_ALAC" => Codec::Alac,
        "A_VORBIS" => Codec::Vorbis,
        "A_OPUS" => Codec::Opus,
        "A_PCM/INT/LIT" | "A_PCM/INT/BIG" | "A_PCM/FLOAT/IEEE" => Codec::Lpcm,
        "A_MPEG/L3" => Codec::MpegL3,
        "A_MPEG/L2" => Codec::MpegL2,
        "A_MPEG/L1" => Codec::MpegL1,

        // Subtitle codecs
        "S_TEXT/UTF8" => Codec::Srt,
        "S_TEXT/SSA" => Codec::Ssa,
        "S_TEXT/ASS" => Codec::Ass,
        "S_TEXT/WEBVTT" => Codec::WebVtt,
        "S_HDMV/PGS" => Codec::Pgs,
        "S_VOBSUB" => Codec::VobSub,
        "S_DVBSUB" => Codec::DvbSub,

        other if other.starts_with("A_AAC") => Codec::Aac,
        other if other.starts_with("A_DTS") => Codec::Dts,
        _ => Codec::Unknown,
    }
}

//! Matroska element ids used by the demuxer.

pub const EBML: u32 = 0x1A45_DFA3;
pub const DOC_TYPE: u32 = 0x4282;
pub const SEGMENT: u32 = 0x1853_8067;
pub const SEEK_HEAD: u32 = 0x114D_9B74;
pub const VOID: u32 = 0xEC;
pub const CRC32: u32 = 0xBF;

// Segment information
pub const INFO: u32 = 0x1549_A966;
pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub const DURATION: u32 = 0x4489;
pub const DATE_UTC: u32 = 0x4461;
pub const TITLE: u32 = 0x7BA9;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;

// Tracks
pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const FLAG_DEFAULT: u32 = 0x88;
pub const FLAG_FORCED: u32 = 0x55AA;
pub const DEFAULT_DURATION: u32 = 0x23_E383;
pub const NAME: u32 = 0x536E;
pub const LANGUAGE: u32 = 0x22_B59C;
pub const CODEC_ID: u32 = 0x86;
pub const CODEC_PRIVATE: u32 = 0x63A2;
pub const CODEC_NAME: u32 = 0x25_8688;

pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;
pub const DISPLAY_WIDTH: u32 = 0x54B0;
pub const DISPLAY_HEIGHT: u32 = 0x54BA;

pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;
pub const BIT_DEPTH: u32 = 0x6264;

// Clusters
pub const CLUSTER: u32 = 0x1F43_B675;
pub const TIMECODE: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;
pub const BLOCK_GROUP: u32 = 0xA0;
pub const BLOCK: u32 = 0xA1;
pub const REFERENCE_BLOCK: u32 = 0xFB;

// Level 1 elements the demuxer skips
pub const CUES: u32 = 0x1C53_BB6B;
pub const CHAPTERS: u32 = 0x1043_A770;
pub const TAGS: u32 = 0x1254_C367;
pub const ATTACHMENTS: u32 = 0x1941_A469;

/// Track types of the TrackType element.
pub const TRACK_TYPE_VIDEO: u64 = 0x01;
pub const TRACK_TYPE_AUDIO: u64 = 0x02;
pub const TRACK_TYPE_SUBTITLE: u64 = 0x11;

/// Dictionary name of an element id.
pub fn element_name(id: u32) -> Option<&'static str> {
    let name = match id {
        EBML => "EBML",
        DOC_TYPE => "DocType",
        SEGMENT => "Segment",
        SEEK_HEAD => "SeekHead",
        VOID => "Void",
        CRC32 => "CRC-32",
        INFO => "Info",
        TIMECODE_SCALE => "TimecodeScale",
        DURATION => "Duration",
        DATE_UTC => "DateUTC",
        TITLE => "Title",
        MUXING_APP => "MuxingApp",
        WRITING_APP => "WritingApp",
        TRACKS => "Tracks",
        TRACK_ENTRY => "TrackEntry",
        TRACK_NUMBER => "TrackNumber",
        TRACK_UID => "TrackUID",
        TRACK_TYPE => "TrackType",
        FLAG_DEFAULT => "FlagDefault",
        FLAG_FORCED => "FlagForced",
        DEFAULT_DURATION => "DefaultDuration",
        NAME => "Name",
        LANGUAGE => "Language",
        CODEC_ID => "CodecID",
        CODEC_PRIVATE => "CodecPrivate",
        CODEC_NAME => "CodecName",
        VIDEO => "Video",
        PIXEL_WIDTH => "PixelWidth",
        PIXEL_HEIGHT => "PixelHeight",
        DISPLAY_WIDTH => "DisplayWidth",
        DISPLAY_HEIGHT => "DisplayHeight",
        AUDIO => "Audio",
        SAMPLING_FREQUENCY => "SamplingFrequency",
        CHANNELS => "Channels",
        BIT_DEPTH => "BitDepth",
        CLUSTER => "Cluster",
        TIMECODE => "Timecode",
        SIMPLE_BLOCK => "SimpleBlock",
        BLOCK_GROUP => "BlockGroup",
        BLOCK => "Block",
        REFERENCE_BLOCK => "ReferenceBlock",
        CUES => "Cues",
        CHAPTERS => "Chapters",
        TAGS => "Tags",
        ATTACHMENTS => "Attachments",
        _ => return None,
    };
    Some(name)
}

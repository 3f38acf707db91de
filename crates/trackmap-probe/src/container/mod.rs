//! Container format detection and demuxing

pub mod mkv;
pub mod mp4;
pub mod wave;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use trackmap_media::{BitstreamReader, Container, MediaFile, TraceSink, WalkStats};

use crate::error::ProbeError;
use crate::ProbeOptions;

/// Detect container format from file magic bytes
pub fn detect_container(path: &Path) -> Result<Container, ProbeError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProbeError::FileNotFound(path.to_path_buf())
        } else {
            ProbeError::Io(e)
        }
    })?;

    let mut reader = BufReader::new(file);
    detect_container_from_reader(&mut reader)
}

/// Detect container format from a reader
///
/// The reader is rewound to its start afterwards.
pub fn detect_container_from_reader<R: Read + Seek>(
    reader: &mut R,
) -> Result<Container, ProbeError> {
    let mut magic = Vec::with_capacity(12);
    reader.rewind()?;
    reader.by_ref().take(12).read_to_end(&mut magic)?;
    reader.rewind()?;

    if magic.len() < 4 {
        return Err(ProbeError::UnsupportedContainer(format!(
            "{} bytes are too short to identify",
            magic.len()
        )));
    }

    // Matroska/WebM start with the EBML header id
    if magic[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Ok(Container::Matroska);
    }

    if magic.len() >= 12 && &magic[0..4] == b"RIFF" && &magic[8..12] == b"WAVE" {
        return Ok(Container::Wave);
    }

    // ISO BMFF: a box type at offset 4, usually 'ftyp' but 'moov' first is legal
    if magic.len() >= 8 && matches!(&magic[4..8], b"ftyp" | b"moov" | b"mdat" | b"free" | b"wide")
    {
        return Ok(Container::Mp4);
    }

    Err(ProbeError::UnsupportedContainer(
        "Unable to detect container format from magic bytes".to_string(),
    ))
}

/// Get container type from file extension (fallback)
pub fn container_from_extension(path: &Path) -> Option<Container> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "mkv" | "webm" | "mka" | "mk3d" | "mks" => Some(Container::Matroska),
        "mp4" | "m4v" | "m4a" | "mov" | "3gp" | "3g2" => Some(Container::Mp4),
        "wav" | "wave" => Some(Container::Wave),
        _ => None,
    }
}

/// Walk `reader` with the front-end for `container`, filling `media`.
pub fn demux<R: Read + Seek>(
    container: Container,
    reader: &mut BitstreamReader<'_, R>,
    media: &mut MediaFile,
    options: &ProbeOptions,
    sink: &mut dyn TraceSink,
) -> trackmap_media::Result<WalkStats> {
    match container {
        Container::Matroska => mkv::demux(reader, media, options, sink),
        Container::Mp4 => mp4::demux(reader, media, options, sink),
        Container::Wave => wave::demux(reader, media, options, sink),
    }
}

/// Cooperative cancellation shared by the format visitors.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Option<Arc<AtomicBool>>);

impl CancelFlag {
    pub(crate) fn new(flag: Option<Arc<AtomicBool>>) -> Self {
        Self(flag)
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn detect(data: &[u8]) -> Result<Container, ProbeError> {
        detect_container_from_reader(&mut Cursor::new(data.to_vec()))
    }

    #[test]
    fn test_detect_by_magic() {
        assert_eq!(
            detect(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81, 0x01]).unwrap(),
            Container::Matroska
        );
        assert_eq!(
            detect(b"RIFF\x24\x00\x00\x00WAVEfmt ").unwrap(),
            Container::Wave
        );
        assert_eq!(
            detect(b"\x00\x00\x00\x18ftypisom").unwrap(),
            Container::Mp4
        );
        assert_eq!(
            detect(b"\x00\x00\x00\x08moov").unwrap(),
            Container::Mp4
        );
    }

    #[test]
    fn test_detect_rejects_unknown_and_short() {
        assert!(matches!(
            detect(b"RIFF\x24\x00\x00\x00AVI LIST"),
            Err(ProbeError::UnsupportedContainer(_))
        ));
        assert!(matches!(
            detect(b"ab"),
            Err(ProbeError::UnsupportedContainer(_))
        ));
    }

    #[test]
    fn test_detect_rewinds() {
        let mut cursor = Cursor::new(b"RIFF\x24\x00\x00\x00WAVE".to_vec());
        cursor.set_position(6);
        detect_container_from_reader(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            container_from_extension(Path::new("a/b.MKV")),
            Some(Container::Matroska)
        );
        assert_eq!(
            container_from_extension(Path::new("song.wav")),
            Some(Container::Wave)
        );
        assert_eq!(
            container_from_extension(Path::new("clip.mov")),
            Some(Container::Mp4)
        );
        assert_eq!(container_from_extension(Path::new("notes.txt")), None);
        assert_eq!(container_from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_cancel_flag() {
        assert!(!CancelFlag::default().is_set());
        let flag = Arc::new(AtomicBool::new(false));
        let cancel = CancelFlag::new(Some(flag.clone()));
        assert!(!cancel.is_set());
        flag.store(true, Ordering::Relaxed);
        assert!(cancel.is_set());
    }
}

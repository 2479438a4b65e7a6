//! Endianness-aware primitive reads and writes over in-memory buffers.
//!
//! Both the cube and the scan path codecs parse complete byte buffers, so the
//! reader never touches a stream: a failed parse leaves nothing half consumed.
//! Files are persisted through [`write_atomic`], which writes next to the
//! destination and renames into place once every byte is on disk;
//! [`write_atomic_all`] does the same for files that must change together.

use crate::enums::Endian;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unexpected end of data at offset {offset}: needed {needed} more bytes")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("invalid UTF-8 text at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("text of {len} bytes does not fit a 16-bit length prefix")]
    TextTooLong { len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! read_primitive {
    ($name:ident, $ty:ty, $size:expr) => {
        pub fn $name(&mut self) -> Result<$ty, ResourceError> {
            let bytes = self.take($size)?;
            Ok(match self.endian {
                Endian::Little => LittleEndian::$name(bytes),
                Endian::Big => BigEndian::$name(bytes),
            })
        }
    };
}

macro_rules! write_primitive {
    ($name:ident, $ty:ty, $size:expr) => {
        pub fn $name(&mut self, value: $ty) {
            let mut bytes = [0u8; $size];
            match self.endian {
                Endian::Little => LittleEndian::$name(&mut bytes, value),
                Endian::Big => BigEndian::$name(&mut bytes, value),
            }
            self.buffer.extend_from_slice(&bytes);
        }
    };
}

/// Cursor over a borrowed byte buffer.
pub struct ResourceReader<'a> {
    bytes: &'a [u8],
    position: usize,
    endian: Endian,
}

impl<'a> ResourceReader<'a> {
    pub fn new(bytes: &'a [u8], endian: Endian) -> Self {
        Self {
            bytes,
            position: 0,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Switch byte order, e.g. once a header flag has been decoded.
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ResourceError> {
        if self.remaining() < len {
            return Err(ResourceError::UnexpectedEof {
                offset: self.position,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Everything not consumed yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.position..];
        self.position = self.bytes.len();
        slice
    }

    pub fn read_u8(&mut self) -> Result<u8, ResourceError> {
        Ok(self.take(1)?[0])
    }

    read_primitive!(read_u16, u16, 2);
    read_primitive!(read_u32, u32, 4);
    read_primitive!(read_f64, f64, 8);

    /// Reads a UTF-8 string preceded by its `u16` byte length.
    pub fn read_text(&mut self) -> Result<String, ResourceError> {
        let len = self.read_u16()? as usize;
        let offset = self.position;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ResourceError::InvalidUtf8 { offset })
    }
}

/// Growable output buffer with a fixed byte order.
pub struct ResourceWriter {
    buffer: Vec<u8>,
    endian: Endian,
}

impl ResourceWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            buffer: Vec::new(),
            endian,
        }
    }

    pub fn with_capacity(endian: Endian, capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    write_primitive!(write_u16, u16, 2);
    write_primitive!(write_u32, u32, 4);
    write_primitive!(write_f64, f64, 8);

    pub fn write_text(&mut self, text: &str) -> Result<(), ResourceError> {
        let len = u16::try_from(text.len())
            .map_err(|_| ResourceError::TextTooLong { len: text.len() })?;
        self.write_u16(len);
        self.write_bytes(text.as_bytes());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Complete temporary copy of `bytes` next to `path`, not yet renamed.
fn stage(path: &Path, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new_in(parent_dir(path))?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}

/// Writes `bytes` to `path` so that the file only appears once complete.
///
/// The data goes to a temporary file in the destination directory first and is
/// renamed over `path` afterwards. On any error the previous content of `path`
/// is left untouched.
pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), ResourceError> {
    let path = path.as_ref();
    let file = stage(path, bytes)?;
    file.persist(path).map_err(|err| ResourceError::Io(err.error))?;

    log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Replaces several files as one unit.
///
/// Every file is staged completely before any destination changes. Existing
/// destinations are then moved aside, the staged files renamed into place,
/// and on any failure the moved-aside files are put back, so either all
/// destinations hold the new content or all keep the old one.
pub fn write_atomic_all(files: &[(&Path, &[u8])]) -> Result<(), ResourceError> {
    let staged = files
        .iter()
        .map(|(path, bytes)| stage(path, bytes))
        .collect::<std::io::Result<Vec<_>>>()?;

    let mut moved: Vec<(&Path, Option<TempPath>)> = Vec::with_capacity(files.len());
    for &(path, _) in files {
        match set_aside(path) {
            Ok(backup) => moved.push((path, backup)),
            Err(err) => {
                restore(&mut moved);
                return Err(err.into());
            }
        }
    }

    for (file, (path, _)) in staged.into_iter().zip(files) {
        if let Err(err) = file.persist(path) {
            restore(&mut moved);
            return Err(err.error.into());
        }
    }

    for (path, bytes) in files {
        log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    }
    Ok(())
}

/// Moves an existing `path` to a temporary name in the same directory.
fn set_aside(path: &Path) -> std::io::Result<Option<TempPath>> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }
    let backup = tempfile::Builder::new()
        .prefix(".backup")
        .tempfile_in(parent_dir(path))?
        .into_temp_path();
    fs::rename(path, &backup)?;
    Ok(Some(backup))
}

fn restore(moved: &mut Vec<(&Path, Option<TempPath>)>) {
    while let Some((path, backup)) = moved.pop() {
        let result = match &backup {
            Some(backup) => fs::rename(backup, path),
            None => match fs::remove_file(path) {
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(err) = result {
            log::error!("could not restore {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_follow_declared_order() {
        let mut writer = ResourceWriter::new(Endian::Big);
        writer.write_u16(0x0102);
        writer.write_u32(0x0304_0506);
        assert_eq!(writer.into_inner(), vec![1, 2, 3, 4, 5, 6]);

        let mut writer = ResourceWriter::new(Endian::Little);
        writer.write_u16(0x0102);
        assert_eq!(writer.into_inner(), vec![2, 1]);
    }

    #[test]
    fn test_reader_reports_offset_on_eof() {
        let bytes = [0u8; 3];
        let mut reader = ResourceReader::new(&bytes, Endian::Little);
        reader.read_u16().unwrap();
        match reader.read_u32() {
            Err(ResourceError::UnexpectedEof { offset, needed }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 3);
            }
            other => panic!("expected eof, got {:?}", other),
        }
    }

    #[test]
    fn test_text_roundtrip() {
        let mut writer = ResourceWriter::new(Endian::Big);
        writer.write_text("Anonymous^Patient").unwrap();
        writer.write_f64(-12.5);
        let bytes = writer.into_inner();

        let mut reader = ResourceReader::new(&bytes, Endian::Big);
        assert_eq!(reader.read_text().unwrap(), "Anonymous^Patient");
        assert_eq!(reader.read_f64().unwrap(), -12.5);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_all_keeps_old_files_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("pair.dat");
        let header = dir.path().join("pair.hdr");
        std::fs::write(&data, b"old data").unwrap();
        std::fs::create_dir(&header).unwrap();

        let result = write_atomic_all(&[(data.as_path(), &b"new data"[..]), (header.as_path(), &b"new header"[..])]);
        assert!(matches!(result, Err(ResourceError::Io(_))));
        assert_eq!(std::fs::read(&data).unwrap(), b"old data");
        assert!(header.is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_write_atomic_all_replaces_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        std::fs::write(&first, b"1").unwrap();

        write_atomic_all(&[(first.as_path(), &b"one"[..]), (second.as_path(), &b"two"[..])]).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}

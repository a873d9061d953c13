//! Hand-rolled streaming ZIP writer for `.mcpr` replay archives.
//!
//! Grounded directly in the original `ZeptoZip.cpp`: local file headers are
//! written with placeholder CRC-32/size fields, the compressed entry is
//! streamed straight to the output, and the header is patched by seeking
//! back once the entry's true size and checksum are known. CRC-32 itself
//! uses `crc32fast` rather than a hand-written table (see `DESIGN.md`); the
//! container format — headers, seek-and-patch, central directory, EOCD — is
//! still purpose-built, since no ZIP-writer crate appears anywhere in the
//! retrieval pack.

use std::io::{Seek, SeekFrom, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{RelayError, Result};

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const VERSION_NEEDED: u16 = 20;
const METHOD_DEFLATE: u16 = 8;

/// Fixed-size portion of a local file header, before the filename.
const LOCAL_HEADER_FIXED_LEN: u64 = 30;
/// Byte offset of the CRC-32 field within a local file header.
const LOCAL_HEADER_CRC_OFFSET: u64 = 14;

/// DOS date/time pair, packed per the format `DosTime.hpp` computes.
fn dos_date_time() -> (u16, u16) {
    let now = time::OffsetDateTime::now_utc();
    let time = ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    let year = now.year().clamp(1980, 2107) as u16;
    let month = u8::from(now.month()) as u16;
    let date = ((year - 1980) << 9) | (month << 5) | (now.day() as u16);
    (time, date)
}

struct CentralDirectoryEntry {
    name: String,
    header_offset: u32,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    dos_time: u16,
    dos_date: u16,
}

struct OpenEntry<W: Write + Seek> {
    name: String,
    header_offset: u64,
    data_offset: u64,
    crc_hasher: crc32fast::Hasher,
    uncompressed_size: u64,
    dos_time: u16,
    dos_date: u16,
    encoder: DeflateEncoder<W>,
}

/// A streaming ZIP archive writer. Call [`ZipWriter::start_file`], one or
/// more [`ZipWriter::write_all`]s, then [`ZipWriter::finish_file`] for each
/// entry, and [`ZipWriter::finish`] once at the end.
pub struct ZipWriter<W: Write + Seek> {
    inner: Option<W>,
    entries: Vec<CentralDirectoryEntry>,
    open: Option<OpenEntry<W>>,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(writer: W) -> Self {
        ZipWriter {
            inner: Some(writer),
            entries: Vec::new(),
            open: None,
        }
    }

    /// Opens a new deflate-compressed entry named `name`. Only one entry
    /// may be open at a time.
    pub fn start_file(&mut self, name: &str) -> Result<()> {
        if self.open.is_some() {
            return Err(RelayError::Archive(format!(
                "cannot start {name}: another entry is still open"
            )));
        }

        let mut writer = self
            .inner
            .take()
            .ok_or_else(|| RelayError::Archive("zip writer already finished".into()))?;

        let header_offset = writer.stream_position()?;
        let (dos_time, dos_date) = dos_date_time();
        write_local_file_header_placeholder(&mut writer, name, dos_time, dos_date)?;
        let data_offset = writer.stream_position()?;

        self.open = Some(OpenEntry {
            name: name.to_string(),
            header_offset,
            data_offset,
            crc_hasher: crc32fast::Hasher::new(),
            uncompressed_size: 0,
            dos_time,
            dos_date,
            encoder: DeflateEncoder::new(writer, Compression::default()),
        });
        Ok(())
    }

    /// Feeds more bytes into the currently open entry.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .open
            .as_mut()
            .ok_or_else(|| RelayError::Archive("no entry open".into()))?;
        entry.crc_hasher.update(data);
        entry.uncompressed_size += data.len() as u64;
        entry.encoder.write_all(data)?;
        Ok(())
    }

    /// Flushes the compressor, seeks back to patch the local file header's
    /// CRC-32 and size fields, then records the entry for the central
    /// directory written by [`ZipWriter::finish`].
    pub fn finish_file(&mut self) -> Result<()> {
        let entry = self
            .open
            .take()
            .ok_or_else(|| RelayError::Archive("no entry open".into()))?;

        let mut writer = entry.encoder.finish()?;
        let end_offset = writer.stream_position()?;
        let compressed_size = end_offset - entry.data_offset;
        let crc32 = entry.crc_hasher.finalize();

        writer.seek(SeekFrom::Start(entry.header_offset + LOCAL_HEADER_CRC_OFFSET))?;
        writer.write_all(&crc32.to_le_bytes())?;
        writer.write_all(&(compressed_size as u32).to_le_bytes())?;
        writer.write_all(&(entry.uncompressed_size as u32).to_le_bytes())?;
        writer.seek(SeekFrom::Start(end_offset))?;

        self.entries.push(CentralDirectoryEntry {
            name: entry.name,
            header_offset: entry.header_offset as u32,
            crc32,
            compressed_size: compressed_size as u32,
            uncompressed_size: entry.uncompressed_size as u32,
            dos_time: entry.dos_time,
            dos_date: entry.dos_date,
        });
        self.inner = Some(writer);
        Ok(())
    }

    /// Writes the central directory and end-of-central-directory record,
    /// then returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        if self.open.is_some() {
            return Err(RelayError::Archive("entry left open at finish".into()));
        }
        let mut writer = self
            .inner
            .take()
            .ok_or_else(|| RelayError::Archive("zip writer already finished".into()))?;

        let cd_start = writer.stream_position()?;
        for entry in &self.entries {
            write_central_directory_header(&mut writer, entry)?;
        }
        let cd_end = writer.stream_position()?;

        write_eocd(
            &mut writer,
            self.entries.len() as u16,
            cd_start as u32,
            (cd_end - cd_start) as u32,
        )?;

        Ok(writer)
    }
}

fn write_local_file_header_placeholder<W: Write>(
    w: &mut W,
    name: &str,
    dos_time: u16,
    dos_date: u16,
) -> Result<()> {
    let name_bytes = name.as_bytes();
    w.write_all(&LOCAL_HEADER_SIGNATURE.to_le_bytes())?;
    w.write_all(&VERSION_NEEDED.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // general purpose flag
    w.write_all(&METHOD_DEFLATE.to_le_bytes())?;
    w.write_all(&dos_time.to_le_bytes())?;
    w.write_all(&dos_date.to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?; // crc32 placeholder
    w.write_all(&0u32.to_le_bytes())?; // compressed size placeholder
    w.write_all(&0u32.to_le_bytes())?; // uncompressed size placeholder
    w.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // extra field length
    w.write_all(name_bytes)?;
    Ok(())
}

fn write_central_directory_header<W: Write>(w: &mut W, entry: &CentralDirectoryEntry) -> Result<()> {
    let name_bytes = entry.name.as_bytes();
    w.write_all(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
    w.write_all(&VERSION_NEEDED.to_le_bytes())?; // version made by
    w.write_all(&VERSION_NEEDED.to_le_bytes())?; // version needed
    w.write_all(&0u16.to_le_bytes())?; // general purpose flag
    w.write_all(&METHOD_DEFLATE.to_le_bytes())?;
    w.write_all(&entry.dos_time.to_le_bytes())?;
    w.write_all(&entry.dos_date.to_le_bytes())?;
    w.write_all(&entry.crc32.to_le_bytes())?;
    w.write_all(&entry.compressed_size.to_le_bytes())?;
    w.write_all(&entry.uncompressed_size.to_le_bytes())?;
    w.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // extra field length
    w.write_all(&0u16.to_le_bytes())?; // comment length
    w.write_all(&0u16.to_le_bytes())?; // disk number start
    w.write_all(&0x0001u16.to_le_bytes())?; // internal file attributes: text file
    w.write_all(&0x20u32.to_le_bytes())?; // external file attributes: MS-DOS archive bit
    w.write_all(&entry.header_offset.to_le_bytes())?;
    w.write_all(name_bytes)?;
    Ok(())
}

fn write_eocd<W: Write>(w: &mut W, entry_count: u16, cd_offset: u32, cd_size: u32) -> Result<()> {
    w.write_all(&EOCD_SIGNATURE.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // disk number
    w.write_all(&0u16.to_le_bytes())?; // disk with central directory
    w.write_all(&entry_count.to_le_bytes())?; // entries on this disk
    w.write_all(&entry_count.to_le_bytes())?; // total entries
    w.write_all(&cd_size.to_le_bytes())?;
    w.write_all(&cd_offset.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // comment length
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_single_entry() {
        let buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(buf);
        zip.start_file("hello.txt").unwrap();
        zip.write_all(b"hello world").unwrap();
        zip.finish_file().unwrap();
        let buf = zip.finish().unwrap();
        let bytes = buf.into_inner();

        assert_eq!(&bytes[0..4], &LOCAL_HEADER_SIGNATURE.to_le_bytes());

        let crc_field = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"hello world");
        assert_eq!(crc_field, hasher.finalize());

        let uncompressed = u32::from_le_bytes(bytes[22..26].try_into().unwrap());
        assert_eq!(uncompressed, 11);

        assert!(bytes.windows(4).any(|w| w == CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes()));
        assert!(bytes.windows(4).any(|w| w == EOCD_SIGNATURE.to_le_bytes()));
    }

    #[test]
    fn multiple_entries_each_get_own_header_offset() {
        let buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(buf);

        zip.start_file("a.bin").unwrap();
        zip.write_all(b"aaaa").unwrap();
        zip.finish_file().unwrap();

        zip.start_file("b.bin").unwrap();
        zip.write_all(b"bbbbbbbb").unwrap();
        zip.finish_file().unwrap();

        assert_eq!(zip.entries.len(), 2);
        assert!(zip.entries[1].header_offset > zip.entries[0].header_offset);
    }

    #[test]
    fn writing_without_open_entry_errors() {
        let buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(buf);
        assert!(zip.write_all(b"oops").is_err());
    }
}

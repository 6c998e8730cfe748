/*!
Input plumbing: extension-sniffed decompression for the tools, and a
small in-memory stream used for staged output.
*/
use crate::error::ParserError;
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use liblzma::read::XzDecoder;
use log::info;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

/// Create a reader for `path`, decompressing by file extension: `.bz2`,
/// `.gz`/`.z`, `.xz`, anything else raw. `-` reads standard input.
///
/// The multi-stream decoders keep reading across member boundaries, so
/// concatenated archives decode as one continuous record stream.
pub fn get_reader(path: &str) -> Result<Box<dyn Read>, ParserError> {
    if path == "-" {
        return Ok(Box::new(io::stdin()));
    }

    let file = File::open(path)?;
    let extension = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match extension.as_str() {
        "gz" | "z" => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        "bz2" => Ok(Box::new(BufReader::new(MultiBzDecoder::new(file)))),
        "xz" => Ok(Box::new(BufReader::new(XzDecoder::new_multi_decoder(file)))),
        _ => {
            info!("no compression extension on {path}, reading as raw MRT");
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

/// A growable in-memory byte stream with `Read + Write + Seek`.
///
/// The backing buffer always keeps a NUL one byte past the written
/// region, so the contents double as a C-style string for text payloads.
/// A stream built with [MemStream::fixed] never reallocates: writes past
/// the capacity return short counts instead.
#[derive(Debug)]
pub struct MemStream {
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    max: Option<usize>,
}

impl Default for MemStream {
    fn default() -> Self {
        MemStream::new()
    }
}

impl MemStream {
    pub fn new() -> MemStream {
        MemStream {
            buf: vec![0],
            pos: 0,
            end: 0,
            max: None,
        }
    }

    /// A non-growing stream holding at most `capacity` bytes.
    pub fn fixed(capacity: usize) -> MemStream {
        MemStream {
            buf: vec![0; capacity + 1],
            pos: 0,
            end: 0,
            max: Some(capacity),
        }
    }

    pub fn from_vec(mut data: Vec<u8>) -> MemStream {
        let end = data.len();
        data.push(0);
        MemStream {
            buf: data,
            pos: 0,
            end,
            max: None,
        }
    }

    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// The written region, without the trailing NUL.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.end]
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.truncate(self.end);
        self.buf
    }

    /// Rewind and truncate to empty.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.end = 0;
        self.buf[0] = 0;
    }
}

impl Read for MemStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.end.saturating_sub(self.pos);
        let n = out.len().min(available);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MemStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let allowed = match self.max {
            Some(max) => {
                if self.pos >= max {
                    return Ok(0);
                }
                data.len().min(max - self.pos)
            }
            None => data.len(),
        };
        let write_end = self.pos + allowed;
        let needed_end = write_end.max(self.end);
        if self.buf.len() < needed_end + 1 {
            self.buf.resize(needed_end + 1, 0);
        }
        self.buf[self.pos..write_end].copy_from_slice(&data[..allowed]);
        self.pos = write_end;
        if self.pos > self.end {
            self.end = self.pos;
        }
        self.buf[self.end] = 0;
        Ok(allowed)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemStream {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => self.end as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_round_trip() {
        let mut stream = MemStream::new();
        stream.write_all(b"hello mrt").unwrap();
        assert_eq!(stream.len(), 9);

        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello mrt");
    }

    #[test]
    fn test_nul_terminated_past_written_region() {
        let mut stream = MemStream::new();
        stream.write_all(b"abc").unwrap();
        assert_eq!(stream.as_bytes(), b"abc");
        assert_eq!(stream.buf[stream.end], 0);

        // overwriting the middle keeps the terminator in place
        stream.seek(SeekFrom::Start(1)).unwrap();
        stream.write_all(b"Z").unwrap();
        assert_eq!(stream.as_bytes(), b"aZc");
        assert_eq!(stream.buf[stream.end], 0);
    }

    #[test]
    fn test_fixed_short_writes() {
        let mut stream = MemStream::fixed(4);
        assert_eq!(stream.write(b"abcdef").unwrap(), 4);
        assert_eq!(stream.write(b"x").unwrap(), 0);
        assert_eq!(stream.as_bytes(), b"abcd");
        assert!(stream.write_all(b"x").is_err()); // WriteZero
    }

    #[test]
    fn test_seek_past_end_zero_fills() {
        let mut stream = MemStream::new();
        stream.seek(SeekFrom::Start(3)).unwrap();
        stream.write_all(b"x").unwrap();
        assert_eq!(stream.as_bytes(), &[0, 0, 0, b'x']);
    }

    #[test]
    fn test_tell() {
        let mut stream = MemStream::from_vec(b"0123456789".to_vec());
        stream.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(stream.stream_position().unwrap(), 8);
        assert!(stream.seek(SeekFrom::Current(-20)).is_err());
    }
}

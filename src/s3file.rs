//! Binary model container shared by transition, Gaussian and mixture-weight
//! files.
//!
//! Layout: an ASCII header (`s3`, then `key value` lines, then `endhdr`), a
//! 4-byte byte-order marker, a payload of 4-byte values and, when the header
//! carries `chksum0`, a trailing 32-bit checksum over the payload.

use crate::consts::BYTE_ORDER_MAGIC;
use crate::error::{DecodeError, DecodeResult};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const CHECKSUM_KEY: &str = "chksum0";

#[derive(Debug, Clone, Default)]
pub struct S3Header {
    pub fields: Vec<(String, String)>,
}

impl S3Header {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_checksum(&self) -> bool {
        self.get(CHECKSUM_KEY).is_some()
    }
}

#[inline]
fn accumulate(sum: u32, value: u32) -> u32 {
    sum.rotate_left(20).wrapping_add(value)
}

/// Product of header dimensions, or a `Dimension` error if it overflows.
pub(crate) fn checked_product(dims: &[usize]) -> DecodeResult<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| DecodeError::Dimension(format!("dimensions {:?} overflow", dims)))
}

fn short_read(e: std::io::Error, what: &str) -> DecodeError {
    if e.kind() == ErrorKind::UnexpectedEof {
        DecodeError::Format(format!("short read while reading {}", what))
    } else {
        DecodeError::Io(e)
    }
}

pub struct S3Reader<R: Read> {
    inner: R,
    header: S3Header,
    swap: bool,
    checksum: u32,
}

impl<R: Read> S3Reader<R> {
    /// Parses the header and byte-order marker.
    pub fn new(mut inner: R) -> DecodeResult<Self> {
        let mut lines = Vec::new();
        let mut line = Vec::new();
        let mut consumed = 0usize;
        loop {
            let mut byte = [0u8; 1];
            inner
                .read_exact(&mut byte)
                .map_err(|e| short_read(e, "header"))?;
            consumed += 1;
            if consumed > MAX_HEADER_BYTES {
                return Err(DecodeError::Format("header is not terminated".into()));
            }
            if byte[0] != b'\n' {
                line.push(byte[0]);
                continue;
            }
            let text = String::from_utf8_lossy(&line).trim().to_string();
            line.clear();
            if lines.is_empty() {
                if text != "s3" {
                    return Err(DecodeError::Format(format!(
                        "header must begin with 's3', found '{}'",
                        text
                    )));
                }
                lines.push(text);
                continue;
            }
            if text == "endhdr" {
                break;
            }
            lines.push(text);
        }

        let mut header = S3Header::default();
        for text in lines.iter().skip(1) {
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let (key, value) = match text.split_once(char::is_whitespace) {
                Some((k, v)) => (k.to_string(), v.trim().to_string()),
                None => (text.clone(), String::new()),
            };
            debug!("header field {} = '{}'", key, value);
            header.fields.push((key, value));
        }

        let mut magic = [0u8; 4];
        inner
            .read_exact(&mut magic)
            .map_err(|e| short_read(e, "byte-order marker"))?;
        let magic = u32::from_le_bytes(magic);
        let swap = if magic == BYTE_ORDER_MAGIC {
            false
        } else if magic.swap_bytes() == BYTE_ORDER_MAGIC {
            true
        } else {
            return Err(DecodeError::Format(format!(
                "bad byte-order marker {:#010x}",
                magic
            )));
        };

        Ok(Self {
            inner,
            header,
            swap,
            checksum: 0,
        })
    }

    pub fn header(&self) -> &S3Header {
        &self.header
    }

    pub fn is_swapped(&self) -> bool {
        self.swap
    }

    /// A version mismatch is tolerated with a warning.
    pub fn check_version(&self, expected: &str) {
        match self.header.get("version") {
            Some(v) if v == expected => {}
            Some(v) => warn!("model version mismatch: file {}, expected {}", v, expected),
            None => warn!("model file has no version field, expected {}", expected),
        }
    }

    fn read_word(&mut self, what: &str) -> DecodeResult<u32> {
        let mut buf = [0u8; 4];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| short_read(e, what))?;
        let raw = u32::from_le_bytes(buf);
        Ok(if self.swap { raw.swap_bytes() } else { raw })
    }

    fn read_payload_word(&mut self, what: &str) -> DecodeResult<u32> {
        let v = self.read_word(what)?;
        self.checksum = accumulate(self.checksum, v);
        Ok(v)
    }

    pub fn read_i32(&mut self, what: &str) -> DecodeResult<i32> {
        Ok(self.read_payload_word(what)? as i32)
    }

    pub fn read_i32s(&mut self, n: usize, what: &str) -> DecodeResult<Vec<i32>> {
        (0..n).map(|_| self.read_i32(what)).collect()
    }

    pub fn read_f32s(&mut self, n: usize, what: &str) -> DecodeResult<Vec<f32>> {
        (0..n)
            .map(|_| self.read_payload_word(what).map(f32::from_bits))
            .collect()
    }

    /// Checks the trailing checksum if the header announced one.
    pub fn verify_checksum(&mut self) -> DecodeResult<()> {
        if !self.header.has_checksum() {
            return Ok(());
        }
        let computed = self.checksum;
        let stored = self.read_word("checksum")?;
        if stored != computed {
            return Err(DecodeError::Checksum { stored, computed });
        }
        Ok(())
    }

    /// Fails if any bytes follow the expected data.
    pub fn expect_eof(&mut self) -> DecodeResult<()> {
        let mut probe = [0u8; 1];
        match self.inner.read(&mut probe) {
            Ok(0) => Ok(()),
            Ok(_) => Err(DecodeError::Format(
                "non-empty file beyond end of data".into(),
            )),
            Err(e) => Err(DecodeError::Io(e)),
        }
    }
}

/// Writes the container format. Used for fixtures and model conversion.
pub struct S3Writer<W: Write> {
    inner: W,
    big_endian: bool,
    with_checksum: bool,
    checksum: u32,
}

impl<W: Write> S3Writer<W> {
    pub fn new(
        mut inner: W,
        fields: &[(&str, &str)],
        with_checksum: bool,
        big_endian: bool,
    ) -> DecodeResult<Self> {
        writeln!(inner, "s3")?;
        for (k, v) in fields {
            writeln!(inner, "{} {}", k, v)?;
        }
        if with_checksum {
            writeln!(inner, "{} yes", CHECKSUM_KEY)?;
        }
        writeln!(inner, "endhdr")?;

        let mut w = Self {
            inner,
            big_endian,
            with_checksum,
            checksum: 0,
        };
        w.write_word(BYTE_ORDER_MAGIC)?;
        Ok(w)
    }

    fn write_word(&mut self, v: u32) -> DecodeResult<()> {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    fn write_payload_word(&mut self, v: u32) -> DecodeResult<()> {
        self.checksum = accumulate(self.checksum, v);
        self.write_word(v)
    }

    pub fn write_i32(&mut self, v: i32) -> DecodeResult<()> {
        self.write_payload_word(v as u32)
    }

    pub fn write_i32s(&mut self, vs: &[i32]) -> DecodeResult<()> {
        vs.iter().try_for_each(|&v| self.write_i32(v))
    }

    pub fn write_f32s(&mut self, vs: &[f32]) -> DecodeResult<()> {
        vs.iter().try_for_each(|&v| self.write_payload_word(v.to_bits()))
    }

    /// Appends the checksum (when enabled) and hands back the sink.
    pub fn finish(mut self) -> DecodeResult<W> {
        if self.with_checksum {
            let sum = self.checksum;
            self.write_word(sum)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

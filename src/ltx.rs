//! LTX transaction-log file codec.
//!
//! An LTX file is an immutable, checksum-chained record of one transaction
//! (or a compacted range of transactions) against a single database. Layout:
//! a fixed little-endian header (magic + CRC32C), a body of page frames
//! terminated by a zero page number, and a trailer carrying the post-apply
//! checksum plus a CRC32C over the whole file. When the LZ4 flag is set the
//! body (frames + terminator) is a single length-prefixed compressed block.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crc32c::{crc32c, crc32c_append};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::pos::Txid;

pub const MAGIC: &[u8; 4] = b"LTX1";
pub const HEADER_LEN: usize = 60;
pub const TRAILER_LEN: usize = 12;

/// Header flag: the file is a snapshot and replaces all prior state.
pub const FLAG_SNAPSHOT: u32 = 1 << 0;
/// Header flag: the body is an LZ4 block.
pub const FLAG_COMPRESS_LZ4: u32 = 1 << 1;

const FLAG_MASK: u32 = FLAG_SNAPSHOT | FLAG_COMPRESS_LZ4;

pub const MIN_PAGE_SIZE: u32 = 512;
pub const MAX_PAGE_SIZE: u32 = 65536;

// Upper bound on a compressed body block; rejects absurd length prefixes
// before allocation.
const MAX_BODY_BYTES: usize = 1 << 30;

#[derive(Debug, Error)]
pub enum LtxError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid ltx magic: {got:02x?}")]
    Magic { got: [u8; 4] },
    #[error("invalid ltx header: {reason}")]
    HeaderInvalid { reason: String },
    #[error("ltx header crc mismatch: expected {expected:08x} got {got:08x}")]
    HeaderCrcMismatch { expected: u32, got: u32 },
    #[error("ltx file crc mismatch: expected {expected:08x} got {got:08x}")]
    FileCrcMismatch { expected: u32, got: u32 },
    #[error("page {pgno} out of order, last was {last}")]
    PageOutOfOrder { pgno: u32, last: u32 },
    #[error("page {pgno} beyond commit size {commit}")]
    PageOutOfBounds { pgno: u32, commit: u32 },
    #[error("invalid page size {page_size}")]
    PageSizeInvalid { page_size: u32 },
    #[error("page data length {len} does not match page size {page_size}")]
    PageDataInvalid { len: usize, page_size: u32 },
    #[error("ltx body invalid: {reason}")]
    BodyInvalid { reason: String },
    #[error("database file length {len} not a multiple of page size {page_size}")]
    UnalignedDatabase { len: u64, page_size: u32 },
}

/// Fixed header at the start of every LTX file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub flags: u32,
    pub page_size: u32,
    /// Size of the database, in pages, after this file is applied.
    pub commit: u32,
    pub min_txid: Txid,
    pub max_txid: Txid,
    pub timestamp_ms: u64,
    pub pre_apply_checksum: u64,
    /// ID of the node that created the transaction.
    pub node_id: u64,
}

impl Header {
    pub fn is_snapshot(&self) -> bool {
        self.flags & FLAG_SNAPSHOT != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESS_LZ4 != 0
    }

    pub fn validate(&self) -> Result<(), LtxError> {
        if self.flags & !FLAG_MASK != 0 {
            return Err(LtxError::HeaderInvalid {
                reason: format!("unknown flags: {:08x}", self.flags),
            });
        }
        if !self.page_size.is_power_of_two()
            || self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(LtxError::PageSizeInvalid {
                page_size: self.page_size,
            });
        }
        if self.min_txid.0 == 0 {
            return Err(LtxError::HeaderInvalid {
                reason: "min txid cannot be zero".to_string(),
            });
        }
        if self.min_txid > self.max_txid {
            return Err(LtxError::HeaderInvalid {
                reason: format!("txid range invalid: {}-{}", self.min_txid, self.max_txid),
            });
        }
        if self.is_snapshot() {
            if self.min_txid.0 != 1 {
                return Err(LtxError::HeaderInvalid {
                    reason: "snapshot must start at txid 1".to_string(),
                });
            }
            if self.pre_apply_checksum != 0 {
                return Err(LtxError::HeaderInvalid {
                    reason: "snapshot cannot have a pre-apply checksum".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.commit.to_le_bytes());
        buf[16..24].copy_from_slice(&self.min_txid.0.to_le_bytes());
        buf[24..32].copy_from_slice(&self.max_txid.0.to_le_bytes());
        buf[32..40].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[40..48].copy_from_slice(&self.pre_apply_checksum.to_le_bytes());
        buf[48..56].copy_from_slice(&self.node_id.to_le_bytes());
        let crc = crc32c(&buf[..HEADER_LEN - 4]);
        buf[56..60].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, LtxError> {
        if &buf[0..4] != MAGIC {
            let mut got = [0u8; 4];
            got.copy_from_slice(&buf[0..4]);
            return Err(LtxError::Magic { got });
        }

        let expected = u32::from_le_bytes(take4(buf, 56));
        let got = crc32c(&buf[..HEADER_LEN - 4]);
        if got != expected {
            return Err(LtxError::HeaderCrcMismatch { expected, got });
        }

        let hdr = Header {
            flags: u32::from_le_bytes(take4(buf, 4)),
            page_size: u32::from_le_bytes(take4(buf, 8)),
            commit: u32::from_le_bytes(take4(buf, 12)),
            min_txid: Txid(u64::from_le_bytes(take8(buf, 16))),
            max_txid: Txid(u64::from_le_bytes(take8(buf, 24))),
            timestamp_ms: u64::from_le_bytes(take8(buf, 32)),
            pre_apply_checksum: u64::from_le_bytes(take8(buf, 40)),
            node_id: u64::from_le_bytes(take8(buf, 48)),
        };
        hdr.validate()?;
        Ok(hdr)
    }

    /// Reads and decodes a header from the front of `r`, returning the raw
    /// bytes consumed so the caller can re-chain them ahead of the remaining
    /// stream.
    pub fn peek(r: &mut impl Read) -> Result<(Self, Vec<u8>), LtxError> {
        let mut buf = [0u8; HEADER_LEN];
        r.read_exact(&mut buf)?;
        let hdr = Header::decode(&buf)?;
        Ok((hdr, buf.to_vec()))
    }
}

fn take4(buf: &[u8], off: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[off..off + 4]);
    out
}

fn take8(buf: &[u8], off: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[off..off + 8]);
    out
}

/// Trailer at the end of every LTX file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trailer {
    pub post_apply_checksum: u64,
}

/// Streaming LTX writer.
pub struct Encoder<W: Write> {
    w: W,
    header: Header,
    crc: u32,
    // Frames are buffered when the body is compressed.
    body: Option<Vec<u8>>,
    last_pgno: u32,
}

impl<W: Write> Encoder<W> {
    pub fn new(mut w: W, header: Header) -> Result<Self, LtxError> {
        header.validate()?;
        let bytes = header.encode();
        w.write_all(&bytes)?;
        Ok(Self {
            w,
            header,
            crc: crc32c(&bytes),
            body: header.is_compressed().then(Vec::new),
            last_pgno: 0,
        })
    }

    /// Appends a page frame. Pages must be written in ascending page order.
    pub fn write_page(&mut self, pgno: u32, data: &[u8]) -> Result<(), LtxError> {
        if data.len() != self.header.page_size as usize {
            return Err(LtxError::PageDataInvalid {
                len: data.len(),
                page_size: self.header.page_size,
            });
        }
        if pgno == 0 || pgno <= self.last_pgno {
            return Err(LtxError::PageOutOfOrder {
                pgno,
                last: self.last_pgno,
            });
        }
        if pgno > self.header.commit {
            return Err(LtxError::PageOutOfBounds {
                pgno,
                commit: self.header.commit,
            });
        }
        self.last_pgno = pgno;

        match &mut self.body {
            Some(buf) => {
                buf.extend_from_slice(&pgno.to_le_bytes());
                buf.extend_from_slice(data);
            }
            None => {
                self.write_raw(&pgno.to_le_bytes())?;
                self.write_raw(data)?;
            }
        }
        Ok(())
    }

    /// Writes the page terminator and trailer, returning the inner writer.
    pub fn finish(mut self, post_apply_checksum: u64) -> Result<W, LtxError> {
        match self.body.take() {
            Some(mut buf) => {
                buf.extend_from_slice(&0u32.to_le_bytes());
                let block = lz4_flex::compress_prepend_size(&buf);
                let len = u32::try_from(block.len()).map_err(|_| LtxError::BodyInvalid {
                    reason: "compressed body exceeds u32".to_string(),
                })?;
                self.write_raw(&len.to_le_bytes())?;
                self.write_raw(&block)?;
            }
            None => self.write_raw(&0u32.to_le_bytes())?,
        }

        self.write_raw(&post_apply_checksum.to_le_bytes())?;
        let crc = self.crc;
        self.w.write_all(&crc.to_le_bytes())?;
        self.w.flush()?;
        Ok(self.w)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), LtxError> {
        self.w.write_all(data)?;
        self.crc = crc32c_append(self.crc, data);
        Ok(())
    }
}

enum BodySource {
    Stream,
    Buffered(io::Cursor<Vec<u8>>),
}

/// Streaming LTX reader.
pub struct Decoder<R: Read> {
    r: R,
    header: Header,
    crc: u32,
    body: BodySource,
    body_done: bool,
    last_pgno: u32,
}

impl<R: Read> Decoder<R> {
    pub fn new(mut r: R) -> Result<Self, LtxError> {
        let mut buf = [0u8; HEADER_LEN];
        r.read_exact(&mut buf)?;
        let header = Header::decode(&buf)?;
        let mut crc = crc32c(&buf);

        let body = if header.is_compressed() {
            let mut len_buf = [0u8; 4];
            r.read_exact(&mut len_buf)?;
            crc = crc32c_append(crc, &len_buf);
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_BODY_BYTES {
                return Err(LtxError::BodyInvalid {
                    reason: format!("compressed body too large: {len}"),
                });
            }
            let mut block = vec![0u8; len];
            r.read_exact(&mut block)?;
            crc = crc32c_append(crc, &block);
            let raw = lz4_flex::decompress_size_prepended(&block).map_err(|err| {
                LtxError::BodyInvalid {
                    reason: format!("lz4 decompress failed: {err}"),
                }
            })?;
            BodySource::Buffered(io::Cursor::new(raw))
        } else {
            BodySource::Stream
        };

        Ok(Self {
            r,
            header,
            crc,
            body,
            body_done: false,
            last_pgno: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Reads the next page frame into `buf`. Returns the page number, or
    /// `None` once the terminator has been read.
    pub fn next_page(&mut self, buf: &mut Vec<u8>) -> Result<Option<u32>, LtxError> {
        if self.body_done {
            return Ok(None);
        }

        let mut pgno_buf = [0u8; 4];
        self.read_body(&mut pgno_buf)?;
        let pgno = u32::from_le_bytes(pgno_buf);
        if pgno == 0 {
            self.body_done = true;
            return Ok(None);
        }
        if pgno <= self.last_pgno {
            return Err(LtxError::PageOutOfOrder {
                pgno,
                last: self.last_pgno,
            });
        }
        if pgno > self.header.commit {
            return Err(LtxError::PageOutOfBounds {
                pgno,
                commit: self.header.commit,
            });
        }
        self.last_pgno = pgno;

        buf.resize(self.header.page_size as usize, 0);
        self.read_body(buf)?;
        Ok(Some(pgno))
    }

    /// Reads and validates the trailer. All page frames must have been
    /// consumed first.
    pub fn finish(mut self) -> Result<Trailer, LtxError> {
        if !self.body_done {
            return Err(LtxError::BodyInvalid {
                reason: "trailer read before body was consumed".to_string(),
            });
        }

        let mut post_buf = [0u8; 8];
        self.r.read_exact(&mut post_buf)?;
        self.crc = crc32c_append(self.crc, &post_buf);

        let mut crc_buf = [0u8; 4];
        self.r.read_exact(&mut crc_buf)?;
        let expected = u32::from_le_bytes(crc_buf);
        if expected != self.crc {
            return Err(LtxError::FileCrcMismatch {
                expected,
                got: self.crc,
            });
        }

        Ok(Trailer {
            post_apply_checksum: u64::from_le_bytes(post_buf),
        })
    }

    /// Consumes the entire file, validating structure and checksums.
    pub fn verify(mut self) -> Result<Trailer, LtxError> {
        let mut buf = Vec::new();
        while self.next_page(&mut buf)?.is_some() {}
        self.finish()
    }

    fn read_body(&mut self, buf: &mut [u8]) -> Result<(), LtxError> {
        match &mut self.body {
            BodySource::Stream => {
                self.r.read_exact(buf)?;
                self.crc = crc32c_append(self.crc, buf);
            }
            BodySource::Buffered(cursor) => cursor.read_exact(buf)?,
        }
        Ok(())
    }
}

/// Checksum of a single page: the first 8 bytes of SHA-256 over the page
/// number and contents.
pub fn page_checksum(pgno: u32, data: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(pgno.to_le_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(out)
}

/// Checksum of a whole database file: the XOR of all page checksums. The
/// zero value corresponds to an empty database.
pub fn database_checksum(path: &Path, page_size: u32) -> Result<u64, LtxError> {
    let mut f = File::open(path)?;
    let len = f.metadata()?.len();
    if len % u64::from(page_size) != 0 {
        return Err(LtxError::UnalignedDatabase { len, page_size });
    }

    let mut checksum = 0u64;
    let mut buf = vec![0u8; page_size as usize];
    let pages = len / u64::from(page_size);
    for pgno in 1..=pages {
        f.read_exact(&mut buf)?;
        checksum ^= page_checksum(pgno as u32, &buf);
    }
    Ok(checksum)
}

/// Canonical LTX file name for a transaction range.
pub fn ltx_filename(min_txid: Txid, max_txid: Txid) -> String {
    format!("{min_txid}-{max_txid}.ltx")
}

/// Parses a `{min}-{max}.ltx` file name. Returns `None` for anything else.
pub fn parse_ltx_filename(name: &str) -> Option<(Txid, Txid)> {
    let base = name.strip_suffix(".ltx")?;
    let (min_str, max_str) = base.split_once('-')?;
    let min: Txid = min_str.parse().ok()?;
    let max: Txid = max_str.parse().ok()?;
    (min <= max).then_some((min, max))
}

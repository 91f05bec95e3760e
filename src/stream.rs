//! Replication stream wire protocol.
//!
//! A replica consumes a byte stream from the primary made of typed frames:
//! a one-byte tag followed by a type-specific body. An LTX frame carries the
//! database name; the LTX file itself follows as a chunked byte stream
//! (u32-LE length-prefixed chunks, zero-length chunk terminates) so the
//! primary can stream without knowing the total size up front.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::context::Context;
use crate::error::Error as StoreError;
use crate::pos::PosMap;

pub const FRAME_TYPE_LTX: u8 = 1;
pub const FRAME_TYPE_READY: u8 = 2;
pub const FRAME_TYPE_END: u8 = 3;
pub const FRAME_TYPE_DROP_DB: u8 = 4;

// Database names travel length-prefixed; this bounds allocation.
const MAX_NAME_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid stream frame type: {tag:#04x}")]
    UnknownFrameType { tag: u8 },
    #[error("invalid name in stream frame: {reason}")]
    NameInvalid { reason: String },
}

/// One frame of the replication stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    /// An LTX file for the named database follows as a chunked stream.
    Ltx { name: String },
    /// Initial catch-up is complete; the replica may report ready.
    Ready,
    /// Clean disconnect.
    End,
    /// The named database was dropped on the primary.
    DropDb { name: String },
}

impl StreamFrame {
    pub fn frame_type(&self) -> u8 {
        match self {
            StreamFrame::Ltx { .. } => FRAME_TYPE_LTX,
            StreamFrame::Ready => FRAME_TYPE_READY,
            StreamFrame::End => FRAME_TYPE_END,
            StreamFrame::DropDb { .. } => FRAME_TYPE_DROP_DB,
        }
    }
}

/// Reads the next frame header. Returns `None` on a clean EOF at a frame
/// boundary; EOF anywhere else is an error.
pub fn read_stream_frame(r: &mut impl Read) -> Result<Option<StreamFrame>, StreamError> {
    let mut tag = [0u8; 1];
    let n = r.read(&mut tag)?;
    if n == 0 {
        return Ok(None);
    }

    match tag[0] {
        FRAME_TYPE_LTX => Ok(Some(StreamFrame::Ltx {
            name: read_name(r)?,
        })),
        FRAME_TYPE_READY => Ok(Some(StreamFrame::Ready)),
        FRAME_TYPE_END => Ok(Some(StreamFrame::End)),
        FRAME_TYPE_DROP_DB => Ok(Some(StreamFrame::DropDb {
            name: read_name(r)?,
        })),
        tag => Err(StreamError::UnknownFrameType { tag }),
    }
}

/// Writes a frame header. For LTX frames the caller must follow with the
/// chunked file body via [`ChunkWriter`].
pub fn write_stream_frame(w: &mut impl Write, frame: &StreamFrame) -> Result<(), StreamError> {
    w.write_all(&[frame.frame_type()])?;
    match frame {
        StreamFrame::Ltx { name } | StreamFrame::DropDb { name } => write_name(w, name)?,
        StreamFrame::Ready | StreamFrame::End => {}
    }
    Ok(())
}

fn read_name(r: &mut impl Read) -> Result<String, StreamError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_NAME_LEN {
        return Err(StreamError::NameInvalid {
            reason: format!("length {len} out of range"),
        });
    }

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| StreamError::NameInvalid {
        reason: "not utf-8".to_string(),
    })
}

fn write_name(w: &mut impl Write, name: &str) -> Result<(), StreamError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
        return Err(StreamError::NameInvalid {
            reason: format!("length {} out of range", bytes.len()),
        });
    }
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

/// Reads a chunked byte stream. Presents the chunks as one contiguous
/// reader; reports EOF once the zero-length terminator chunk is seen.
pub struct ChunkReader<R> {
    r: R,
    remaining: u32,
    finished: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            remaining: 0,
            finished: false,
        }
    }

    /// Consumes any bytes left before the terminator chunk. Must be called
    /// after a successful body read so the stream is positioned at the next
    /// frame.
    pub fn drain(&mut self) -> Result<u64, StreamError> {
        let n = io::copy(self, &mut io::sink())?;
        Ok(n)
    }
}

impl<R: Read> Read for ChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        while self.remaining == 0 {
            let mut len_buf = [0u8; 4];
            self.r.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf);
            if len == 0 {
                self.finished = true;
                return Ok(0);
            }
            self.remaining = len;
        }

        let want = buf.len().min(self.remaining as usize);
        let n = self.r.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunk truncated",
            ));
        }
        self.remaining -= n as u32;
        Ok(n)
    }
}

/// Writes a chunked byte stream. Each `write` emits one chunk; `finish`
/// emits the terminator.
pub struct ChunkWriter<W> {
    w: W,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn finish(mut self) -> Result<W, StreamError> {
        self.w.write_all(&0u32.to_le_bytes())?;
        self.w.flush()?;
        Ok(self.w)
    }
}

impl<W: Write> Write for ChunkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = u32::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk exceeds u32"))?;
        self.w.write_all(&len.to_le_bytes())?;
        self.w.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// Opens replication streams to a primary.
pub trait Client: Send + Sync {
    /// Connects to the primary at `url` and requests replication starting
    /// from the given per-database positions. The returned reader yields the
    /// framed protocol above.
    fn stream(
        &self,
        ctx: &Context,
        url: &str,
        node_id: u64,
        pos_map: &PosMap,
    ) -> Result<Box<dyn Read + Send>, StoreError>;
}

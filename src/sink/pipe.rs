//! Bounded in-process byte pipe
//!
//! Connects the serializer (writer side) to the load job (reader side).
//! Chunks travel over a bounded crossbeam channel, so a write blocks once
//! `capacity` chunks are waiting to be read.
//!
//! End-of-stream is explicit: the reader sees EOF only after
//! [`PipeWriter::close`]. A writer that is dropped without closing, or
//! that calls [`PipeWriter::abort`], makes the reader fail instead, so a
//! load job never mistakes a failed producer for a complete stream.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read, Write};

/// Frames carried by the pipe
#[derive(Debug)]
enum Frame {
    Data(Vec<u8>),
    Close,
    Abort(String),
}

/// Create a pipe holding at most `capacity` in-flight chunks
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        PipeWriter {
            tx: Some(tx),
            bytes: 0,
        },
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            end: None,
        },
    )
}

/// Write end of the pipe
#[derive(Debug)]
pub struct PipeWriter {
    tx: Option<Sender<Frame>>,
    bytes: u64,
}

impl PipeWriter {
    /// Bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Signal clean end-of-stream
    pub fn close(mut self) -> io::Result<()> {
        self.finish(Frame::Close)
    }

    /// Signal that the stream is incomplete
    pub fn abort(mut self, reason: impl Into<String>) -> io::Result<()> {
        self.finish(Frame::Abort(reason.into()))
    }

    fn finish(&mut self, frame: Frame) -> io::Result<()> {
        match self.tx.take() {
            Some(tx) => tx.send(frame).map_err(|_| reader_gone()),
            None => Ok(()),
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "write after close"))?;
        tx.send(Frame::Data(buf.to_vec())).map_err(|_| reader_gone())?;
        self.bytes += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = self.finish(Frame::Abort("writer dropped before close".into()));
    }
}

fn reader_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "load stream reader closed")
}

/// Read end of the pipe
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Frame>,
    chunk: Vec<u8>,
    pos: usize,
    end: Option<Result<(), String>>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.chunk.len() {
            if let Some(end) = &self.end {
                return match end {
                    Ok(()) => Ok(0),
                    Err(reason) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, reason.clone())),
                };
            }

            match self.rx.recv() {
                Ok(Frame::Data(data)) => {
                    self.chunk = data;
                    self.pos = 0;
                }
                Ok(Frame::Close) => self.end = Some(Ok(())),
                Ok(Frame::Abort(reason)) => self.end = Some(Err(reason)),
                Err(_) => self.end = Some(Err("writer vanished without closing".into())),
            }
        }

        let n = (self.chunk.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

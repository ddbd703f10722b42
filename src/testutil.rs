//! In-memory stand-ins for the process standard streams used by tests

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Cloneable output sink; every clone sees the same bytes
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
    /// Upper bound of bytes accepted per `write` call, to force partial writes
    chunk: Option<usize>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunked_writes(chunk: usize) -> Self {
        Self {
            bytes: Arc::default(),
            chunk: Some(chunk),
        }
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.bytes.lock().unwrap().clone()).unwrap()
    }

    /// Complete (newline-terminated) lines written so far
    pub fn lines(&self) -> Vec<String> {
        let contents = self.contents();
        let complete = match contents.rfind('\n') {
            Some(end) => &contents[..end],
            None => return Vec::new(),
        };
        complete.split('\n').map(str::to_string).collect()
    }

    /// Poll until at least `count` complete lines arrived or the timeout passes
    pub fn wait_for_lines(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let lines = self.lines();
            if lines.len() >= count || Instant::now() >= deadline {
                return lines;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.chunk.map_or(buf.len(), |chunk| buf.len().min(chunk));
        self.bytes.lock().unwrap().extend_from_slice(&buf[..n]);
        // Give other writers a chance to run between partial writes
        thread::yield_now();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output whose reader went away
pub struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
    }
}

/// Create an in-memory pipe; dropping the writer end is end-of-stream
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (tx, rx) = mpsc::channel();
    (
        PipeReader {
            rx,
            pending: VecDeque::new(),
        },
        PipeWriter { tx },
    )
}

pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl PipeWriter {
    pub fn send(&self, data: &str) {
        self.tx.send(data.as_bytes().to_vec()).unwrap();
    }
}

/// Reader that fails on the first read
pub struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "stdin unavailable"))
    }
}

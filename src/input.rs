//! Frame landmark sources: recorded JSON lines or a live detector process.
//!
//! The detector speaks one hand-landmarker result per line on stdout. The
//! source hands frames over one at a time and blocks until the next one is
//! available; a detector that hangs stalls the caller.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use std::{
    io::BufRead,
    io::BufReader,
    process::{Child, ChildStdout, Command, Stdio},
    time::Instant,
};
use thiserror::Error;

use crate::config::{DetectorConfig, FrameSize};
use crate::landmarks::FrameDetection;

pub trait FrameSource {
    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<FrameDetection>>;
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("line {line}: malformed detector frame: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: detector output is not valid UTF-8")]
    InvalidUtf8 { line: usize },
}

pub struct JsonLinesSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
    clock: Instant,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            clock: Instant::now(),
        }
    }

    fn decode(&self, line: &str) -> Result<FrameDetection, FrameError> {
        let mut frame: FrameDetection =
            serde_json::from_str(line).map_err(|source| FrameError::Malformed {
                line: self.line_no,
                source,
            })?;
        if frame.timestamp_ms.is_none() {
            frame.timestamp_ms = Some(self.clock.elapsed().as_secs_f64() * 1000.0);
        }
        Ok(frame)
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<FrameDetection>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let Ok(text) = std::str::from_utf8(&self.buf) else {
                warn!("{}", FrameError::InvalidUtf8 { line: self.line_no });
                continue;
            };
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            if line == "READY" {
                debug!("detector signalled ready");
                continue;
            }
            match self.decode(line) {
                Ok(frame) => return Ok(Some(frame)),
                // next line is the next attempt
                Err(e) => warn!("{e}"),
            }
        }
    }
}

/// Detector subprocess whose stdout carries the frame stream.
pub struct DetectorProcess {
    child: Child,
    source: JsonLinesSource<BufReader<ChildStdout>>,
}

impl DetectorProcess {
    pub fn spawn(cfg: &DetectorConfig, capture: FrameSize) -> Result<Self> {
        let (program, args) = cfg
            .command
            .split_first()
            .ok_or_else(|| anyhow!("detector command is empty"))?;

        info!(
            "starting detector `{}` at {}x{}",
            cfg.command.join(" "),
            capture.width,
            capture.height
        );
        let mut child = Command::new(program)
            .args(args)
            .env("HANDCTL_CAPTURE_WIDTH", capture.width.to_string())
            .env("HANDCTL_CAPTURE_HEIGHT", capture.height.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start detector `{program}`"))?;

        let stdout = child
            .stdout
            .take()
            .context("detector stdout not captured")?;
        Ok(Self {
            child,
            source: JsonLinesSource::new(BufReader::new(stdout)),
        })
    }
}

impl FrameSource for DetectorProcess {
    fn next_frame(&mut self) -> Result<Option<FrameDetection>> {
        self.source.next_frame()
    }
}

impl Drop for DetectorProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

use anyhow::Result;
use log::{debug, info};
use std::io::Write;

use crate::gestures::GestureEvent;
use crate::landmarks::FrameDetection;
use crate::state::HandsState;

/// Side effect run once per processed frame, after the store is updated.
pub trait FrameObserver {
    fn on_frame(
        &mut self,
        frame: &FrameDetection,
        state: &HandsState,
        events: &[GestureEvent],
    ) -> Result<()>;
}

/// Logs hand presence and pinch transitions.
pub struct LogObserver;

impl FrameObserver for LogObserver {
    fn on_frame(
        &mut self,
        frame: &FrameDetection,
        state: &HandsState,
        events: &[GestureEvent],
    ) -> Result<()> {
        if !events.is_empty() {
            debug!(
                "frame {} @{:.0}ms ({} detections): {:?}",
                state.frames,
                frame.timestamp_ms.unwrap_or_default(),
                frame.entries().count(),
                events
            );
        }
        for e in events {
            match e {
                GestureEvent::HandFound(h) => info!("{h} hand entered"),
                GestureEvent::HandLost(h) => info!("{h} hand left; target reset"),
                GestureEvent::PinchStart(h) => {
                    info!("{h} pinch (v={:.0}px/s)", state.hand(*h).velocity)
                }
                GestureEvent::PinchEnd(h) => info!("{h} release"),
            }
        }
        Ok(())
    }
}

/// Writes every derived state as one JSON object per line.
pub struct JsonLinesObserver<W> {
    out: W,
}

impl<W: Write> JsonLinesObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameObserver for JsonLinesObserver<W> {
    fn on_frame(
        &mut self,
        _: &FrameDetection,
        state: &HandsState,
        _: &[GestureEvent],
    ) -> Result<()> {
        serde_json::to_writer(&mut self.out, state)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

/// Runs several observers in order.
pub struct Fanout(pub Vec<Box<dyn FrameObserver + Send>>);

impl FrameObserver for Fanout {
    fn on_frame(
        &mut self,
        frame: &FrameDetection,
        state: &HandsState,
        events: &[GestureEvent],
    ) -> Result<()> {
        for o in self.0.iter_mut() {
            o.on_frame(frame, state, events)?;
        }
        Ok(())
    }
}

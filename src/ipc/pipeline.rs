use anyhow::{Result, anyhow};
use log::{info, warn};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use crate::actions::FrameObserver;
use crate::config::{FrameSize, Profile};
use crate::gestures::{GestureConfig, reduce, transitions};
use crate::input::FrameSource;
use crate::landmarks::FrameDetection;
use crate::state::SharedState;

/// Pull frames until the source ends or `stop` is raised.
///
/// One frame is fully reduced, stored and observed before the next is
/// requested, so reductions never overlap. `capture` is the size the source
/// was started with and stays fixed for the run. Whichever way the loop
/// ends, both hands are released before returning. Returns the number of
/// frames processed.
pub fn run_frame_loop(
    source: &mut dyn FrameSource,
    store: &SharedState,
    profile: &Arc<Mutex<Profile>>,
    capture: FrameSize,
    observer: &mut dyn FrameObserver,
    stop: &AtomicBool,
) -> Result<u64> {
    let result = pump(source, store, profile, capture, observer, stop);
    if let Err(e) = release_hands(store, profile, observer) {
        warn!("could not release hands after the frame loop: {e}");
    }
    result
}

fn pump(
    source: &mut dyn FrameSource,
    store: &SharedState,
    profile: &Arc<Mutex<Profile>>,
    capture: FrameSize,
    observer: &mut dyn FrameObserver,
    stop: &AtomicBool,
) -> Result<u64> {
    let mut processed = 0u64;
    let mut ignored_size = None;

    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame()? else {
            info!("frame source ended after {processed} frames");
            break;
        };
        // thresholds may have been reloaded since the last frame
        let mut cfg = {
            let p = profile
                .lock()
                .map_err(|_| anyhow!("profile lock poisoned"))?;
            GestureConfig::from_profile(&p)
        };
        if cfg.frame != capture {
            if ignored_size != Some(cfg.frame) {
                warn!(
                    "profile capture {}x{} differs from the running detector's {}x{}; restart to apply it",
                    cfg.frame.width, cfg.frame.height, capture.width, capture.height
                );
                ignored_size = Some(cfg.frame);
            }
            cfg.frame = capture;
        }
        let now_ms = frame.timestamp_ms.unwrap_or_default();

        let (next, events) = {
            let mut st = store.lock().map_err(|_| anyhow!("hand state lock poisoned"))?;
            let next = reduce(&st, &frame, now_ms, &cfg);
            let events = transitions(&st, &next);
            *st = next.clone();
            (next, events)
        };
        observer.on_frame(&frame, &next, &events)?;
        processed += 1;
    }
    Ok(processed)
}

/// No more frames are coming, so nothing may stay active or pinched.
fn release_hands(
    store: &SharedState,
    profile: &Arc<Mutex<Profile>>,
    observer: &mut dyn FrameObserver,
) -> Result<()> {
    let targets = profile
        .lock()
        .map_err(|_| anyhow!("profile lock poisoned"))?
        .targets
        .clone();
    let (next, events) = {
        let mut st = store.lock().map_err(|_| anyhow!("hand state lock poisoned"))?;
        let mut next = st.clone();
        next.release_all(&targets);
        let events = transitions(&st, &next);
        *st = next.clone();
        (next, events)
    };
    if events.is_empty() {
        return Ok(());
    }
    let frame = FrameDetection {
        timestamp_ms: Some(next.timestamp_ms),
        ..FrameDetection::default()
    };
    observer.on_frame(&frame, &next, &events)
}

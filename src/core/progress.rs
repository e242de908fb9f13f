//! Process-wide progress and preview state for `/sdapi/v1/progress`.
//!
//! Written by engine callbacks, read by poll requests. Not tied to any one
//! request: with several jobs in flight the figures interleave.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::DynamicImage;
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

use crate::codec;

/// Progress source used by [`ProgressTracker::record_progress`].
const DEFAULT_SOURCE: &str = "";

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    value: f64,
    max: f64,
}

#[derive(Default)]
struct State {
    /// Latest (value, max) per reporting source, e.g. one per graph node
    slots: IndexMap<String, Slot>,
    /// Set when summed progress first becomes nonzero
    started: Option<Instant>,
    preview: Option<Arc<DynamicImage>>,
}

impl State {
    fn totals(&self) -> (f64, f64) {
        self.slots
            .values()
            .fold((0.0, 0.0), |(v, m), s| (v + s.value, m + s.max))
    }
}

/// Reply body of the progress poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    /// Completed fraction in `[0, 1]`
    pub progress: f64,
    /// Estimated seconds remaining
    pub eta_relative: f64,
    /// Latest preview as base64 JPEG
    pub current_image: Option<String>,
}

#[derive(Default)]
pub struct ProgressTracker {
    state: Mutex<State>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record progress for the default source.
    ///
    /// `value` is the source's cumulative position out of `max`, not an
    /// increment: repeated calls move that source forward while other sources
    /// keep their last reported totals.
    pub fn record_progress(&self, value: f64, max: f64) {
        self.record_node_progress(DEFAULT_SOURCE, value, max);
    }

    /// Record the latest progress of one source. Totals sum across sources.
    ///
    /// Values are clamped into `[0, max]`; non-finite input is dropped.
    pub fn record_node_progress(&self, source: &str, value: f64, max: f64) {
        if !value.is_finite() || !max.is_finite() {
            warn!("Dropping non-finite progress {}/{} from '{}'", value, max, source);
            return;
        }
        let max = max.max(0.0);
        let value = value.clamp(0.0, max);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.slots.insert(source.to_string(), Slot { value, max });
        if state.started.is_none() && state.totals().0 > 0.0 {
            state.started = Some(Instant::now());
        }
    }

    /// Keep `image` as the latest preview, replacing any earlier one.
    pub fn record_preview(&self, image: DynamicImage) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).preview = Some(Arc::new(image));
    }

    /// Back to idle: no progress, no preview, no start time.
    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = State::default();
    }

    /// Current ratio, ETA and (unless skipped) the encoded preview.
    ///
    /// `eta = elapsed * (max - value) / value`, 0 while nothing has progressed.
    pub fn read(&self, skip_preview: bool) -> ProgressReport {
        let (value, max, started, preview) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let (value, max) = state.totals();
            let preview = if skip_preview { None } else { state.preview.clone() };
            (value, max, state.started, preview)
        };

        let progress = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
        let eta_relative = match started {
            Some(t) if value > 0.0 => t.elapsed().as_secs_f64() * (max - value).max(0.0) / value,
            _ => 0.0,
        };

        // Encode outside the lock; previews can be large
        let current_image = preview.and_then(|img| match codec::encode_preview(&img) {
            Ok(b64) => Some(b64),
            Err(e) => {
                warn!("Failed to encode progress preview: {}", e);
                None
            }
        });

        ProgressReport {
            progress,
            eta_relative,
            current_image,
        }
    }
}

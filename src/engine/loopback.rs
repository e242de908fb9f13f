//! Reference execution engine that renders placeholder images in-process.
//!
//! Consumes [`JobSubmission`]s on a single named worker thread. Each job is
//! looked up, walked through `steps` progress callbacks with a preview per step,
//! and finalized with an output shaped like the real generator's.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use log::{debug, error, trace, warn};
use serde_json::{Value, json};

use crate::codec;
use crate::core::error::{BridgeError, Result};
use crate::core::params::{
    self, CaptionResponse, ImagesResponse, Img2ImgParams, InterrogateParams, Txt2ImgParams,
    UpscaleParams,
};
use crate::core::dispatch::JobSubmission;
use crate::core::progress::ProgressTracker;
use crate::core::request::{BridgeRequest, RequestId};
use crate::core::routes::CommandPath;
use crate::core::shared::BridgeShared;

/// Largest edge the engine will render or upscale to.
const MAX_EDGE: u32 = 4096;
/// Upper bound on images per request.
const MAX_IMAGES: i64 = 64;
/// How often an idle worker checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub steps: u32,
    pub step_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            step_delay: Duration::from_millis(50),
        }
    }
}

pub struct LoopbackEngine {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl LoopbackEngine {
    /// Spawn the worker. It runs until dropped or every sender of `jobs` is gone.
    pub fn spawn(
        shared: Arc<BridgeShared>,
        jobs: Receiver<JobSubmission>,
        config: EngineConfig,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("sdapi-loopback-engine".into())
            .spawn(move || {
                trace!("Loopback engine started");
                while !stop.load(Ordering::Relaxed) {
                    match jobs.recv_timeout(POLL_INTERVAL) {
                        Ok(job) => run_job(&shared, &job, config),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                trace!("Loopback engine stopped");
            })?;
        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Loopback engine thread panicked");
            }
        }
    }
}

fn run_job(shared: &BridgeShared, job: &JobSubmission, config: EngineConfig) {
    let id = job.request_id;
    let Some(request) = shared.checkout(id) else {
        warn!("Job for request {} arrived after it left the table, skipping", id);
        return;
    };
    debug!("Running {} for request {} (owner {:?})", request.command(), id, job.job_owner);

    let progress = shared.progress();
    progress.reset();
    let output = guarded(id, || execute(&request, progress, config));

    if let Err(e) = shared.finalize(id, output) {
        debug!("Result for request {} dropped: {}", id, e);
    }
}

/// Run one job body. Errors and panics both become `{"error": ...}` so the
/// waiting handler is always released and the worker keeps serving.
fn guarded<F>(id: RequestId, job: F) -> Value
where
    F: FnOnce() -> Result<Value>,
{
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Request {} failed: {}", id, e);
            json!({ "error": e.to_string() })
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Request {} panicked: {}", id, reason);
            json!({ "error": format!("Job panicked: {}", reason) })
        }
    }
}

fn execute(request: &BridgeRequest, progress: &ProgressTracker, config: EngineConfig) -> Result<Value> {
    let output = match request.command() {
        CommandPath::Txt2Img => {
            let p: Txt2ImgParams = params::parse(request.payload())?;
            let prompt = styled_prompt(request, &p.prompt, &p.styles);
            let (w, h) = (edge(p.width)?, edge(p.height)?);
            let base = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            render_batch(&base, None, 1.0, &prompt, p.seed, p.batch_size.saturating_mul(p.n_iter), progress, config)?
        }
        CommandPath::Img2Img => {
            let p: Img2ImgParams = params::parse(request.payload())?;
            let prompt = styled_prompt(request, &p.prompt, &p.styles);
            let init = codec::decode_image(p.init_image()?)?;
            let mask = if p.mask.is_empty() {
                None
            } else {
                let mask = codec::decode_mask(&p.mask)?;
                Some(if mask.dimensions() == init.dimensions() {
                    mask
                } else {
                    imageops::resize(&mask, init.width(), init.height(), FilterType::Triangle)
                })
            };
            let strength = p.denoising_strength.clamp(0.0, 1.0);
            render_batch(&init, mask.as_ref(), strength, &prompt, p.seed, p.batch_size.saturating_mul(p.n_iter), progress, config)?
        }
        CommandPath::Upscale => {
            let p: UpscaleParams = params::parse(request.payload())?;
            let img = codec::decode_image(&p.image)?;
            step_through(progress, config, Some(&img));
            let scaled = upscale(&img, p.upscaling_resize, p.upscaler_1.as_deref())?;
            serde_json::to_value(params::UpscaleResponse { image: codec::encode_png(&scaled)? })?
        }
        CommandPath::Interrogate => {
            let p: InterrogateParams = params::parse(request.payload())?;
            let img = codec::decode_image(&p.image)?;
            step_through(progress, config, None);
            serde_json::to_value(CaptionResponse { caption: describe(&img) })?
        }
        // Acknowledged by the listener, never queued
        CommandPath::Options => json!({}),
    };
    Ok(output)
}

/// Prompt with every selected, defined style appended.
fn styled_prompt(request: &BridgeRequest, prompt: &str, styles: &[String]) -> String {
    styles
        .iter()
        .filter_map(|name| request.style(name))
        .filter(|style| !style.prompt.is_empty())
        .fold(prompt.to_string(), |acc, style| {
            if acc.is_empty() { style.prompt } else { format!("{}, {}", acc, style.prompt) }
        })
}

fn edge(v: i64) -> Result<u32> {
    match u32::try_from(v) {
        Ok(e) if (1..=MAX_EDGE).contains(&e) => Ok(e),
        _ => Err(BridgeError::MalformedPayload(format!(
            "image size {} outside 1..={}",
            v, MAX_EDGE
        ))),
    }
}

fn resolve_seed(seed: i64) -> i64 {
    if seed >= 0 {
        return seed;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    i64::from(nanos & 0x7fff_ffff)
}

/// `count` seeds starting at `first`. Fails when the last one would pass `i64::MAX`.
fn consecutive_seeds(first: i64, count: i64) -> Result<Vec<i64>> {
    (0..count)
        .map(|i| {
            first.checked_add(i).ok_or_else(|| {
                BridgeError::MalformedPayload(format!("seed {} leaves no room for {} images", first, count))
            })
        })
        .collect()
}

/// Report `config.steps` ticks; each tick publishes `preview` when given.
fn step_through(progress: &ProgressTracker, config: EngineConfig, preview: Option<&DynamicImage>) {
    let steps = config.steps.max(1);
    for step in 1..=steps {
        if !config.step_delay.is_zero() {
            thread::sleep(config.step_delay);
        }
        progress.record_progress(f64::from(step), f64::from(steps));
        if let Some(img) = preview {
            progress.record_preview(img.clone());
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn render_batch(
    base: &DynamicImage,
    mask: Option<&image::GrayImage>,
    strength: f64,
    prompt: &str,
    seed: i64,
    count: i64,
    progress: &ProgressTracker,
    config: EngineConfig,
) -> Result<Value> {
    if !(1..=MAX_IMAGES).contains(&count) {
        return Err(BridgeError::MalformedPayload(format!(
            "batch_size * n_iter = {} outside 1..={}",
            count, MAX_IMAGES
        )));
    }
    let seeds = consecutive_seeds(resolve_seed(seed), count)?;

    // One job reports a single rising ratio across all of its images
    let steps = f64::from(config.steps.max(1));
    let total = steps * seeds.len() as f64;
    let base = base.to_rgb8();
    let mut images = Vec::with_capacity(seeds.len());
    for (index, &seed) in seeds.iter().enumerate() {
        let target = placeholder(base.width(), base.height(), prompt, seed);
        for step in 1..=config.steps.max(1) {
            if !config.step_delay.is_zero() {
                thread::sleep(config.step_delay);
            }
            let step = f64::from(step);
            let t = strength * step / steps;
            progress.record_progress(index as f64 * steps + step, total);
            progress.record_preview(DynamicImage::ImageRgb8(blend(&base, &target, mask, t)));
        }
        let done = DynamicImage::ImageRgb8(blend(&base, &target, mask, strength));
        images.push(codec::encode_png(&done)?);
    }
    Ok(serde_json::to_value(ImagesResponse::new(images, &seeds))?)
}

/// Diagonal gradient whose colours are derived from the prompt and seed.
fn placeholder(w: u32, h: u32, prompt: &str, seed: i64) -> RgbImage {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    seed.hash(&mut hasher);
    let bits = hasher.finish().to_le_bytes();
    let (from, to) = ([bits[0], bits[1], bits[2]], [bits[3], bits[4], bits[5]]);

    let span = (w + h).saturating_sub(2).max(1) as f32;
    RgbImage::from_fn(w, h, |x, y| {
        let t = (x + y) as f32 / span;
        Rgb(std::array::from_fn(|c| lerp(from[c], to[c], t)))
    })
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round().clamp(0.0, 255.0) as u8
}

/// Mix `target` into `base` by `t`, only where the mask is white (everywhere without one).
fn blend(base: &RgbImage, target: &RgbImage, mask: Option<&image::GrayImage>, t: f64) -> RgbImage {
    let t = t as f32;
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let weight = mask.map_or(1.0, |m| f32::from(m.get_pixel(x, y)[0]) / 255.0) * t;
        let (b, g) = (base.get_pixel(x, y), target.get_pixel(x, y));
        Rgb(std::array::from_fn(|c| lerp(b[c], g[c], weight)))
    })
}

fn upscale(img: &DynamicImage, factor: f64, upscaler: Option<&str>) -> Result<DynamicImage> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(BridgeError::MalformedPayload(format!("upscaling_resize {} must be positive", factor)));
    }
    let scaled = |v: u32| ((f64::from(v) * factor).round() as u32).clamp(1, MAX_EDGE);
    let filter = match upscaler {
        Some("None") => FilterType::Nearest,
        _ => FilterType::Lanczos3,
    };
    Ok(img.resize_exact(scaled(img.width()), scaled(img.height()), filter))
}

fn describe(img: &DynamicImage) -> String {
    let rgb = img.to_rgb8();
    let pixels = u64::from(rgb.width()) * u64::from(rgb.height());
    let sums = rgb.pixels().fold([0u64; 3], |mut acc, p| {
        for c in 0..3 {
            acc[c] += u64::from(p[c]);
        }
        acc
    });
    let avg: [u64; 3] = std::array::from_fn(|c| sums[c] / pixels.max(1));
    format!(
        "a {}x{} image, average colour #{:02x}{:02x}{:02x}",
        rgb.width(),
        rgb.height(),
        avg[0],
        avg[1],
        avg[2]
    )
}

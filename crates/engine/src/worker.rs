//! The encoder worker thread.
//!
//! Frames arrive in submission order but are written in frame-index
//! order. A frame's delay is the gap to its successor's timestamp, so a
//! frame stays queued until the next index shows up (or until finish).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, SyncSender};

use gifstream_common::error::StatusCode;
use image::imageops::FilterType;

use crate::ffi::{ProgressCallback, Registered, WriteCallback, PROGRESS_ABORT};
use crate::writer::{CallbackOutput, CallbackWriter};
use crate::EngineSettings;

/// Delay used for a lone or trailing frame, in hundredths of a second.
const DEFAULT_DELAY_CS: u16 = 10;

/// Browsers clamp anything shorter than this.
const MIN_DELAY_CS: u16 = 2;

/// A frame handed from the caller's thread to the worker.
pub(crate) struct FrameJob {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub timestamp: f64,
    pub reply: SyncSender<StatusCode>,
}

struct QueuedFrame {
    frame: gif::Frame<'static>,
    timestamp: f64,
}

pub(crate) struct EncoderWorker {
    settings: EngineSettings,
    output: Rc<RefCell<CallbackOutput>>,
    progress: Option<Registered<ProgressCallback>>,
    encoder: Option<gif::Encoder<CallbackWriter>>,
    canvas: Option<(u16, u16)>,
    queue: BTreeMap<u32, QueuedFrame>,
    next_index: u32,
    last_delay: u16,
    frames_written: u64,
    failed: bool,
}

/// Worker thread entry point. Returns the status of the final flush.
pub(crate) fn run(
    settings: EngineSettings,
    write: Registered<WriteCallback>,
    progress: Option<Registered<ProgressCallback>>,
    jobs: Receiver<FrameJob>,
) -> StatusCode {
    let span = tracing::debug_span!(
        "encoder",
        quality = settings.quality,
        fast = settings.fast,
        once = settings.once
    );
    let _entered = span.enter();
    let mut worker = EncoderWorker::new(settings, write, progress);

    for job in jobs {
        let reply = job.reply.clone();
        let status = worker.accept(job);
        // The submitter may have given up waiting; nothing else to tell.
        let _ = reply.send(status);
    }

    worker.finish()
}

impl EncoderWorker {
    fn new(
        settings: EngineSettings,
        write: Registered<WriteCallback>,
        progress: Option<Registered<ProgressCallback>>,
    ) -> Self {
        Self {
            settings,
            output: CallbackOutput::new(write),
            progress,
            encoder: None,
            canvas: None,
            queue: BTreeMap::new(),
            next_index: 0,
            last_delay: DEFAULT_DELAY_CS,
            frames_written: 0,
            failed: false,
        }
    }

    fn accept(&mut self, job: FrameJob) -> StatusCode {
        if self.failed {
            return StatusCode::Aborted;
        }
        if job.index < self.next_index || self.queue.contains_key(&job.index) {
            tracing::warn!(index = job.index, "Frame index already submitted");
            return StatusCode::InvalidInput;
        }

        // A frame the canvas cannot hold is rejected without touching the stream.
        let canvas = match self.canvas {
            Some(canvas) => canvas,
            None => match self.canvas_for(job.width, job.height) {
                Some(canvas) => canvas,
                None => return StatusCode::InvalidInput,
            },
        };
        let (width, height) = match self.ensure_encoder(canvas) {
            Ok(canvas) => canvas,
            Err(code) => return self.fail(code),
        };

        let Some(mut pixels) = fit_to_canvas(
            job.pixels,
            (job.width, job.height),
            (u32::from(width), u32::from(height)),
            self.filter(),
        ) else {
            return StatusCode::InvalidInput;
        };

        let frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, self.speed());
        self.queue.insert(
            job.index,
            QueuedFrame {
                frame,
                timestamp: job.timestamp,
            },
        );
        tracing::debug!(index = job.index, queued = self.queue.len(), "Frame quantized");

        if let Some(progress) = self.progress {
            if progress.notify() == PROGRESS_ABORT {
                tracing::debug!(index = job.index, "Progress callback requested abort");
                return self.fail(StatusCode::Aborted);
            }
        }

        match self.write_ready() {
            Ok(()) => StatusCode::Success,
            Err(code) => self.fail(code),
        }
    }

    fn finish(mut self) -> StatusCode {
        if self.failed {
            // The failure was already reported by the call that caused it.
            return StatusCode::Success;
        }
        if self.encoder.is_none() {
            tracing::debug!("No frames were submitted; nothing to flush");
            return StatusCode::Success;
        }

        let remaining = std::mem::take(&mut self.queue);
        let mut frames = remaining.into_values().peekable();
        while let Some(queued) = frames.next() {
            let delay = match frames.peek() {
                Some(next) => delay_centis(queued.timestamp, next.timestamp),
                None => self.last_delay,
            };
            if let Err(code) = self.write_frame(queued, delay) {
                return self.fail(code);
            }
        }

        if let Some(encoder) = self.encoder.take() {
            // Consuming the encoder writes the trailer.
            if let Err(err) = encoder.into_inner() {
                tracing::debug!(error = %err, "Failed to write GIF trailer");
                let code = self.output_failure();
                return self.fail(code);
            }
        }
        let emitted = self.output.borrow_mut().emit();
        if let Err(code) = emitted {
            return self.fail(code);
        }

        tracing::debug!(frames = self.frames_written, "Encoder flushed");
        StatusCode::Success
    }

    /// Canvas size for the first frame: the target size if set, otherwise
    /// the frame's own size. `None` if GIF cannot represent it.
    fn canvas_for(&self, width: u32, height: u32) -> Option<(u16, u16)> {
        let (canvas_w, canvas_h) = if self.settings.width > 0 {
            let h = if self.settings.height > 0 {
                self.settings.height
            } else {
                height
            };
            (self.settings.width, h)
        } else {
            (width, height)
        };
        match (u16::try_from(canvas_w), u16::try_from(canvas_h)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => {
                tracing::warn!(canvas_w, canvas_h, "Canvas exceeds GIF dimension limits");
                None
            }
        }
    }

    /// Create the encoder on the first frame, writing the stream header.
    fn ensure_encoder(&mut self, (w, h): (u16, u16)) -> Result<(u16, u16), StatusCode> {
        if let Some(canvas) = self.canvas {
            return Ok(canvas);
        }

        let writer = CallbackWriter(self.output.clone());
        let mut encoder = match gif::Encoder::new(writer, w, h, &[]) {
            Ok(encoder) => encoder,
            Err(err) => {
                tracing::debug!(error = %err, "Failed to write GIF header");
                return Err(self.output_failure());
            }
        };
        if !self.settings.once {
            if let Err(err) = encoder.set_repeat(gif::Repeat::Infinite) {
                tracing::debug!(error = %err, "Failed to write loop extension");
                return Err(self.output_failure());
            }
        }
        self.encoder = Some(encoder);
        self.canvas = Some((w, h));
        self.output.borrow_mut().emit()?;

        tracing::debug!(width = w, height = h, "GIF stream started");
        Ok((w, h))
    }

    /// Write every queued frame whose delay is now known.
    fn write_ready(&mut self) -> Result<(), StatusCode> {
        loop {
            let Some(successor) = self.next_index.checked_add(1) else {
                return Ok(());
            };
            let Some(next_timestamp) = self.queue.get(&successor).map(|q| q.timestamp) else {
                return Ok(());
            };
            let Some(queued) = self.queue.remove(&self.next_index) else {
                return Ok(());
            };
            let delay = delay_centis(queued.timestamp, next_timestamp);
            self.write_frame(queued, delay)?;
        }
    }

    fn write_frame(&mut self, queued: QueuedFrame, delay: u16) -> Result<(), StatusCode> {
        let mut frame = queued.frame;
        frame.delay = delay;

        let Some(encoder) = self.encoder.as_mut() else {
            return Err(StatusCode::InvalidState);
        };
        if let Err(err) = encoder.write_frame(&frame) {
            tracing::debug!(error = %err, "Failed to write frame");
            return Err(self.output_failure());
        }
        self.output.borrow_mut().emit()?;

        self.last_delay = delay;
        self.frames_written += 1;
        self.next_index = self.next_index.saturating_add(1);
        Ok(())
    }

    fn fail(&mut self, code: StatusCode) -> StatusCode {
        self.failed = true;
        self.queue.clear();
        // Dropping the encoder would otherwise append a trailer.
        self.output.borrow_mut().abort();
        self.encoder = None;
        code
    }

    /// Status for an encoder error: the callback's verdict if it caused it.
    fn output_failure(&self) -> StatusCode {
        self.output
            .borrow()
            .failure()
            .unwrap_or(StatusCode::FormatComposeFailure)
    }

    fn speed(&self) -> i32 {
        quantizer_speed(self.settings.quality, self.settings.fast)
    }

    fn filter(&self) -> FilterType {
        if self.settings.fast {
            FilterType::Triangle
        } else {
            FilterType::Lanczos3
        }
    }
}

/// Map quality 1-100 onto the quantizer's speed range 30-1.
fn quantizer_speed(quality: u8, fast: bool) -> i32 {
    let quality = i32::from(quality.clamp(1, 100));
    let speed = 1 + (100 - quality) * 29 / 99;
    if fast {
        (speed + 10).min(30)
    } else {
        speed
    }
}

fn delay_centis(current: f64, next: f64) -> u16 {
    let centis = ((next - current) * 100.0).round();
    if !centis.is_finite() || centis < f64::from(MIN_DELAY_CS) {
        MIN_DELAY_CS
    } else {
        centis.min(f64::from(u16::MAX)) as u16
    }
}

fn fit_to_canvas(
    pixels: Vec<u8>,
    (width, height): (u32, u32),
    (canvas_w, canvas_h): (u32, u32),
    filter: FilterType,
) -> Option<Vec<u8>> {
    if (width, height) == (canvas_w, canvas_h) {
        return Some(pixels);
    }
    let source = image::RgbaImage::from_raw(width, height, pixels)?;
    Some(image::imageops::resize(&source, canvas_w, canvas_h, filter).into_raw())
}

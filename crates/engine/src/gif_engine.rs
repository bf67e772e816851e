//! Bundled GIF engine.
//!
//! Encodes on a dedicated worker thread using the `gif` crate's
//! quantizer and writer, resizing with `image` when a target size is set.

use std::sync::mpsc::{self, SyncSender};
use std::thread::JoinHandle;

use gifstream_common::error::StatusCode;
use libc::{c_int, c_void};

use crate::ffi::{ProgressCallback, Registered, WriteCallback};
use crate::worker::{self, FrameJob};
use crate::{EngineSettings, NativeEngine};

struct WorkerHandle {
    jobs: SyncSender<FrameJob>,
    thread: JoinHandle<StatusCode>,
}

/// GIF engine driving an encoder worker thread.
pub struct GifEngine {
    settings: EngineSettings,
    write: Option<Registered<WriteCallback>>,
    progress: Option<Registered<ProgressCallback>>,
    worker: Option<WorkerHandle>,
    frames_submitted: u64,
}

impl GifEngine {
    /// Frames accepted by `add_frame_rgba` so far.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    fn spawn_worker(&mut self, write: Registered<WriteCallback>) -> Result<(), StatusCode> {
        // Zero capacity: the hand-off completes only when the worker takes the frame.
        let (jobs, rx) = mpsc::sync_channel(0);
        let settings = self.settings;
        let progress = self.progress;
        let thread = std::thread::Builder::new()
            .name("gifstream-encoder".to_string())
            .spawn(move || worker::run(settings, write, progress, rx))
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to spawn encoder worker");
                StatusCode::ConcurrencyFailure
            })?;

        tracing::debug!("Encoder worker started");
        self.worker = Some(WorkerHandle { jobs, thread });
        Ok(())
    }

    fn shutdown(&mut self) -> StatusCode {
        let Some(worker) = self.worker.take() else {
            return StatusCode::Success;
        };
        // Closing the job channel tells the worker to flush and exit.
        drop(worker.jobs);
        match worker.thread.join() {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!("Encoder worker panicked");
                StatusCode::ConcurrencyFailure
            }
        }
    }
}

impl NativeEngine for GifEngine {
    fn create(settings: &EngineSettings) -> Option<Self> {
        if !(1..=100).contains(&settings.quality) {
            tracing::warn!(quality = settings.quality, "Engine refused quality setting");
            return None;
        }
        Some(Self {
            settings: *settings,
            write: None,
            progress: None,
            worker: None,
            frames_submitted: 0,
        })
    }

    fn set_write_callback(&mut self, callback: WriteCallback, user_data: *mut c_void) -> c_int {
        if self.write.is_some() || self.worker.is_some() {
            return StatusCode::InvalidState.to_raw();
        }
        self.write = Some(Registered {
            callback,
            user_data,
        });
        StatusCode::OK
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback, user_data: *mut c_void) {
        if self.worker.is_some() {
            tracing::warn!("Progress callback registered after encoding started; ignoring");
            return;
        }
        self.progress = Some(Registered {
            callback,
            user_data,
        });
    }

    fn add_frame_rgba(
        &mut self,
        index: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
        timestamp: f64,
    ) -> c_int {
        let Some(write) = self.write else {
            return StatusCode::InvalidState.to_raw();
        };

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if width == 0 || height == 0 || expected != Some(pixels.len()) {
            tracing::warn!(index, width, height, len = pixels.len(), "Rejected frame buffer");
            return StatusCode::InvalidInput.to_raw();
        }
        if !timestamp.is_finite() || timestamp < 0.0 {
            tracing::warn!(index, timestamp, "Rejected frame timestamp");
            return StatusCode::InvalidInput.to_raw();
        }

        if self.worker.is_none() {
            if let Err(code) = self.spawn_worker(write) {
                return code.to_raw();
            }
        }
        let Some(worker) = self.worker.as_ref() else {
            return StatusCode::ConcurrencyFailure.to_raw();
        };

        let (reply, status) = mpsc::sync_channel(1);
        let job = FrameJob {
            index,
            width,
            height,
            pixels: pixels.to_vec(),
            timestamp,
            reply,
        };
        if worker.jobs.send(job).is_err() {
            return StatusCode::ConcurrencyFailure.to_raw();
        }

        let status = status.recv().unwrap_or(StatusCode::ConcurrencyFailure);
        if status.is_success() {
            self.frames_submitted += 1;
        }
        status.to_raw()
    }

    fn finish(mut self) -> c_int {
        let status = self.shutdown();
        tracing::debug!(frames = self.frames_submitted, %status, "Engine finished");
        status.to_raw()
    }
}

impl Drop for GifEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            tracing::warn!("Engine dropped without finish; flushing");
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::size_t;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // Each test gets its own slot, addressed through `user_data`.
    static OUTPUT: [Mutex<Vec<u8>>; 5] = [
        Mutex::new(Vec::new()),
        Mutex::new(Vec::new()),
        Mutex::new(Vec::new()),
        Mutex::new(Vec::new()),
        Mutex::new(Vec::new()),
    ];
    static PROGRESS_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn collect(len: size_t, buf: *const u8, user_data: *mut c_void) -> c_int {
        let chunk = std::slice::from_raw_parts(buf, len);
        OUTPUT[user_data as usize].lock().unwrap().extend_from_slice(chunk);
        0
    }

    unsafe extern "C" fn count(_user_data: *mut c_void) -> c_int {
        PROGRESS_CALLS.fetch_add(1, Ordering::SeqCst);
        1
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            width: 0,
            height: 0,
            quality: 80,
            once: false,
            fast: true,
        }
    }

    fn solid_frame(width: u32, height: u32) -> Vec<u8> {
        [200u8, 40, 40, 255].repeat((width * height) as usize)
    }

    #[test]
    fn test_create_rejects_bad_quality() {
        let mut bad = settings();
        bad.quality = 0;
        assert!(GifEngine::create(&bad).is_none());
        bad.quality = 101;
        assert!(GifEngine::create(&bad).is_none());
    }

    #[test]
    fn test_frame_before_write_callback_is_invalid_state() {
        let mut engine = GifEngine::create(&settings()).unwrap();
        let status = engine.add_frame_rgba(0, 2, 2, &solid_frame(2, 2), 0.0);
        assert_eq!(StatusCode::from_raw(status), StatusCode::InvalidState);
        assert_eq!(engine.finish(), StatusCode::OK);
    }

    #[test]
    fn test_write_callback_registers_once() {
        let mut engine = GifEngine::create(&settings()).unwrap();
        assert_eq!(engine.set_write_callback(collect, 0 as *mut c_void), 0);
        let status = engine.set_write_callback(collect, 0 as *mut c_void);
        assert_eq!(StatusCode::from_raw(status), StatusCode::InvalidState);
        assert_eq!(engine.finish(), StatusCode::OK);
    }

    #[test]
    fn test_mismatched_buffer_is_invalid_input() {
        let mut engine = GifEngine::create(&settings()).unwrap();
        engine.set_write_callback(collect, 1 as *mut c_void);
        let status = engine.add_frame_rgba(0, 2, 2, &[0u8; 15], 0.0);
        assert_eq!(StatusCode::from_raw(status), StatusCode::InvalidInput);
        assert_eq!(engine.finish(), StatusCode::OK);
        assert!(OUTPUT[1].lock().unwrap().is_empty());
    }

    #[test]
    fn test_encodes_frames_out_of_order() {
        let mut engine = GifEngine::create(&settings()).unwrap();
        engine.set_write_callback(collect, 2 as *mut c_void);
        engine.set_progress_callback(count, std::ptr::null_mut());

        let pixels = solid_frame(3, 2);
        assert_eq!(engine.add_frame_rgba(1, 3, 2, &pixels, 0.5), 0);
        assert_eq!(engine.add_frame_rgba(0, 3, 2, &pixels, 0.0), 0);
        assert_eq!(engine.add_frame_rgba(2, 3, 2, &pixels, 1.0), 0);
        let duplicate = engine.add_frame_rgba(2, 3, 2, &pixels, 1.0);
        assert_eq!(StatusCode::from_raw(duplicate), StatusCode::InvalidInput);
        assert_eq!(engine.frames_submitted(), 3);
        assert_eq!(engine.finish(), 0);

        let output = OUTPUT[2].lock().unwrap();
        assert!(output.starts_with(b"GIF89a"));
        assert_eq!(output.last(), Some(&0x3B));
        assert_eq!(PROGRESS_CALLS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_resizes_to_target_canvas() {
        let mut resized = settings();
        resized.width = 4;
        resized.height = 3;
        let mut engine = GifEngine::create(&resized).unwrap();
        engine.set_write_callback(collect, 3 as *mut c_void);
        assert_eq!(engine.add_frame_rgba(0, 8, 8, &solid_frame(8, 8), 0.0), 0);
        assert_eq!(engine.finish(), 0);

        let output = OUTPUT[3].lock().unwrap();
        // Logical screen width and height, little endian, right after the signature.
        assert_eq!(&output[6..10], &[4, 0, 3, 0]);
    }

    #[test]
    fn test_oversized_first_frame_does_not_poison_engine() {
        let mut engine = GifEngine::create(&settings()).unwrap();
        engine.set_write_callback(collect, 4 as *mut c_void);

        let wide = solid_frame(70_000, 1);
        let status = engine.add_frame_rgba(0, 70_000, 1, &wide, 0.0);
        assert_eq!(StatusCode::from_raw(status), StatusCode::InvalidInput);
        assert!(OUTPUT[4].lock().unwrap().is_empty());

        assert_eq!(engine.add_frame_rgba(0, 2, 2, &solid_frame(2, 2), 0.0), 0);
        assert_eq!(engine.finish(), 0);

        let output = OUTPUT[4].lock().unwrap();
        assert!(output.starts_with(b"GIF89a"));
        assert_eq!(&output[6..10], &[2, 0, 2, 0]);
        assert_eq!(output.last(), Some(&0x3B));
    }
}

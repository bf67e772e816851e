//! Scripted engine for exercising the session layer in isolation.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gifstream_common::error::StatusCode;
use gifstream_engine::{EngineSettings, NativeEngine, ProgressCallback, WriteCallback};
use libc::{c_int, c_void};

/// What the next `ScriptedEngine::create` on this thread will do.
#[derive(Clone, Default)]
pub(crate) struct Script {
    /// Refuse creation outright.
    pub refuse_create: bool,
    /// Status returned from `set_write_callback`.
    pub registration_status: Option<StatusCode>,
    /// Chunks written per submitted frame.
    pub chunks_per_frame: Vec<Vec<u8>>,
    /// Chunks written during finish.
    pub finish_chunks: Vec<Vec<u8>>,
    /// Progress callbacks fired per frame, by submission order.
    /// Frames past the end fire one callback.
    pub progress_per_frame: Vec<usize>,
    /// Shared counter of `finish` calls.
    pub finish_calls: Arc<AtomicUsize>,
}

thread_local! {
    static NEXT_SCRIPT: RefCell<Option<Script>> = const { RefCell::new(None) };
}

pub(crate) fn install(script: Script) {
    NEXT_SCRIPT.with(|next| *next.borrow_mut() = Some(script));
}

#[derive(Clone, Copy)]
struct Callback<F> {
    callback: F,
    user_data: usize,
}

/// Engine that replays a [`Script`], firing callbacks from its own thread.
pub(crate) struct ScriptedEngine {
    script: Script,
    write: Option<Callback<WriteCallback>>,
    progress: Option<Callback<ProgressCallback>>,
    frames: usize,
}

impl ScriptedEngine {
    /// Write chunks and fire progress on a separate thread, like a real engine.
    fn run_on_worker(&self, chunks: &[Vec<u8>], progress_calls: usize) -> StatusCode {
        let write = self.write;
        let progress = self.progress;
        std::thread::scope(|s| {
            s.spawn(move || {
                if let Some(write) = write {
                    for chunk in chunks {
                        let status = unsafe {
                            (write.callback)(
                                chunk.len(),
                                chunk.as_ptr(),
                                write.user_data as *mut c_void,
                            )
                        };
                        if status != StatusCode::OK {
                            return StatusCode::Aborted;
                        }
                    }
                }
                if let Some(progress) = progress {
                    for _ in 0..progress_calls {
                        unsafe { (progress.callback)(progress.user_data as *mut c_void) };
                    }
                }
                StatusCode::Success
            })
            .join()
            .unwrap_or(StatusCode::ConcurrencyFailure)
        })
    }
}

impl NativeEngine for ScriptedEngine {
    fn create(_settings: &EngineSettings) -> Option<Self> {
        let script = NEXT_SCRIPT.with(|next| next.borrow_mut().take()).unwrap_or_default();
        if script.refuse_create {
            return None;
        }
        Some(Self {
            script,
            write: None,
            progress: None,
            frames: 0,
        })
    }

    fn set_write_callback(&mut self, callback: WriteCallback, user_data: *mut c_void) -> c_int {
        if let Some(status) = self.script.registration_status {
            return status.to_raw();
        }
        self.write = Some(Callback {
            callback,
            user_data: user_data as usize,
        });
        StatusCode::OK
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback, user_data: *mut c_void) {
        self.progress = Some(Callback {
            callback,
            user_data: user_data as usize,
        });
    }

    fn add_frame_rgba(
        &mut self,
        _index: u32,
        _width: u32,
        _height: u32,
        _pixels: &[u8],
        _timestamp: f64,
    ) -> c_int {
        let progress_calls = self
            .script
            .progress_per_frame
            .get(self.frames)
            .copied()
            .unwrap_or(1);
        self.frames += 1;
        let chunks = self.script.chunks_per_frame.clone();
        self.run_on_worker(&chunks, progress_calls).to_raw()
    }

    fn finish(self) -> c_int {
        self.script.finish_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self.script.finish_chunks.clone();
        self.run_on_worker(&chunks, 0).to_raw()
    }
}

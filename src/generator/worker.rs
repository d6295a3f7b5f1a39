//! Generation lanes - one worker thread per artifact kind

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;

use flume::{Receiver, Sender};
use image::RgbImage;
use log::{debug, error};

use super::page::{PageInfo, TextPage};
use super::request::{PixmapRequest, RequestKind, TextPageRequest};
use super::traits::Generator;
use crate::notification::Notifier;
use crate::settings;

/// Backend shared between the dispatcher and its lanes.
///
/// Lanes hold the read lock while a primitive runs; loading, closing and
/// state notifications take the write lock.
pub(crate) type SharedGenerator = Arc<RwLock<Box<dyn Generator>>>;

/// Result of running one job, sent back to the dispatcher
pub(crate) enum LaneOutput {
    Pixmap {
        request: PixmapRequest,
        image: Option<RgbImage>,
        /// Page generation the image was rendered for
        generation: u64,
    },
    TextPage {
        request: TextPageRequest,
        text: Option<TextPage>,
    },
}

/// Work unit a lane can execute
pub(crate) trait LaneTask: Send + 'static {
    fn run(self, generator: &dyn Generator, notifier: &Notifier) -> LaneOutput;
}

pub(crate) struct PixmapJob {
    pub request: PixmapRequest,
    pub page: PageInfo,
}

impl LaneTask for PixmapJob {
    fn run(self, generator: &dyn Generator, notifier: &Notifier) -> LaneOutput {
        let Self { request, page } = self;
        let image = guarded(&format!("{request:?}"), notifier, || {
            generator.image(&request, &page, notifier)
        });
        LaneOutput::Pixmap {
            request,
            image,
            generation: page.generation,
        }
    }
}

pub(crate) struct TextJob {
    pub request: TextPageRequest,
    pub page: PageInfo,
}

impl LaneTask for TextJob {
    fn run(self, generator: &dyn Generator, notifier: &Notifier) -> LaneOutput {
        let Self { request, page } = self;
        let text = guarded(&format!("{request:?}"), notifier, || {
            generator.text_page(&page, notifier)
        });
        LaneOutput::TextPage { request, text }
    }
}

/// Run a backend primitive, turning a panic into a soft failure
fn guarded<T>(what: &str, notifier: &Notifier, f: impl FnOnce() -> Option<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!("{what} crashed in the backend: {reason}");
            notifier.error(
                format!("Page generation failed: {reason}"),
                settings::get_notice_duration_ms(),
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a task against the shared backend on the current thread
pub(crate) fn run_task<T: LaneTask>(
    task: T,
    generator: &SharedGenerator,
    notifier: &Notifier,
) -> LaneOutput {
    let guard = generator.read().unwrap_or_else(PoisonError::into_inner);
    task.run(&**guard, notifier)
}

/// Main worker loop - runs in the lane's dedicated thread until the job
/// sender is dropped
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
fn lane_worker<T: LaneTask>(
    kind: RequestKind,
    generator: SharedGenerator,
    jobs: Receiver<T>,
    outputs: Sender<LaneOutput>,
    notifier: Notifier,
) {
    debug!("{} lane started", kind.as_str());

    for job in jobs {
        let output = run_task(job, &generator, &notifier);
        if outputs.send(output).is_err() {
            debug!("{} lane: dispatcher gone, stopping", kind.as_str());
            break;
        }
    }

    debug!("{} lane stopped", kind.as_str());
}

/// Single-occupancy execution slot for one artifact kind.
///
/// The busy flag is raised when a job is dispatched and lowered only when
/// its completion is delivered, so readiness covers the whole interval.
pub(crate) struct Lane<T: LaneTask> {
    kind: RequestKind,
    busy: AtomicBool,
    jobs: Option<Sender<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: LaneTask> Lane<T> {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            busy: AtomicBool::new(false),
            jobs: None,
            thread: None,
        }
    }

    /// Start the worker thread
    pub fn spawn(
        &mut self,
        generator: SharedGenerator,
        outputs: Sender<LaneOutput>,
        notifier: Notifier,
    ) -> io::Result<()> {
        if self.jobs.is_some() {
            return Ok(());
        }

        // Capacity one: the busy flag already keeps a second job out
        let (tx, rx) = flume::bounded(1);
        let kind = self.kind;
        let thread = std::thread::Builder::new()
            .name(format!("{}-lane", kind.as_str()))
            .spawn(move || lane_worker(kind, generator, rx, outputs, notifier))?;

        self.jobs = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    pub fn is_threaded(&self) -> bool {
        self.jobs.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the lane; false if it is already occupied
    pub fn occupy(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn vacate(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Hand a job to the worker thread, or give it back if there is none
    pub fn submit(&self, job: T) -> Result<(), T> {
        match &self.jobs {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Stop the worker after its current job and wait for it
    pub fn shutdown(&mut self) {
        self.jobs = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("{} lane thread panicked", self.kind.as_str());
            }
        }
    }
}

impl<T: LaneTask> Drop for Lane<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

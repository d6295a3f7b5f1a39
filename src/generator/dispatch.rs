//! Dispatcher - drives one generator, its lanes and its completion channel

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, error, info, warn};
use serde_json::Value;

use super::export::ExportFormat;
use super::feature::{Feature, FeatureSet};
use super::page::{Page, Rotation, lock_page};
use super::request::{Completion, PixmapRequest, RequestKind, TextPageRequest};
use super::traits::Generator;
use super::types::{
    AboutData, DocumentInfo, DocumentSynopsis, EmbeddedFile, FontInfo, PageSize, PageSizeMetric,
    Permission,
};
use super::worker::{Lane, LaneOutput, LaneTask, PixmapJob, SharedGenerator, TextJob, run_task};
use crate::notification::Notifier;

/// Where a generator is in its life
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Closed,
}

/// Outcome of handing a request to the dispatcher
#[derive(Debug)]
pub enum Dispatch<R> {
    /// Rendered on the caller's thread; the completion is already final
    Completed(Completion),
    /// Running on a lane; the completion arrives through [`Dispatcher::poll`]
    Running,
    /// Not accepted (lane busy, no document, no page attached); the request
    /// is handed back untouched
    Refused(R),
}

impl<R> Dispatch<R> {
    #[must_use]
    pub fn is_refused(&self) -> bool {
        matches!(self, Dispatch::Refused(_))
    }
}

/// Host-side driver of a single [`Generator`].
///
/// Enforces the lifecycle and the one-job-per-lane rule, runs requests inline
/// or on lane threads, and turns lane output into completions. Every method
/// is meant to be called from the orchestrator's own thread: artifacts are
/// stored into pages only here, never from a lane.
pub struct Dispatcher {
    generator: SharedGenerator,
    features: FeatureSet,
    state: LifecycleState,
    pixmap_lane: Lane<PixmapJob>,
    text_lane: Lane<TextJob>,
    output_tx: Sender<LaneOutput>,
    output_rx: Receiver<LaneOutput>,
    notifier: Notifier,
}

impl Dispatcher {
    #[must_use]
    pub fn new(generator: Box<dyn Generator>) -> Self {
        Self::with_notifier(generator, Notifier::new())
    }

    #[must_use]
    pub fn with_notifier(generator: Box<dyn Generator>, notifier: Notifier) -> Self {
        let features = generator.features();
        let (output_tx, output_rx) = flume::unbounded();

        Self {
            generator: Arc::new(RwLock::new(generator)),
            features,
            state: LifecycleState::Unloaded,
            pixmap_lane: Lane::new(RequestKind::Pixmap),
            text_lane: Lane::new(RequestKind::TextPage),
            output_tx,
            output_rx,
            notifier,
        }
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn features(&self) -> FeatureSet {
        self.features
    }

    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.has(feature)
    }

    fn read(&self) -> RwLockReadGuard<'_, Box<dyn Generator>> {
        self.generator.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Generator>> {
        self.generator.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a document from disk, appending its pages to `pages`
    pub fn load_document(&mut self, path: &Path, pages: &mut Vec<Page>) -> bool {
        if self.state != LifecycleState::Unloaded {
            warn!("load_document({path:?}) in state {:?}", self.state);
            return false;
        }

        let loaded = self.write().load_document(path, pages, &self.notifier);
        self.finish_load(loaded, &path.display().to_string(), pages.len())
    }

    /// Load a document from memory. Requires [`Feature::ReadRawData`].
    pub fn load_document_from_data(&mut self, data: &[u8], pages: &mut Vec<Page>) -> bool {
        if self.state != LifecycleState::Unloaded {
            warn!("load_document_from_data in state {:?}", self.state);
            return false;
        }
        if !self.has_feature(Feature::ReadRawData) {
            debug!("Generator cannot read raw data");
            return false;
        }

        let loaded = self
            .write()
            .load_document_from_data(data, pages, &self.notifier);
        self.finish_load(loaded, &format!("<{} bytes>", data.len()), pages.len())
    }

    fn finish_load(&mut self, loaded: bool, source: &str, page_count: usize) -> bool {
        if !loaded {
            error!("Failed to load document {source}");
            return false;
        }

        let features = self.read().features();
        self.features = features;
        self.state = LifecycleState::Loaded;
        info!(
            "Loaded {source}: {page_count} pages, features {:?}",
            self.features
        );

        if self.has_feature(Feature::Threaded) {
            self.start_lanes();
        }
        true
    }

    fn start_lanes(&mut self) {
        let pixmap = self.pixmap_lane.spawn(
            self.generator.clone(),
            self.output_tx.clone(),
            self.notifier.clone(),
        );
        let text = self.text_lane.spawn(
            self.generator.clone(),
            self.output_tx.clone(),
            self.notifier.clone(),
        );

        if let Err(e) = pixmap.and(text) {
            error!("Could not start generation lanes, rendering synchronously: {e}");
            self.pixmap_lane.shutdown();
            self.text_lane.shutdown();
            self.features.set(Feature::Threaded, false);
        }
    }

    /// Close the document. Lanes finish their current job first; those
    /// completions stay available through [`poll`](Self::poll).
    pub fn close_document(&mut self) -> bool {
        if self.state != LifecycleState::Loaded {
            warn!("close_document in state {:?}", self.state);
            return false;
        }

        self.pixmap_lane.shutdown();
        self.text_lane.shutdown();
        self.state = LifecycleState::Closed;

        let closed = self.write().close_document();
        if !closed {
            warn!("Generator reported a failure while closing");
        }
        closed
    }

    /// Whether a new pixmap request would be accepted right now
    #[must_use]
    pub fn can_generate_pixmap(&self) -> bool {
        self.state == LifecycleState::Loaded && !self.pixmap_lane.is_busy()
    }

    /// Whether a new text page request would be accepted right now
    #[must_use]
    pub fn can_generate_text_page(&self) -> bool {
        self.state == LifecycleState::Loaded
            && self.has_feature(Feature::TextExtraction)
            && !self.text_lane.is_busy()
    }

    /// No job in flight on either lane
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.pixmap_lane.is_busy() && !self.text_lane.is_busy()
    }

    pub fn generate_pixmap(&mut self, mut request: PixmapRequest) -> Dispatch<PixmapRequest> {
        if self.state != LifecycleState::Loaded {
            warn!("{request:?} refused: no document loaded");
            return Dispatch::Refused(request);
        }
        let Some(page) = request.page().map(|p| lock_page(p).info()) else {
            warn!("{request:?} refused: no page attached");
            return Dispatch::Refused(request);
        };
        if !self.pixmap_lane.occupy() {
            warn!("{request:?} refused: pixmap lane busy");
            return Dispatch::Refused(request);
        }

        if request.asynchronous() && !self.pixmap_lane.is_threaded() {
            warn!("{request:?}: generator is not threaded, rendering synchronously");
            request.set_asynchronous(false);
        }

        debug!("Dispatching {request:?}");
        let job = PixmapJob { request, page };
        if job.request.asynchronous() {
            return match self.pixmap_lane.submit(job) {
                Ok(()) => Dispatch::Running,
                Err(mut job) => {
                    warn!("{:?}: pixmap lane gone, rendering synchronously", job.request);
                    job.request.set_asynchronous(false);
                    self.run_inline(job)
                }
            };
        }
        self.run_inline(job)
    }

    pub fn generate_text_page(
        &mut self,
        mut request: TextPageRequest,
    ) -> Dispatch<TextPageRequest> {
        if self.state != LifecycleState::Loaded {
            warn!("{request:?} refused: no document loaded");
            return Dispatch::Refused(request);
        }
        if !self.has_feature(Feature::TextExtraction) {
            debug!("{request:?} refused: no text extraction");
            return Dispatch::Refused(request);
        }
        let Some(page) = request.page().map(|p| lock_page(p).info()) else {
            warn!("{request:?} refused: no page attached");
            return Dispatch::Refused(request);
        };
        if !self.text_lane.occupy() {
            warn!("{request:?} refused: text lane busy");
            return Dispatch::Refused(request);
        }

        if request.asynchronous() && !self.text_lane.is_threaded() {
            warn!("{request:?}: generator is not threaded, extracting synchronously");
            request.set_asynchronous(false);
        }

        debug!("Dispatching {request:?}");
        let job = TextJob { request, page };
        if job.request.asynchronous() {
            return match self.text_lane.submit(job) {
                Ok(()) => Dispatch::Running,
                Err(mut job) => {
                    warn!("{:?}: text lane gone, extracting synchronously", job.request);
                    job.request.set_asynchronous(false);
                    self.run_inline(job)
                }
            };
        }
        self.run_inline(job)
    }

    fn run_inline<R, T: LaneTask>(&mut self, job: T) -> Dispatch<R> {
        let output = run_task(job, &self.generator, &self.notifier);
        Dispatch::Completed(self.complete(output))
    }

    /// Store the artifact into its page and free the lane
    fn complete(&mut self, output: LaneOutput) -> Completion {
        match output {
            LaneOutput::Pixmap {
                request,
                image,
                generation,
            } => {
                match (image, request.page()) {
                    (Some(image), Some(page)) => {
                        let mut page = lock_page(page);
                        if page.generation() == generation {
                            page.set_pixmap(request.id(), image);
                        } else {
                            debug!("{request:?}: page layout changed, stale image dropped");
                        }
                    }
                    _ => debug!("{request:?} completed without an image"),
                }
                self.pixmap_lane.vacate();
                debug!("Completed {request:?}");
                Completion::Pixmap(request)
            }
            LaneOutput::TextPage { request, text } => {
                match (text, request.page()) {
                    (Some(text), Some(page)) => lock_page(page).set_text_page(text),
                    _ => debug!("{request:?} completed without text"),
                }
                self.text_lane.vacate();
                debug!("Completed {request:?}");
                Completion::TextPage(request)
            }
        }
    }

    /// Deliver every completion that arrived from the lanes so far
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        while let Ok(output) = self.output_rx.try_recv() {
            completions.push(self.complete(output));
        }
        completions
    }

    /// Like [`poll`](Self::poll), but block up to `timeout` for the first
    /// completion when a lane is busy
    pub fn wait(&mut self, timeout: Duration) -> Vec<Completion> {
        if self.is_idle() {
            return self.poll();
        }

        let mut completions = Vec::new();
        if let Ok(output) = self.output_rx.recv_timeout(timeout) {
            completions.push(self.complete(output));
        }
        completions.extend(self.poll());
        completions
    }

    pub fn document_info(&self) -> Option<DocumentInfo> {
        self.read().document_info()
    }

    pub fn document_synopsis(&self) -> Option<DocumentSynopsis> {
        self.read().document_synopsis()
    }

    pub fn fonts_for_page(&self, page: Option<usize>) -> Vec<FontInfo> {
        if !self.has_feature(Feature::FontInfo) {
            return Vec::new();
        }
        self.read().fonts_for_page(page)
    }

    pub fn embedded_files(&self) -> Vec<EmbeddedFile> {
        self.read().embedded_files()
    }

    pub fn page_size_metric(&self) -> PageSizeMetric {
        self.read().page_size_metric()
    }

    pub fn is_allowed(&self, action: Permission) -> bool {
        self.read().is_allowed(action)
    }

    pub fn page_sizes(&self) -> Vec<PageSize> {
        if !self.has_feature(Feature::PageSizes) {
            return Vec::new();
        }
        self.read().page_sizes()
    }

    /// Forward an orientation change. Waits for running lane jobs.
    pub fn rotation_changed(&mut self, rotation: Rotation, old_rotation: Rotation) {
        self.write().rotation_changed(rotation, old_rotation);
    }

    /// Forward a page size change. Waits for running lane jobs.
    pub fn page_size_changed(&mut self, size: &PageSize, old_size: Option<&PageSize>) {
        if !self.has_feature(Feature::PageSizes) {
            return;
        }
        self.write().page_size_changed(size, old_size);
    }

    pub fn print(&self, destination: &Path) -> bool {
        if self.state != LifecycleState::Loaded || !self.is_allowed(Permission::Print) {
            return false;
        }
        self.read().print(destination)
    }

    pub fn meta_data(&self, key: &str, option: &Value) -> Option<Value> {
        self.read().meta_data(key, option)
    }

    pub fn export_formats(&self) -> Vec<ExportFormat> {
        self.read().export_formats()
    }

    /// Export the loaded document. Formats the generator did not advertise
    /// are refused without touching `destination`.
    pub fn export_to(&self, destination: &Path, format: &ExportFormat) -> bool {
        if self.state != LifecycleState::Loaded {
            warn!("export_to({destination:?}) in state {:?}", self.state);
            return false;
        }

        let generator = self.read();
        if format.is_null() || !generator.export_formats().contains(format) {
            warn!(
                "Export format {:?} is not supported by this generator",
                format.description()
            );
            return false;
        }

        let exported = generator.export_to(destination, format);
        if exported {
            info!("Exported {} to {destination:?}", format.description());
        }
        exported
    }

    pub fn about(&self) -> Option<AboutData> {
        self.read().about()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.state == LifecycleState::Loaded {
            self.close_document();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::RgbImage;

    use super::super::page::{PageInfo, PageRef, TextPage};
    use super::super::request::RequesterId;
    use super::*;

    struct Fixed {
        features: FeatureSet,
        closes: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(features: FeatureSet) -> Self {
            Self {
                features,
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Generator for Fixed {
        fn features(&self) -> FeatureSet {
            self.features
        }

        fn load_document(&mut self, path: &Path, pages: &mut Vec<Page>, _: &Notifier) -> bool {
            if path.as_os_str().is_empty() {
                return false;
            }
            pages.extend((0..3).map(|n| Page::new(n, 100.0, 150.0)));
            true
        }

        fn close_document(&mut self) -> bool {
            self.closes.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn image(&self, request: &PixmapRequest, _: &PageInfo, _: &Notifier) -> Option<RgbImage> {
            Some(RgbImage::new(request.width(), request.height()))
        }

        fn text_page(&self, _: &PageInfo, _: &Notifier) -> Option<TextPage> {
            Some(TextPage::default())
        }
    }

    fn loaded(features: FeatureSet) -> (Dispatcher, Vec<PageRef>) {
        let mut dispatcher = Dispatcher::new(Box::new(Fixed::new(features)));
        let mut pages = Vec::new();
        assert!(dispatcher.load_document(Path::new("doc"), &mut pages));
        let pages = pages
            .into_iter()
            .map(|p| Arc::new(Mutex::new(p)))
            .collect();
        (dispatcher, pages)
    }

    fn request(pages: &[PageRef], page: usize, asynchronous: bool) -> PixmapRequest {
        let request = PixmapRequest::new(RequesterId(1), page, 40, 60, 0, asynchronous);
        request.set_page(pages[page].clone());
        request
    }

    #[test]
    fn failed_load_keeps_dispatcher_unusable() {
        let mut dispatcher = Dispatcher::new(Box::new(Fixed::new(FeatureSet::empty())));
        let mut pages = Vec::new();
        assert!(!dispatcher.load_document(Path::new(""), &mut pages));
        assert_eq!(dispatcher.state(), LifecycleState::Unloaded);
        assert!(!dispatcher.can_generate_pixmap());
    }

    #[test]
    fn sync_request_completes_before_returning() {
        let (mut dispatcher, pages) = loaded(FeatureSet::empty());

        match dispatcher.generate_pixmap(request(&pages, 0, false)) {
            Dispatch::Completed(Completion::Pixmap(done)) => assert_eq!(done.page_number(), 0),
            other => panic!("unexpected {other:?}"),
        }
        assert!(lock_page(&pages[0]).has_pixmap(RequesterId(1)));
        assert!(dispatcher.can_generate_pixmap());
    }

    #[test]
    fn async_request_without_threaded_is_downgraded() {
        let (mut dispatcher, pages) = loaded(FeatureSet::empty());

        match dispatcher.generate_pixmap(request(&pages, 1, true)) {
            Dispatch::Completed(Completion::Pixmap(done)) => assert!(!done.asynchronous()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn request_without_page_is_refused() {
        let (mut dispatcher, _pages) = loaded(FeatureSet::empty());
        let orphan = PixmapRequest::new(RequesterId(1), 0, 10, 10, 0, false);
        assert!(dispatcher.generate_pixmap(orphan).is_refused());
        assert!(dispatcher.can_generate_pixmap());
    }

    #[test]
    fn async_lane_stays_busy_until_polled() {
        let (mut dispatcher, pages) =
            loaded(FeatureSet::empty().with(Feature::Threaded));

        assert!(matches!(
            dispatcher.generate_pixmap(request(&pages, 0, true)),
            Dispatch::Running
        ));
        assert!(!dispatcher.can_generate_pixmap());
        assert!(dispatcher.generate_pixmap(request(&pages, 1, true)).is_refused());

        let mut completions = Vec::new();
        while completions.is_empty() {
            completions = dispatcher.wait(Duration::from_secs(5));
        }
        assert_eq!(completions.len(), 1);
        assert!(dispatcher.can_generate_pixmap());
        assert!(lock_page(&pages[0]).has_pixmap(RequesterId(1)));
    }

    #[test]
    fn image_for_outdated_layout_is_not_stored() {
        let (mut dispatcher, pages) =
            loaded(FeatureSet::empty().with(Feature::Threaded));

        assert!(matches!(
            dispatcher.generate_pixmap(request(&pages, 0, true)),
            Dispatch::Running
        ));
        lock_page(&pages[0]).set_rotation(Rotation::R90);

        let mut completions = Vec::new();
        while completions.is_empty() {
            completions = dispatcher.wait(Duration::from_secs(5));
        }
        assert_eq!(completions.len(), 1);
        assert!(!lock_page(&pages[0]).has_pixmap(RequesterId(1)));
        assert!(dispatcher.can_generate_pixmap());
    }

    #[test]
    fn text_requires_text_extraction() {
        let (mut dispatcher, pages) = loaded(FeatureSet::empty());
        assert!(!dispatcher.can_generate_text_page());

        let text = TextPageRequest::new(0, 0, false);
        text.set_page(pages[0].clone());
        assert!(dispatcher.generate_text_page(text).is_refused());
    }

    #[test]
    fn close_twice_is_refused() {
        let fixed = Fixed::new(FeatureSet::empty().with(Feature::Threaded));
        let closes = fixed.closes.clone();
        let mut dispatcher = Dispatcher::new(Box::new(fixed));
        let mut pages = Vec::new();
        assert!(dispatcher.load_document(Path::new("doc"), &mut pages));

        assert!(dispatcher.close_document());
        assert!(!dispatcher.close_document());
        assert_eq!(dispatcher.state(), LifecycleState::Closed);
        assert!(!dispatcher.can_generate_pixmap());

        drop(dispatcher);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes_loaded_document() {
        let fixed = Fixed::new(FeatureSet::empty());
        let closes = fixed.closes.clone();
        let (mut dispatcher, mut pages) = (Dispatcher::new(Box::new(fixed)), Vec::new());
        assert!(dispatcher.load_document(Path::new("doc"), &mut pages));

        drop(dispatcher);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsupported_export_format_is_refused() {
        let (dispatcher, _pages) = loaded(FeatureSet::empty());
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pdf");

        let pdf = ExportFormat::standard_format(super::super::export::StandardExportFormat::Pdf);
        assert!(!dispatcher.export_to(&target, &pdf));
        assert!(!target.exists());
    }
}

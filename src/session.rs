//! Session - the orchestrator side of page generation
//!
//! Owns the pages of one open document, queues requests by priority, feeds
//! them to the [`Dispatcher`] whenever the matching lane is free, and hands
//! completions back to the caller. All of it runs on the caller's thread.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::generator::{
    Completion, Dispatch, Dispatcher, ExportFormat, Feature, Page, PageRef, PageSize,
    PixmapRequest, RequestQueue, RequesterId, Rotation, TextPageRequest, lock_page,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("generator failed to load {source_name}")]
    LoadFailed { source_name: String },

    #[error("generator cannot read documents from memory")]
    RawDataUnsupported,
}

/// An open document and its pending work
pub struct Session {
    dispatcher: Dispatcher,
    pages: Vec<PageRef>,
    pixmap_queue: RequestQueue<PixmapRequest>,
    text_queue: RequestQueue<TextPageRequest>,
    ready: Vec<Completion>,
    rotation: Rotation,
    page_size: Option<PageSize>,
}

impl Session {
    /// Load `path` through `dispatcher`.
    ///
    /// Subscribe to `dispatcher.notifier()` beforehand to see load errors.
    pub fn open(mut dispatcher: Dispatcher, path: &Path) -> Result<Self, SessionError> {
        let mut pages = Vec::new();
        if !dispatcher.load_document(path, &mut pages) {
            return Err(SessionError::LoadFailed {
                source_name: path.display().to_string(),
            });
        }
        Ok(Self::with_pages(dispatcher, pages))
    }

    /// Load a document held in memory. Requires [`Feature::ReadRawData`].
    pub fn open_from_data(mut dispatcher: Dispatcher, data: &[u8]) -> Result<Self, SessionError> {
        if !dispatcher.has_feature(Feature::ReadRawData) {
            return Err(SessionError::RawDataUnsupported);
        }

        let mut pages = Vec::new();
        if !dispatcher.load_document_from_data(data, &mut pages) {
            return Err(SessionError::LoadFailed {
                source_name: format!("<{} bytes>", data.len()),
            });
        }
        Ok(Self::with_pages(dispatcher, pages))
    }

    fn with_pages(dispatcher: Dispatcher, pages: Vec<Page>) -> Self {
        Self {
            dispatcher,
            pages: pages
                .into_iter()
                .map(|page| Arc::new(Mutex::new(page)))
                .collect(),
            pixmap_queue: RequestQueue::new(),
            text_queue: RequestQueue::new(),
            ready: Vec::new(),
            rotation: Rotation::R0,
            page_size: None,
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn pages(&self) -> &[PageRef] {
        &self.pages
    }

    #[must_use]
    pub fn page(&self, number: usize) -> Option<&PageRef> {
        self.pages.get(number)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    #[must_use]
    pub fn queued_pixmaps(&self) -> usize {
        self.pixmap_queue.len()
    }

    #[must_use]
    pub fn queued_text_pages(&self) -> usize {
        self.text_queue.len()
    }

    /// Nothing queued, nothing running, nothing waiting to be handed out
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pixmap_queue.is_empty()
            && self.text_queue.is_empty()
            && self.ready.is_empty()
            && self.dispatcher.is_idle()
    }

    /// Queue a pixmap request. Returns false if it was not accepted.
    ///
    /// Synchronous requests whose lane is free complete before this returns;
    /// their completion is handed out by the next [`poll`](Self::poll).
    pub fn submit_pixmap(&mut self, request: PixmapRequest) -> bool {
        let Some(page) = self.pages.get(request.page_number()) else {
            warn!(
                "{request:?} rejected: document has {} pages",
                self.pages.len()
            );
            return false;
        };
        if !self.accepts_requests() {
            warn!("{request:?} rejected: document is not loaded");
            return false;
        }

        if !attach_page(request.page(), page, || request.set_page(page.clone())) {
            warn!("{request:?} rejected: attached page belongs to another document");
            return false;
        }
        self.pixmap_queue.push(request);
        self.pump();
        true
    }

    /// Queue a text page request. Returns false if it was not accepted,
    /// including when the generator cannot extract text.
    pub fn submit_text_page(&mut self, request: TextPageRequest) -> bool {
        if !self.dispatcher.has_feature(Feature::TextExtraction) {
            debug!("{request:?} rejected: generator has no text extraction");
            return false;
        }
        let Some(page) = self.pages.get(request.page_number()) else {
            warn!(
                "{request:?} rejected: document has {} pages",
                self.pages.len()
            );
            return false;
        };
        if !self.accepts_requests() {
            warn!("{request:?} rejected: document is not loaded");
            return false;
        }

        if !attach_page(request.page(), page, || request.set_page(page.clone())) {
            warn!("{request:?} rejected: attached page belongs to another document");
            return false;
        }
        self.text_queue.push(request);
        self.pump();
        true
    }

    fn accepts_requests(&self) -> bool {
        self.dispatcher.state() == crate::generator::LifecycleState::Loaded
    }

    /// Move queued requests onto free lanes, most urgent first
    fn pump(&mut self) {
        while self.dispatcher.can_generate_pixmap() {
            let Some(request) = self.pixmap_queue.pop() else {
                break;
            };
            match self.dispatcher.generate_pixmap(request) {
                Dispatch::Completed(completion) => self.ready.push(completion),
                Dispatch::Running => {}
                Dispatch::Refused(request) => {
                    self.pixmap_queue.push_front(request);
                    break;
                }
            }
        }

        while self.dispatcher.can_generate_text_page() {
            let Some(request) = self.text_queue.pop() else {
                break;
            };
            match self.dispatcher.generate_text_page(request) {
                Dispatch::Completed(completion) => self.ready.push(completion),
                Dispatch::Running => {}
                Dispatch::Refused(request) => {
                    self.text_queue.push_front(request);
                    break;
                }
            }
        }
    }

    /// Collect finished requests without blocking
    pub fn poll(&mut self) -> Vec<Completion> {
        let delivered = self.dispatcher.poll();
        self.ready.extend(delivered);
        self.pump();
        std::mem::take(&mut self.ready)
    }

    /// Collect finished requests, blocking up to `timeout` for the first one
    pub fn wait(&mut self, timeout: Duration) -> Vec<Completion> {
        if self.ready.is_empty() {
            let delivered = self.dispatcher.wait(timeout);
            self.ready.extend(delivered);
        }
        self.poll()
    }

    /// Keep dispatching until everything queued has completed or `timeout`
    /// passes
    pub fn run_until_idle(&mut self, timeout: Duration) -> Vec<Completion> {
        let deadline = Instant::now() + timeout;
        let mut completions = self.poll();

        while !self.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Gave up waiting: {} pixmaps and {} text pages still queued",
                    self.pixmap_queue.len(),
                    self.text_queue.len()
                );
                break;
            }
            completions.extend(self.wait(deadline - now));
        }

        completions
    }

    /// Change the priority of every queued pixmap request of `requester`,
    /// e.g. when its view scrolls away. Requests already dispatched are not
    /// affected.
    pub fn reprioritize_pixmaps(&mut self, requester: RequesterId, priority: u32) {
        self.pixmap_queue.for_each_mut(|request| {
            if request.id() == requester {
                request.set_priority(priority);
            }
        });
    }

    /// Rotate every page.
    ///
    /// Queued pixmap requests get their geometry swapped when the
    /// orientation flips between portrait and landscape.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        let old_rotation = self.rotation;
        if old_rotation == rotation {
            return;
        }

        self.rotation = rotation;
        for page in &self.pages {
            let mut page = lock_page(page);
            page.set_rotation(rotation);
            page.clear_pixmaps();
        }
        self.dispatcher.rotation_changed(rotation, old_rotation);

        if old_rotation.is_transposed() != rotation.is_transposed() {
            self.pixmap_queue.for_each_mut(PixmapRequest::swap);
        }
        debug!(
            "Rotation {} -> {} degrees",
            old_rotation.degrees(),
            rotation.degrees()
        );
    }

    /// Lay out every page to `size`. Requires [`Feature::PageSizes`].
    pub fn set_page_size(&mut self, size: PageSize) -> bool {
        if !self.dispatcher.has_feature(Feature::PageSizes) || size.is_null() {
            return false;
        }
        if self.page_size.as_ref() == Some(&size) {
            return true;
        }

        for page in &self.pages {
            lock_page(page).set_size(size.width, size.height);
        }
        self.dispatcher
            .page_size_changed(&size, self.page_size.as_ref());
        self.page_size = Some(size);
        true
    }

    #[must_use]
    pub fn export_formats(&self) -> Vec<ExportFormat> {
        self.dispatcher.export_formats()
    }

    pub fn export_to(&self, destination: &Path, format: &ExportFormat) -> bool {
        self.dispatcher.export_to(destination, format)
    }

    /// Close the document.
    ///
    /// Requests already on a lane finish normally. Requests still queued are
    /// never rendered; they complete without an artifact, after the running
    /// ones, so every accepted request is still handed out once.
    pub fn close(mut self) -> Vec<Completion> {
        self.dispatcher.close_document();
        let mut completions = std::mem::take(&mut self.ready);
        completions.extend(self.dispatcher.poll());

        let unrendered: Vec<Completion> = self
            .pixmap_queue
            .drain()
            .into_iter()
            .map(Completion::Pixmap)
            .chain(self.text_queue.drain().into_iter().map(Completion::TextPage))
            .collect();
        if !unrendered.is_empty() {
            debug!(
                "Completing {} queued requests without rendering on close",
                unrendered.len()
            );
        }
        completions.extend(unrendered);
        completions
    }
}

/// Make sure a request targets `page`, attaching it when nothing is attached
/// yet. False when a different page was attached by the caller.
fn attach_page(
    attached: Option<&PageRef>,
    page: &PageRef,
    attach: impl FnOnce() -> bool,
) -> bool {
    match attached {
        Some(attached) => Arc::ptr_eq(attached, page),
        None => attach(),
    }
}

//! Generation request types

use std::sync::OnceLock;

use log::warn;

use super::page::PageRef;

/// Identifies who asked for a pixmap; completions are routed by it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequesterId(pub u32);

impl RequesterId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Artifact kinds, one lane each
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Pixmap,
    TextPage,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Pixmap => "pixmap",
            RequestKind::TextPage => "text",
        }
    }
}

/// Anything that can wait in a [`RequestQueue`](super::RequestQueue)
pub trait Prioritized {
    /// Lower is more urgent, 0 is the most urgent
    fn priority(&self) -> u32;
}

/// Request for a rendered image of one page.
///
/// Deliberately not `Clone`: a request moves from submission to dispatch to
/// completion, so it can complete only once.
pub struct PixmapRequest {
    id: RequesterId,
    page_number: usize,
    width: u32,
    height: u32,
    priority: u32,
    asynchronous: bool,
    page: OnceLock<PageRef>,
}

impl PixmapRequest {
    /// Width and height are raised to 1 when zero
    #[must_use]
    pub fn new(
        id: RequesterId,
        page_number: usize,
        width: u32,
        height: u32,
        priority: u32,
        asynchronous: bool,
    ) -> Self {
        Self {
            id,
            page_number,
            width: width.max(1),
            height: height.max(1),
            priority,
            asynchronous,
            page: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RequesterId {
        self.id
    }

    #[must_use]
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    #[must_use]
    pub fn asynchronous(&self) -> bool {
        self.asynchronous
    }

    /// The target page, once the host has attached it
    #[must_use]
    pub fn page(&self) -> Option<&PageRef> {
        self.page.get()
    }

    /// Attach the target page. Only the first call has an effect.
    pub fn set_page(&self, page: PageRef) -> bool {
        let attached = self.page.set(page).is_ok();
        if !attached {
            warn!("{self:?}: page already attached, keeping the first one");
        }
        attached
    }

    /// Exchange width and height, used when the page orientation flips
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.width, &mut self.height);
    }

    pub(crate) fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    pub(crate) fn set_asynchronous(&mut self, asynchronous: bool) {
        self.asynchronous = asynchronous;
    }
}

impl Prioritized for PixmapRequest {
    fn priority(&self) -> u32 {
        self.priority
    }
}

impl std::fmt::Debug for PixmapRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixmapRequest")
            .field("id", &self.id.0)
            .field("page", &self.page_number)
            .field("size", &format_args!("{}x{}", self.width, self.height))
            .field("priority", &self.priority)
            .field("mode", &if self.asynchronous { "async" } else { "sync" })
            .finish()
    }
}

/// Request for the extracted text of one page
pub struct TextPageRequest {
    page_number: usize,
    priority: u32,
    asynchronous: bool,
    page: OnceLock<PageRef>,
}

impl TextPageRequest {
    #[must_use]
    pub fn new(page_number: usize, priority: u32, asynchronous: bool) -> Self {
        Self {
            page_number,
            priority,
            asynchronous,
            page: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    #[must_use]
    pub fn asynchronous(&self) -> bool {
        self.asynchronous
    }

    #[must_use]
    pub fn page(&self) -> Option<&PageRef> {
        self.page.get()
    }

    pub fn set_page(&self, page: PageRef) -> bool {
        let attached = self.page.set(page).is_ok();
        if !attached {
            warn!("{self:?}: page already attached, keeping the first one");
        }
        attached
    }

    pub(crate) fn set_asynchronous(&mut self, asynchronous: bool) {
        self.asynchronous = asynchronous;
    }
}

impl Prioritized for TextPageRequest {
    fn priority(&self) -> u32 {
        self.priority
    }
}

impl std::fmt::Debug for TextPageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextPageRequest")
            .field("page", &self.page_number)
            .field("priority", &self.priority)
            .field("mode", &if self.asynchronous { "async" } else { "sync" })
            .finish()
    }
}

/// A finished request.
///
/// Carries the request itself and nothing else; the artifact has already been
/// stored in the target page when this is handed out.
#[derive(Debug)]
pub enum Completion {
    Pixmap(PixmapRequest),
    TextPage(TextPageRequest),
}

impl Completion {
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Completion::Pixmap(_) => RequestKind::Pixmap,
            Completion::TextPage(_) => RequestKind::TextPage,
        }
    }

    #[must_use]
    pub fn page_number(&self) -> usize {
        match self {
            Completion::Pixmap(request) => request.page_number(),
            Completion::TextPage(request) => request.page_number(),
        }
    }

    #[must_use]
    pub fn as_pixmap(&self) -> Option<&PixmapRequest> {
        match self {
            Completion::Pixmap(request) => Some(request),
            Completion::TextPage(_) => None,
        }
    }

    #[must_use]
    pub fn as_text_page(&self) -> Option<&TextPageRequest> {
        match self {
            Completion::TextPage(request) => Some(request),
            Completion::Pixmap(_) => None,
        }
    }
}

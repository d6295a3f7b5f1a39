//! Host-owned page container

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbImage;

use super::request::RequesterId;

/// Shared handle to a page owned by the host.
///
/// Requests keep one of these as their back-reference. Only the dispatcher
/// writes through it, and only while completing a request.
pub type PageRef = Arc<Mutex<Page>>;

/// Locks a page, recovering the data if a previous holder panicked.
pub fn lock_page(page: &PageRef) -> MutexGuard<'_, Page> {
    page.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Page orientation, clockwise
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// True when width and height are exchanged relative to the unrotated page
    #[must_use]
    pub const fn is_transposed(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// Rectangle in page coordinates normalized to `0.0..=1.0`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl NormalizedRect {
    #[must_use]
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left: left.clamp(0.0, 1.0),
            top: top.clamp(0.0, 1.0),
            right: right.clamp(0.0, 1.0),
            bottom: bottom.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// One run of text with its position on the page
#[derive(Clone, Debug, PartialEq)]
pub struct TextEntity {
    pub text: String,
    pub area: NormalizedRect,
}

/// Extracted text of a page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextPage {
    entities: Vec<TextEntity>,
}

impl TextPage {
    #[must_use]
    pub fn new(entities: Vec<TextEntity>) -> Self {
        Self { entities }
    }

    #[must_use]
    pub fn entities(&self) -> &[TextEntity] {
        &self.entities
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Text of the whole page, one entity per line
    #[must_use]
    pub fn text(&self) -> String {
        self.entities
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text of the entities whose top-left corner falls inside `area`
    #[must_use]
    pub fn text_in(&self, area: &NormalizedRect) -> String {
        self.entities
            .iter()
            .filter(|e| area.contains(e.area.left, e.area.top))
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Copy of the page fields a rendering primitive may need
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageInfo {
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub rotation: Rotation,
    /// Layout generation the fields were read at
    pub generation: u64,
}

/// A single document page and its rendered artifacts.
///
/// Generators create pages while loading a document; the host owns them from
/// then on and decides how long artifacts are kept.
#[derive(Debug)]
pub struct Page {
    number: usize,
    width: f64,
    height: f64,
    rotation: Rotation,
    /// Bumped whenever rotation or size change, so renders started before
    /// the change can be recognized as stale
    generation: u64,
    pixmaps: HashMap<RequesterId, RgbImage>,
    text_page: Option<TextPage>,
}

impl Page {
    /// Create an unrendered page with its natural size in points
    #[must_use]
    pub fn new(number: usize, width: f64, height: f64) -> Self {
        Self {
            number,
            width,
            height,
            rotation: Rotation::R0,
            generation: 0,
            pixmaps: HashMap::new(),
            text_page: None,
        }
    }

    #[must_use]
    pub fn number(&self) -> usize {
        self.number
    }

    /// Width after rotation
    #[must_use]
    pub fn width(&self) -> f64 {
        if self.rotation.is_transposed() {
            self.height
        } else {
            self.width
        }
    }

    /// Height after rotation
    #[must_use]
    pub fn height(&self) -> f64 {
        if self.rotation.is_transposed() {
            self.width
        } else {
            self.height
        }
    }

    #[must_use]
    pub fn ratio(&self) -> f64 {
        let width = self.width();
        if width > 0.0 { self.height() / width } else { 1.0 }
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.generation += 1;
        }
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.generation += 1;
        // Artifacts rendered for the old size no longer match
        self.pixmaps.clear();
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn info(&self) -> PageInfo {
        PageInfo {
            number: self.number,
            width: self.width(),
            height: self.height(),
            rotation: self.rotation,
            generation: self.generation,
        }
    }

    #[must_use]
    pub fn pixmap(&self, requester: RequesterId) -> Option<&RgbImage> {
        self.pixmaps.get(&requester)
    }

    #[must_use]
    pub fn has_pixmap(&self, requester: RequesterId) -> bool {
        self.pixmaps.contains_key(&requester)
    }

    pub fn set_pixmap(&mut self, requester: RequesterId, pixmap: RgbImage) {
        self.pixmaps.insert(requester, pixmap);
    }

    pub fn remove_pixmap(&mut self, requester: RequesterId) -> Option<RgbImage> {
        self.pixmaps.remove(&requester)
    }

    #[must_use]
    pub fn text_page(&self) -> Option<&TextPage> {
        self.text_page.as_ref()
    }

    #[must_use]
    pub fn has_text_page(&self) -> bool {
        self.text_page.is_some()
    }

    pub fn set_text_page(&mut self, text_page: TextPage) {
        self.text_page = Some(text_page);
    }

    pub fn clear_pixmaps(&mut self) {
        self.pixmaps.clear();
    }

    /// Drop every cached artifact
    pub fn clear_artifacts(&mut self) {
        self.pixmaps.clear();
        self.text_page = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_transposes_reported_size() {
        let mut page = Page::new(0, 100.0, 200.0);
        assert_eq!((page.width(), page.height()), (100.0, 200.0));

        page.set_rotation(Rotation::R90);
        assert_eq!((page.width(), page.height()), (200.0, 100.0));
        assert_eq!(page.info().rotation, Rotation::R90);

        page.set_rotation(Rotation::R180);
        assert_eq!((page.width(), page.height()), (100.0, 200.0));
    }

    #[test]
    fn layout_changes_bump_generation() {
        let mut page = Page::new(0, 100.0, 200.0);
        assert_eq!(page.generation(), 0);

        page.set_rotation(Rotation::R0);
        assert_eq!(page.generation(), 0);

        page.set_rotation(Rotation::R270);
        page.set_size(50.0, 50.0);
        assert_eq!(page.generation(), 2);
        assert_eq!(page.info().generation, 2);
    }

    #[test]
    fn pixmaps_are_keyed_by_requester() {
        let mut page = Page::new(3, 10.0, 10.0);
        page.set_pixmap(RequesterId(1), RgbImage::new(4, 4));

        assert!(page.has_pixmap(RequesterId(1)));
        assert!(!page.has_pixmap(RequesterId(2)));

        page.set_size(20.0, 20.0);
        assert!(!page.has_pixmap(RequesterId(1)));
    }

    #[test]
    fn text_in_area_filters_entities() {
        let text = TextPage::new(vec![
            TextEntity {
                text: "top".into(),
                area: NormalizedRect::new(0.0, 0.0, 1.0, 0.1),
            },
            TextEntity {
                text: "bottom".into(),
                area: NormalizedRect::new(0.0, 0.9, 1.0, 1.0),
            },
        ]);

        assert_eq!(text.text(), "top\nbottom");
        assert_eq!(
            text.text_in(&NormalizedRect::new(0.0, 0.5, 1.0, 1.0)),
            "bottom"
        );
    }
}

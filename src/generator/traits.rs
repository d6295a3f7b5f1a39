//! The contract every document backend implements

use std::path::Path;

use image::RgbImage;
use serde_json::Value;

use super::export::ExportFormat;
use super::feature::{Feature, FeatureSet};
use super::page::{Page, PageInfo, Rotation, TextPage};
use super::request::PixmapRequest;
use super::types::{
    AboutData, DocumentInfo, DocumentSynopsis, EmbeddedFile, FontInfo, PageSize, PageSizeMetric,
    Permission,
};
use crate::notification::Notifier;

/// A document backend.
///
/// Only loading, closing, declaring features and producing a page image are
/// mandatory. Every other method has a neutral default that callers read as
/// "unsupported": `None`, an empty list or `false`.
///
/// Backends are driven through a [`Dispatcher`](super::Dispatcher), which
/// enforces the one-job-per-lane rule. When [`Feature::Threaded`] is declared,
/// [`image`](Generator::image) and [`text_page`](Generator::text_page) run on
/// lane threads, possibly at the same time as each other and as read-only
/// queries, which is why they take `&self`.
pub trait Generator: Send + Sync {
    /// Features of this instance. Must not change once a document is loaded.
    fn features(&self) -> FeatureSet;

    fn has_feature(&self, feature: Feature) -> bool {
        self.features().has(feature)
    }

    /// Load the document at `path`, appending its pages to `pages`.
    ///
    /// Returning `false` ends the session; no request follows a failed load.
    fn load_document(&mut self, path: &Path, pages: &mut Vec<Page>, notifier: &Notifier) -> bool;

    /// Load a document from memory. Requires [`Feature::ReadRawData`].
    fn load_document_from_data(
        &mut self,
        _data: &[u8],
        _pages: &mut Vec<Page>,
        _notifier: &Notifier,
    ) -> bool {
        false
    }

    /// Release everything the loaded document holds
    fn close_document(&mut self) -> bool;

    /// Render the page described by `request` at the requested size.
    ///
    /// `None` means the render failed; the request still completes, without
    /// an artifact.
    fn image(&self, request: &PixmapRequest, page: &PageInfo, notifier: &Notifier)
    -> Option<RgbImage>;

    /// Extract the text of a page. Requires [`Feature::TextExtraction`].
    fn text_page(&self, _page: &PageInfo, _notifier: &Notifier) -> Option<TextPage> {
        None
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        None
    }

    fn document_synopsis(&self) -> Option<DocumentSynopsis> {
        None
    }

    /// Fonts used on `page`, or by the whole document when `page` is `None`.
    /// Requires [`Feature::FontInfo`].
    fn fonts_for_page(&self, _page: Option<usize>) -> Vec<FontInfo> {
        Vec::new()
    }

    fn embedded_files(&self) -> Vec<EmbeddedFile> {
        Vec::new()
    }

    fn page_size_metric(&self) -> PageSizeMetric {
        PageSizeMetric::None
    }

    fn is_allowed(&self, _action: Permission) -> bool {
        true
    }

    /// Orientation changed. Must only update state, never start generation.
    fn rotation_changed(&mut self, _rotation: Rotation, _old_rotation: Rotation) {}

    /// Sizes the pages can be laid out to. Requires [`Feature::PageSizes`].
    fn page_sizes(&self) -> Vec<PageSize> {
        Vec::new()
    }

    /// Page size changed. Must only update state, never start generation.
    fn page_size_changed(&mut self, _size: &PageSize, _old_size: Option<&PageSize>) {}

    /// Print the document to `destination`
    fn print(&self, _destination: &Path) -> bool {
        false
    }

    /// Backend-specific metadata lookup
    fn meta_data(&self, _key: &str, _option: &Value) -> Option<Value> {
        None
    }

    fn export_formats(&self) -> Vec<ExportFormat> {
        Vec::new()
    }

    /// Export to `destination`. On failure nothing may be left at `destination`.
    fn export_to(&self, _destination: &Path, _format: &ExportFormat) -> bool {
        false
    }

    fn about(&self) -> Option<AboutData> {
        None
    }
}

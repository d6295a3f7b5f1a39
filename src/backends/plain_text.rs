//! Plain-text backend
//!
//! Wraps a UTF-8 document at a fixed column and cuts it into pages of a fixed
//! number of lines. Page images are schematic: one dark bar per line, as long
//! as the line.

use std::fs;
use std::io::Write;
use std::path::Path;

use image::{Rgb, RgbImage, imageops};
use log::{debug, error, info};
use serde_json::{Value, json};

use super::BackendError;
use crate::generator::{
    AboutData, DocumentInfo, DocumentSynopsis, ExportFormat, Feature, FeatureSet, FontInfo,
    FontKind, Generator, NormalizedRect, Page, PageInfo, PageSizeMetric, PixmapRequest, Rotation,
    StandardExportFormat, TextEntity, TextPage, TocEntry,
};
use crate::notification::Notifier;
use crate::settings;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);

/// Fraction of the page left blank on every side
const MARGIN: f64 = 0.05;

/// Page geometry used to paginate text
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextLayout {
    pub lines_per_page: usize,
    pub chars_per_line: usize,
    pub page_width: f64,
    pub page_height: f64,
    pub threaded: bool,
}

impl TextLayout {
    /// Layout from the global settings
    #[must_use]
    pub fn from_settings() -> Self {
        let settings = settings::current();
        Self {
            lines_per_page: settings.lines_per_page,
            chars_per_line: settings.chars_per_line,
            page_width: settings.page_width,
            page_height: settings.page_height,
            threaded: settings.threaded,
        }
    }

    /// Normalized height of one line slot
    fn line_height(&self) -> f64 {
        (1.0 - 2.0 * MARGIN) / self.lines_per_page as f64
    }

    /// Normalized width of a line of `chars` characters
    fn line_width(&self, chars: usize) -> f64 {
        let fill = (chars as f64 / self.chars_per_line as f64).min(1.0);
        (1.0 - 2.0 * MARGIN) * fill
    }
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            lines_per_page: 50,
            chars_per_line: 80,
            page_width: 612.0,
            page_height: 792.0,
            threaded: true,
        }
    }
}

struct TextDocument {
    title: String,
    source: String,
    pages: Vec<Vec<String>>,
}

impl TextDocument {
    fn line_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}

pub struct PlainTextGenerator {
    layout: TextLayout,
    features: FeatureSet,
    document: Option<TextDocument>,
    rotation: Rotation,
}

impl PlainTextGenerator {
    #[must_use]
    pub fn new(layout: TextLayout) -> Self {
        let layout = TextLayout {
            lines_per_page: layout.lines_per_page.max(1),
            chars_per_line: layout.chars_per_line.max(1),
            ..layout
        };

        let mut features = FeatureSet::empty()
            .with(Feature::TextExtraction)
            .with(Feature::ReadRawData)
            .with(Feature::FontInfo);
        features.set(Feature::Threaded, layout.threaded);

        Self {
            layout,
            features,
            document: None,
            rotation: Rotation::R0,
        }
    }

    #[must_use]
    pub fn layout(&self) -> &TextLayout {
        &self.layout
    }

    fn paginate(&self, source: &str) -> Vec<Vec<String>> {
        let lines: Vec<String> = source
            .lines()
            .flat_map(|line| {
                if line.trim().is_empty() {
                    vec![String::new()]
                } else {
                    textwrap::wrap(line, self.layout.chars_per_line)
                        .into_iter()
                        .map(|l| l.into_owned())
                        .collect()
                }
            })
            .collect();

        if lines.is_empty() {
            // An empty document still has one blank page
            return vec![Vec::new()];
        }
        lines
            .chunks(self.layout.lines_per_page)
            .map(<[String]>::to_vec)
            .collect()
    }

    fn open(
        &mut self,
        bytes: Vec<u8>,
        title: String,
        pages: &mut Vec<Page>,
    ) -> Result<(), BackendError> {
        let source = String::from_utf8(bytes)?;
        let paginated = self.paginate(&source);

        pages.extend(
            (0..paginated.len())
                .map(|n| Page::new(n, self.layout.page_width, self.layout.page_height)),
        );
        info!(
            "Paginated {title:?} into {} pages of {} lines",
            paginated.len(),
            self.layout.lines_per_page
        );

        self.document = Some(TextDocument {
            title,
            source,
            pages: paginated,
        });
        Ok(())
    }

    fn lines(&self, page: usize) -> Option<&[String]> {
        self.document
            .as_ref()
            .and_then(|doc| doc.pages.get(page))
            .map(Vec::as_slice)
    }

    fn write_export(&self, destination: &Path) -> Result<(), BackendError> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| BackendError::generic("no document loaded"))?;

        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(document.source.as_bytes())?;
        file.persist(destination)?;
        Ok(())
    }
}

impl Default for PlainTextGenerator {
    fn default() -> Self {
        Self::new(TextLayout::from_settings())
    }
}

impl Generator for PlainTextGenerator {
    fn features(&self) -> FeatureSet {
        self.features
    }

    fn load_document(&mut self, path: &Path, pages: &mut Vec<Page>, notifier: &Notifier) -> bool {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());

        let loaded = fs::read(path)
            .map_err(BackendError::from)
            .and_then(|bytes| self.open(bytes, title, pages));
        match loaded {
            Ok(()) => true,
            Err(e) => {
                error!("Cannot open {path:?}: {e}");
                notifier.error(
                    format!("Cannot open {}: {e}", path.display()),
                    settings::get_notice_duration_ms(),
                );
                false
            }
        }
    }

    fn load_document_from_data(
        &mut self,
        data: &[u8],
        pages: &mut Vec<Page>,
        notifier: &Notifier,
    ) -> bool {
        match self.open(data.to_vec(), "Untitled".to_string(), pages) {
            Ok(()) => true,
            Err(e) => {
                error!("Cannot open document from memory: {e}");
                notifier.error(
                    format!("Cannot open document: {e}"),
                    settings::get_notice_duration_ms(),
                );
                false
            }
        }
    }

    fn close_document(&mut self) -> bool {
        self.document = None;
        true
    }

    fn image(&self, request: &PixmapRequest, page: &PageInfo, _: &Notifier) -> Option<RgbImage> {
        let lines = self.lines(page.number)?;

        // Draw upright, then turn the result to the page's rotation
        let (width, height) = if page.rotation.is_transposed() {
            (request.height(), request.width())
        } else {
            (request.width(), request.height())
        };
        let mut image = RgbImage::from_pixel(width, height, PAPER);

        let (w, h) = (f64::from(width), f64::from(height));
        let slot = self.layout.line_height() * h;
        let left = (MARGIN * w) as u32;
        for (i, line) in lines.iter().enumerate() {
            let chars = line.chars().count();
            if chars == 0 {
                continue;
            }
            let top = MARGIN * h + slot * i as f64;
            let y0 = top as u32;
            let y1 = ((top + slot * 0.6).ceil() as u32).min(height);
            let x1 = (left + (self.layout.line_width(chars) * w).ceil() as u32).min(width);
            for y in y0..y1 {
                for x in left..x1 {
                    image.put_pixel(x, y, INK);
                }
            }
        }

        Some(match page.rotation {
            Rotation::R0 => image,
            Rotation::R90 => imageops::rotate90(&image),
            Rotation::R180 => imageops::rotate180(&image),
            Rotation::R270 => imageops::rotate270(&image),
        })
    }

    fn text_page(&self, page: &PageInfo, _: &Notifier) -> Option<TextPage> {
        let lines = self.lines(page.number)?;
        let slot = self.layout.line_height();

        let entities = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(i, line)| {
                let top = MARGIN + slot * i as f64;
                TextEntity {
                    text: line.clone(),
                    area: NormalizedRect::new(
                        MARGIN,
                        top,
                        MARGIN + self.layout.line_width(line.chars().count()),
                        top + slot,
                    ),
                }
            })
            .collect();
        Some(TextPage::new(entities))
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        let document = self.document.as_ref()?;
        let mut info = DocumentInfo::new();
        info.set("title", document.title.as_str(), "Title");
        info.set("mimeType", "text/plain", "Mime Type");
        info.set("pages", document.pages.len().to_string(), "Pages");
        info.set("lines", document.line_count().to_string(), "Lines");
        Some(info)
    }

    fn document_synopsis(&self) -> Option<DocumentSynopsis> {
        let document = self.document.as_ref()?;

        let entries: Vec<TocEntry> = document
            .pages
            .iter()
            .enumerate()
            .flat_map(|(page, lines)| lines.iter().map(move |line| (page, line)))
            .filter_map(|(page, line)| {
                let hashes = line.chars().take_while(|c| *c == '#').count();
                let title = line[hashes..].trim();
                (hashes > 0 && !title.is_empty()).then(|| TocEntry {
                    title: title.to_string(),
                    level: hashes - 1,
                    page,
                })
            })
            .collect();

        (!entries.is_empty()).then_some(DocumentSynopsis { entries })
    }

    fn fonts_for_page(&self, page: Option<usize>) -> Vec<FontInfo> {
        let in_range = match page {
            Some(page) => self.lines(page).is_some(),
            None => self.document.is_some(),
        };
        if !in_range {
            return Vec::new();
        }
        vec![FontInfo {
            name: "Monospace".to_string(),
            kind: FontKind::Builtin,
            embedded: false,
            file: None,
        }]
    }

    fn page_size_metric(&self) -> PageSizeMetric {
        PageSizeMetric::Points
    }

    fn rotation_changed(&mut self, rotation: Rotation, old_rotation: Rotation) {
        debug!(
            "Plain text rotation {} -> {}",
            old_rotation.degrees(),
            rotation.degrees()
        );
        self.rotation = rotation;
    }

    fn meta_data(&self, key: &str, _option: &Value) -> Option<Value> {
        match key {
            "PaperColor" => Some(json!("#ffffff")),
            "TextLayout" => Some(json!({
                "lines_per_page": self.layout.lines_per_page,
                "chars_per_line": self.layout.chars_per_line,
            })),
            "Rotation" => Some(json!(self.rotation.degrees())),
            _ => None,
        }
    }

    fn export_formats(&self) -> Vec<ExportFormat> {
        vec![ExportFormat::standard_format(StandardExportFormat::PlainText)]
    }

    fn export_to(&self, destination: &Path, format: &ExportFormat) -> bool {
        if *format != ExportFormat::standard_format(StandardExportFormat::PlainText) {
            return false;
        }
        match self.write_export(destination) {
            Ok(()) => true,
            Err(e) => {
                error!("Export to {destination:?} failed: {e}");
                false
            }
        }
    }

    fn about(&self) -> Option<AboutData> {
        Some(AboutData {
            name: "plain-text".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Paginated UTF-8 text".to_string(),
        })
    }
}

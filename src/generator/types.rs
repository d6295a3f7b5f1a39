//! Metadata types returned by the optional generator queries

use std::fmt;

/// General information about a document, in insertion order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    entries: Vec<InfoEntry>,
}

/// One key of [`DocumentInfo`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoEntry {
    /// Machine-readable key, e.g. `title`
    pub key: String,
    /// Human-readable label
    pub title: String,
    pub value: String,
}

impl DocumentInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing an existing value but keeping its position
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        title: impl Into<String>,
    ) {
        let key = key.into();
        let value = value.into();
        let title = title.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.title = title;
            }
            None => self.entries.push(InfoEntry { key, title, value }),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &InfoEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single entry in the table of contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Display title
    pub title: String,
    /// Nesting level (0 = top level)
    pub level: usize,
    /// Target page (0-indexed)
    pub page: usize,
}

/// Table of contents of a document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentSynopsis {
    pub entries: Vec<TocEntry>,
}

impl DocumentSynopsis {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Font technology
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontKind {
    Unknown,
    Type1,
    TrueType,
    OpenType,
    Builtin,
}

/// Description of a font used by the document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontInfo {
    pub name: String,
    pub kind: FontKind,
    pub embedded: bool,
    /// Path of the font file on this system, when known
    pub file: Option<String>,
}

/// A file attached to the document
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub name: String,
    pub description: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for EmbeddedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedFile")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Unit of page sizes reported by a generator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageSizeMetric {
    /// Sizes carry no physical meaning
    #[default]
    None,
    /// Sizes are in points (1/72 inch)
    Points,
}

/// A named page size the document can be laid out to
#[derive(Clone, Debug, PartialEq)]
pub struct PageSize {
    pub name: String,
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    #[must_use]
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Actions a document may restrict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    Print,
    Copy,
    Modify,
    AddNotes,
}

/// Identity of a generator implementation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AboutData {
    pub name: String,
    pub version: String,
    pub description: String,
}

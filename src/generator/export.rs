//! Export format descriptors

use mime_guess::Mime;

/// Well-known export targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StandardExportFormat {
    PlainText,
    Pdf,
}

/// A conversion target a generator can export the document to.
///
/// Identity is the description plus the mime type; the icon is presentation
/// only and does not take part in equality.
#[derive(Clone, Debug, Default)]
pub struct ExportFormat {
    description: String,
    mime: Option<Mime>,
    icon: Option<String>,
}

impl ExportFormat {
    /// An unparsable mime type yields a null format
    #[must_use]
    pub fn new(description: impl Into<String>, mime: &str) -> Self {
        Self {
            description: description.into(),
            mime: mime.parse().ok(),
            icon: None,
        }
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn standard_format(kind: StandardExportFormat) -> Self {
        match kind {
            StandardExportFormat::PlainText => {
                Self::new("Plain Text", "text/plain").with_icon("text-plain")
            }
            StandardExportFormat::Pdf => {
                Self::new("PDF", "application/pdf").with_icon("application-pdf")
            }
        }
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn mime(&self) -> Option<&Mime> {
        self.mime.as_ref()
    }

    #[must_use]
    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.description.is_empty() || self.mime.is_none()
    }
}

impl PartialEq for ExportFormat {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description && self.mime == other.mime
    }
}

impl Eq for ExportFormat {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_null() {
        assert!(ExportFormat::default().is_null());
    }

    #[test]
    fn standard_formats_are_valid() {
        let pdf = ExportFormat::standard_format(StandardExportFormat::Pdf);
        assert!(!pdf.is_null());
        assert_eq!(pdf.mime().unwrap().essence_str(), "application/pdf");

        let text = ExportFormat::standard_format(StandardExportFormat::PlainText);
        assert!(!text.is_null());
        assert_ne!(text, pdf);
    }

    #[test]
    fn null_when_description_empty_or_mime_invalid() {
        assert!(ExportFormat::new("", "text/plain").is_null());
        assert!(ExportFormat::new("Broken", "not a mime").is_null());
        assert!(!ExportFormat::new("Markdown", "text/markdown").is_null());
    }

    #[test]
    fn icon_is_not_part_of_identity() {
        let a = ExportFormat::new("Plain Text", "text/plain").with_icon("text-plain");
        let b = ExportFormat::new("Plain Text", "text/plain").with_icon("document");
        let c = ExportFormat::new("Plain Text", "text/plain");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, ExportFormat::new("Text", "text/plain"));
    }
}

//! Optional generator capabilities

/// Optional abilities a generator can declare.
///
/// Absence of a feature is never an error: the host degrades gracefully and
/// the matching optional queries return their neutral value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Pixmap and text generation may run on background lanes
    Threaded,
    /// The generator can produce text pages
    TextExtraction,
    /// The generator can load a document from an in-memory buffer
    ReadRawData,
    /// The generator can describe the fonts used by the document
    FontInfo,
    /// The generator supports changing the size of the pages
    PageSizes,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::Threaded,
        Feature::TextExtraction,
        Feature::ReadRawData,
        Feature::FontInfo,
        Feature::PageSizes,
    ];

    const fn bit(self) -> u8 {
        match self {
            Feature::Threaded => 1 << 0,
            Feature::TextExtraction => 1 << 1,
            Feature::ReadRawData => 1 << 2,
            Feature::FontInfo => 1 << 3,
            Feature::PageSizes => 1 << 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Threaded => "threaded",
            Feature::TextExtraction => "text-extraction",
            Feature::ReadRawData => "read-raw-data",
            Feature::FontInfo => "font-info",
            Feature::PageSizes => "page-sizes",
        }
    }
}

/// Set of features declared by one generator instance.
///
/// Written while the generator initializes, read-only afterwards. The
/// dispatcher keeps a copy taken at load time so lane threads never need a
/// lock to consult it.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSet(u8);

impl FeatureSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn with(mut self, feature: Feature) -> Self {
        self.set(feature, true);
        self
    }

    pub fn set(&mut self, feature: Feature, enabled: bool) {
        if enabled {
            self.0 |= feature.bit();
        } else {
            self.0 &= !feature.bit();
        }
    }

    #[must_use]
    pub const fn has(&self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(|f| self.has(*f))
    }
}

impl std::fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter().map(|f| f.as_str())).finish()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), FeatureSet::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_has_nothing() {
        let set = FeatureSet::empty();
        for feature in Feature::ALL {
            assert!(!set.has(feature));
        }
    }

    #[test]
    fn set_and_clear_are_independent_per_feature() {
        let mut set = FeatureSet::empty();
        set.set(Feature::Threaded, true);
        set.set(Feature::FontInfo, true);
        assert!(set.has(Feature::Threaded));
        assert!(set.has(Feature::FontInfo));
        assert!(!set.has(Feature::TextExtraction));

        set.set(Feature::Threaded, false);
        assert!(!set.has(Feature::Threaded));
        assert!(set.has(Feature::FontInfo));
    }

    #[test]
    fn collects_from_iterator() {
        let set: FeatureSet = [Feature::ReadRawData, Feature::PageSizes]
            .into_iter()
            .collect();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Feature::ReadRawData, Feature::PageSizes]
        );
        assert_eq!(format!("{set:?}"), r#"{"read-raw-data", "page-sizes"}"#);
    }
}

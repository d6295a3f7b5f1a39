//! Scriptable generator shared by the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flume::{Receiver, Sender};
use image::RgbImage;
use pagegen::generator::{
    Feature, FeatureSet, Generator, NormalizedRect, Page, PageInfo, PixmapRequest, RequestKind,
    TextEntity, TextPage,
};
use pagegen::notification::Notifier;

/// Longest a gated primitive waits before giving up on the test
const GATE_TIMEOUT: Duration = Duration::from_secs(10);

/// One primitive call seen by the generator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Call {
    pub kind: RequestKind,
    pub page: usize,
}

/// Generator that records every primitive call and can be held mid-render
pub struct ScriptedGenerator {
    features: FeatureSet,
    page_count: usize,
    calls: Arc<Mutex<Vec<Call>>>,
    gate: Option<Receiver<()>>,
    text_gate: Option<Receiver<()>>,
    panic_on: Option<usize>,
}

/// Test-side handle to a [`ScriptedGenerator`]
pub struct Script {
    calls: Arc<Mutex<Vec<Call>>>,
    gate: Option<Sender<()>>,
    text_gate: Option<Sender<()>>,
}

impl ScriptedGenerator {
    pub fn new(features: FeatureSet, page_count: usize) -> (Self, Script) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let generator = Self {
            features,
            page_count,
            calls: calls.clone(),
            gate: None,
            text_gate: None,
            panic_on: None,
        };
        let script = Script {
            calls,
            gate: None,
            text_gate: None,
        };
        (generator, script)
    }

    pub fn threaded(page_count: usize) -> (Self, Script) {
        Self::new(
            FeatureSet::empty()
                .with(Feature::Threaded)
                .with(Feature::TextExtraction),
            page_count,
        )
    }

    /// Block every pixmap render until [`Script::release`] lets it through
    pub fn gated(self, script: Script) -> (Self, Script) {
        let (tx, rx) = flume::unbounded();
        (
            Self {
                gate: Some(rx),
                ..self
            },
            Script {
                gate: Some(tx),
                ..script
            },
        )
    }

    /// Block every text extraction until [`Script::release_text`] lets it through
    pub fn gated_text(self, script: Script) -> (Self, Script) {
        let (tx, rx) = flume::unbounded();
        (
            Self {
                text_gate: Some(rx),
                ..self
            },
            Script {
                text_gate: Some(tx),
                ..script
            },
        )
    }

    pub fn panicking_on(self, page: usize) -> Self {
        Self {
            panic_on: Some(page),
            ..self
        }
    }

    fn record(&self, kind: RequestKind, page: usize) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call { kind, page });
    }
}

impl Script {
    /// Let `count` gated renders proceed
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            for _ in 0..count {
                gate.send(()).unwrap();
            }
        }
    }

    /// Let `count` gated text extractions proceed
    pub fn release_text(&self, count: usize) {
        if let Some(gate) = &self.text_gate {
            for _ in 0..count {
                gate.send(()).unwrap();
            }
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pixmap_pages(&self) -> Vec<usize> {
        self.pages_of(RequestKind::Pixmap)
    }

    pub fn text_pages(&self) -> Vec<usize> {
        self.pages_of(RequestKind::TextPage)
    }

    fn pages_of(&self, kind: RequestKind) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.page)
            .collect()
    }
}

impl Generator for ScriptedGenerator {
    fn features(&self) -> FeatureSet {
        self.features
    }

    fn load_document(&mut self, _path: &Path, pages: &mut Vec<Page>, _: &Notifier) -> bool {
        pages.extend((0..self.page_count).map(|n| Page::new(n, 100.0, 200.0)));
        true
    }

    fn close_document(&mut self) -> bool {
        true
    }

    fn image(&self, request: &PixmapRequest, page: &PageInfo, _: &Notifier) -> Option<RgbImage> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(GATE_TIMEOUT);
        }
        self.record(RequestKind::Pixmap, page.number);

        if self.panic_on == Some(page.number) {
            panic!("corrupt page {}", page.number);
        }
        Some(RgbImage::new(request.width(), request.height()))
    }

    fn text_page(&self, page: &PageInfo, _: &Notifier) -> Option<TextPage> {
        if let Some(gate) = &self.text_gate {
            let _ = gate.recv_timeout(GATE_TIMEOUT);
        }
        self.record(RequestKind::TextPage, page.number);
        Some(TextPage::new(vec![TextEntity {
            text: format!("page {}", page.number),
            area: NormalizedRect::new(0.0, 0.0, 1.0, 0.1),
        }]))
    }
}

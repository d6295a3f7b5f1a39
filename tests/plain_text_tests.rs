use std::fs;
use std::time::Duration;

use pagegen::backends::{PlainTextGenerator, TextLayout};
use pagegen::generator::{
    Dispatcher, ExportFormat, Feature, PixmapRequest, RequesterId, StandardExportFormat,
    TextPageRequest, lock_page,
};
use pagegen::session::{Session, SessionError};

const TIMEOUT: Duration = Duration::from_secs(30);

fn layout(threaded: bool) -> TextLayout {
    TextLayout {
        lines_per_page: 3,
        chars_per_line: 20,
        page_width: 200.0,
        page_height: 300.0,
        threaded,
    }
}

fn write_document(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("notes.txt");
    fs::write(
        &path,
        "# Notes\nfirst line\nsecond line\n## Details\nthird line\n",
    )
    .unwrap();
    path
}

#[test]
fn test_render_and_extract_on_lanes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(&dir);
    let dispatcher = Dispatcher::new(Box::new(PlainTextGenerator::new(layout(true))));
    let mut session = Session::open(dispatcher, &path).unwrap();

    assert_eq!(session.page_count(), 2);
    assert!(session.dispatcher().has_feature(Feature::Threaded));

    for page in 0..2 {
        assert!(session.submit_pixmap(PixmapRequest::new(RequesterId(3), page, 200, 300, 0, true)));
        assert!(session.submit_text_page(TextPageRequest::new(page, 0, true)));
    }
    let completions = session.run_until_idle(TIMEOUT);
    assert_eq!(completions.len(), 4);

    let second = lock_page(session.page(1).unwrap());
    assert_eq!(second.pixmap(RequesterId(3)).unwrap().dimensions(), (200, 300));
    assert_eq!(second.text_page().unwrap().text(), "## Details\nthird line");
}

#[test]
fn test_document_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(&dir);
    let dispatcher = Dispatcher::new(Box::new(PlainTextGenerator::new(layout(false))));
    let session = Session::open(dispatcher, &path).unwrap();
    let dispatcher = session.dispatcher();

    let info = dispatcher.document_info().unwrap();
    assert_eq!(info.get("title"), Some("notes"));
    assert_eq!(info.get("pages"), Some("2"));

    let synopsis = dispatcher.document_synopsis().unwrap();
    assert_eq!(synopsis.entries.len(), 2);
    assert_eq!(synopsis.entries[1].title, "Details");
    assert_eq!(synopsis.entries[1].page, 1);

    assert_eq!(dispatcher.fonts_for_page(Some(0)).len(), 1);
    // Page sizes were not declared
    assert!(dispatcher.page_sizes().is_empty());
    assert_eq!(dispatcher.about().unwrap().name, "plain-text");
}

#[test]
fn test_export_only_advertised_formats() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_document(&dir);
    let dispatcher = Dispatcher::new(Box::new(PlainTextGenerator::new(layout(false))));
    let session = Session::open(dispatcher, &path).unwrap();

    let formats = session.export_formats();
    assert_eq!(formats.len(), 1);
    assert_eq!(formats[0].description(), "Plain Text");

    let pdf_target = dir.path().join("notes.pdf");
    let pdf = ExportFormat::standard_format(StandardExportFormat::Pdf);
    assert!(!session.export_to(&pdf_target, &pdf));
    assert!(!pdf_target.exists());

    let custom = ExportFormat::new("Markdown", "text/markdown");
    assert!(!session.export_to(&dir.path().join("notes.md"), &custom));

    let text_target = dir.path().join("copy.txt");
    assert!(session.export_to(&text_target, &formats[0]));
    assert_eq!(
        fs::read_to_string(&text_target).unwrap(),
        fs::read_to_string(&path).unwrap()
    );
}

#[test]
fn test_open_from_memory() {
    let dispatcher = Dispatcher::new(Box::new(PlainTextGenerator::new(layout(false))));
    let mut session = Session::open_from_data(dispatcher, b"one\ntwo\nthree\nfour\n").unwrap();
    assert_eq!(session.page_count(), 2);

    assert!(session.submit_text_page(TextPageRequest::new(1, 0, false)));
    let completions = session.poll();
    assert_eq!(completions.len(), 1);
    assert_eq!(
        lock_page(session.page(1).unwrap()).text_page().unwrap().text(),
        "four"
    );
}

#[test]
fn test_missing_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(Box::new(PlainTextGenerator::new(layout(false))));
    let notices = dispatcher.notifier().subscribe();

    let result = Session::open(dispatcher, &dir.path().join("absent.txt"));
    assert!(matches!(result, Err(SessionError::LoadFailed { .. })));
    assert!(notices.try_recv().unwrap().message.contains("absent.txt"));
}

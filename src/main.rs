use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use simplelog::{Config, WriteLogger};

use pagegen::backends::PlainTextGenerator;
use pagegen::generator::{
    Completion, Dispatcher, ExportFormat, PixmapRequest, RequesterId, StandardExportFormat,
    lock_page,
};
use pagegen::notification::{Notice, NoticeLevel};
use pagegen::panic_handler;
use pagegen::session::Session;
use pagegen::settings;

/// Requester id the CLI renders under
const CLI_REQUESTER: RequesterId = RequesterId(1);

/// Upper bound for one run; generation of a text page takes milliseconds
const RUN_TIMEOUT: Duration = Duration::from_secs(120);

/// Render pages of a text document to PNG
#[derive(Parser, Debug)]
#[command(name = "pagegen", version, about)]
struct Args {
    /// Document to open
    file: PathBuf,

    /// Page to render, 1-based; repeat for several pages. Default: all pages
    #[arg(short, long = "page", value_name = "N")]
    pages: Vec<usize>,

    /// Pixmap width in pixels. Default: natural page width
    #[arg(long)]
    width: Option<u32>,

    /// Pixmap height in pixels. Default: keeps the page's aspect ratio
    #[arg(long)]
    height: Option<u32>,

    /// Request priority, 0 is the most urgent
    #[arg(long, default_value_t = 0)]
    priority: u32,

    /// Render on the calling thread instead of the pixmap lane
    #[arg(long)]
    sync: bool,

    /// Where page images are written
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Also export the document as plain text
    #[arg(long, value_name = "PATH")]
    export_text: Option<PathBuf>,

    /// Print document information instead of rendering
    #[arg(long)]
    info: bool,

    /// Settings file to use instead of the default one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH", default_value = "pagegen.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The logger accepts everything; the global max level does the filtering,
    // so settings warnings land in the log before the configured level applies
    WriteLogger::init(
        LevelFilter::Trace,
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("Cannot create log file {}", args.log_file.display()))?,
    )?;
    log::set_max_level(LevelFilter::Info);
    panic_handler::initialize_panic_handler();

    match &args.config {
        Some(path) => settings::load_settings_from_path(path),
        None => settings::load_settings(),
    }
    log::set_max_level(settings::get_log_level());

    info!("Starting pagegen on {}", args.file.display());

    let dispatcher = Dispatcher::new(Box::new(PlainTextGenerator::default()));
    let notices = dispatcher.notifier().subscribe();

    let result = Session::open(dispatcher, &args.file)
        .with_context(|| format!("Cannot open {}", args.file.display()))
        .and_then(|session| run(session, &args));

    for notice in notices.drain() {
        print_notice(&notice);
    }
    result
}

fn run(mut session: Session, args: &Args) -> Result<()> {
    if args.info {
        print_info(&session);
        session.close();
        return Ok(());
    }

    let pages = selected_pages(&session, &args.pages)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Cannot create {}", args.out_dir.display()))?;

    for &page in &pages {
        let (width, height) = pixmap_size(&session, page, args.width, args.height);
        let request = PixmapRequest::new(
            CLI_REQUESTER,
            page,
            width,
            height,
            args.priority,
            !args.sync,
        );
        if !session.submit_pixmap(request) {
            warn!("Page {} was not accepted", page + 1);
        }
    }

    let completions = session.run_until_idle(RUN_TIMEOUT);
    let mut written = 0;
    for completion in &completions {
        if let Completion::Pixmap(request) = completion {
            if save_pixmap(&session, request, &args.out_dir)? {
                written += 1;
            }
        }
    }
    info!("Wrote {written} of {} pages", pages.len());

    if let Some(target) = &args.export_text {
        let format = ExportFormat::standard_format(StandardExportFormat::PlainText);
        if !session.export_to(target, &format) {
            bail!("Export to {} failed", target.display());
        }
        println!("exported {}", target.display());
    }

    session.close();
    if written < pages.len() {
        bail!("{} of {} pages failed to render", pages.len() - written, pages.len());
    }
    Ok(())
}

/// Zero-based page numbers to render
fn selected_pages(session: &Session, requested: &[usize]) -> Result<Vec<usize>> {
    if requested.is_empty() {
        return Ok((0..session.page_count()).collect());
    }

    requested
        .iter()
        .map(|&page| {
            if page == 0 || page > session.page_count() {
                bail!(
                    "Page {page} is out of range, the document has {} pages",
                    session.page_count()
                );
            }
            Ok(page - 1)
        })
        .collect()
}

fn pixmap_size(
    session: &Session,
    page: usize,
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    let Some(page) = session.page(page) else {
        return (width.unwrap_or(1), height.unwrap_or(1));
    };
    let page = lock_page(page);
    let ratio = page.ratio();

    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, (f64::from(w) * ratio).round() as u32),
        (None, Some(h)) => ((f64::from(h) / ratio).round() as u32, h),
        (None, None) => (page.width().round() as u32, page.height().round() as u32),
    }
}

fn save_pixmap(session: &Session, request: &PixmapRequest, out_dir: &Path) -> Result<bool> {
    let Some(page) = session.page(request.page_number()) else {
        return Ok(false);
    };
    let page = lock_page(page);
    let Some(pixmap) = page.pixmap(request.id()) else {
        warn!("{request:?} completed without an image");
        return Ok(false);
    };

    let target = out_dir.join(format!("page-{:04}.png", request.page_number() + 1));
    pixmap
        .save(&target)
        .with_context(|| format!("Cannot write {}", target.display()))?;
    println!("{}", target.display());
    Ok(true)
}

fn print_info(session: &Session) {
    let dispatcher = session.dispatcher();

    if let Some(about) = dispatcher.about() {
        println!("Generator:  {} {}", about.name, about.version);
    }
    println!("Features:   {:?}", dispatcher.features());
    println!("Pages:      {}", session.page_count());

    if let Some(info) = dispatcher.document_info() {
        for entry in info.entries() {
            println!("{:<11} {}", format!("{}:", entry.title), entry.value);
        }
    }

    let fonts = dispatcher.fonts_for_page(None);
    if !fonts.is_empty() {
        let names: Vec<_> = fonts.iter().map(|f| f.name.as_str()).collect();
        println!("Fonts:      {}", names.join(", "));
    }

    let formats = dispatcher.export_formats();
    if !formats.is_empty() {
        let names: Vec<_> = formats.iter().map(ExportFormat::description).collect();
        println!("Exports:    {}", names.join(", "));
    }

    if let Some(synopsis) = dispatcher.document_synopsis() {
        println!("Contents:");
        for entry in &synopsis.entries {
            println!(
                "  {}{} (page {})",
                "  ".repeat(entry.level),
                entry.title,
                entry.page + 1
            );
        }
    }
}

fn print_notice(notice: &Notice) {
    let label = match notice.level {
        NoticeLevel::Error => "error",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Notice => "notice",
    };
    eprintln!("{label}: {}", notice.message);
}

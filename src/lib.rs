pub mod backends;
pub mod generator;
pub mod notification;
pub mod panic_handler;
pub mod session;
pub mod settings;

// Re-export the pieces a host needs to drive a backend
pub use generator::{Completion, Dispatch, Dispatcher, Generator, PixmapRequest, TextPageRequest};
pub use notification::{Notice, NoticeLevel, Notifier};
pub use session::{Session, SessionError};

//! Broadcast channels for user-facing generator messages
//!
//! Generators report problems and hints through a [`Notifier`]. Delivery is
//! fire-and-forget: emitting never blocks, never fails, and carries no
//! ordering guarantee relative to request completions.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Error,
    Warning,
    Notice,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub level: NoticeLevel,
    /// Suggested display time; zero or negative means until dismissed
    pub duration_ms: i32,
    pub created_at: Instant,
}

impl Notice {
    pub fn new(message: impl Into<String>, level: NoticeLevel, duration_ms: i32) -> Self {
        Self {
            message: message.into(),
            level,
            duration_ms,
            created_at: Instant::now(),
        }
    }

    pub fn error(message: impl Into<String>, duration_ms: i32) -> Self {
        Self::new(message, NoticeLevel::Error, duration_ms)
    }

    pub fn warning(message: impl Into<String>, duration_ms: i32) -> Self {
        Self::new(message, NoticeLevel::Warning, duration_ms)
    }

    pub fn notice(message: impl Into<String>, duration_ms: i32) -> Self {
        Self::new(message, NoticeLevel::Notice, duration_ms)
    }

    pub fn until_dismissed(&self) -> bool {
        self.duration_ms <= 0
    }

    /// `None` when the notice stays until dismissed
    pub fn duration(&self) -> Option<Duration> {
        u64::try_from(self.duration_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn is_expired(&self) -> bool {
        self.duration()
            .is_some_and(|d| self.created_at.elapsed() >= d)
    }
}

/// Fan-out hub for notices.
///
/// Cheap to clone; all clones share the same subscriber list. Subscribers
/// whose receiver was dropped are forgotten on the next emit.
#[derive(Clone, Default)]
pub struct Notifier {
    subscribers: Arc<Mutex<Vec<Sender<Notice>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<Notice> {
        let (tx, rx) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn emit(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => error!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Notice => info!("{}", notice.message),
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Unbounded senders never block; a failed send means the receiver is gone
        subscribers.retain(|tx| tx.send(notice.clone()).is_ok());
    }

    pub fn error(&self, message: impl Into<String>, duration_ms: i32) {
        self.emit(Notice::error(message, duration_ms));
    }

    pub fn warning(&self, message: impl Into<String>, duration_ms: i32) {
        self.emit(Notice::warning(message, duration_ms));
    }

    pub fn notice(&self, message: impl Into<String>, duration_ms: i32) {
        self.emit(Notice::notice(message, duration_ms));
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn notice_expiration() {
        let notice = Notice::notice("test", 50);
        assert!(!notice.is_expired());

        thread::sleep(Duration::from_millis(60));
        assert!(notice.is_expired());
    }

    #[test]
    fn non_positive_duration_never_expires() {
        let notice = Notice::warning("sticky", 0);
        assert!(notice.until_dismissed());
        assert_eq!(notice.duration(), None);
        assert!(!notice.is_expired());
        assert!(Notice::error("sticky", -1).until_dismissed());
    }

    #[test]
    fn every_subscriber_receives_each_notice() {
        let notifier = Notifier::new();
        let a = notifier.subscribe();
        let b = notifier.subscribe();

        notifier.error("boom", 3000);
        notifier.notice("hint", 0);

        for rx in [&a, &b] {
            let first = rx.try_recv().unwrap();
            assert_eq!(first.level, NoticeLevel::Error);
            assert_eq!(first.message, "boom");
            assert_eq!(first.duration_ms, 3000);
            assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Notice);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let notifier = Notifier::new();
        notifier.warning("nobody listens", 1000);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let notifier = Notifier::new();
        let kept = notifier.subscribe();
        drop(notifier.subscribe());
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.notice("ping", 100);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap().message, "ping");
    }

    #[test]
    fn clones_share_subscribers() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        let clone = notifier.clone();

        thread::spawn(move || clone.warning("from another thread", 500))
            .join()
            .unwrap();

        assert_eq!(rx.recv().unwrap().level, NoticeLevel::Warning);
    }
}

use crate::application_port::{ReauthNotice, ReauthNotifier};
use std::sync::Mutex;

/// Keeps the most recent re-authentication notice for the UI to pick up.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    latest: Mutex<Option<ReauthNotice>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<ReauthNotice> {
        self.latest.lock().ok().and_then(|n| n.clone())
    }

    /// Returns the notice once; the toast is shown a single time.
    pub fn take(&self) -> Option<ReauthNotice> {
        self.latest.lock().ok().and_then(|mut n| n.take())
    }
}

impl ReauthNotifier for NoticeBoard {
    fn notify(&self, notice: ReauthNotice) {
        tracing::info!(redirect_to = %notice.redirect_to, "re-authentication required");
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(notice);
        }
    }
}

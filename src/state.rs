use crate::fetch::Fetcher;
use crate::refresh::Snapshot;
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<Fetcher>,
    pub api_url: Arc<Url>,
    /// Most recent successful refresh, seeded with the startup figures.
    /// Shown for `GET /` without a range and when a later refresh fails.
    pub last: Arc<Mutex<Snapshot>>,
}

impl AppState {
    pub fn new(fetcher: Fetcher, api_url: Url, initial: Snapshot) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            api_url: Arc::new(api_url),
            last: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn last_snapshot(&self) -> Snapshot {
        self.last.lock().expect("snapshot lock").clone()
    }

    pub fn remember(&self, snapshot: &Snapshot) {
        *self.last.lock().expect("snapshot lock") = snapshot.clone();
    }
}

use crate::aggregate::{self, Views, Window};
use crate::error::RefreshError;
use crate::fetch::Fetcher;
use crate::query::{FilterState, QueryParams};
use chrono::{DateTime, Utc};
use url::Url;

/// Figures produced for one filter state.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub filter: FilterState,
    pub query: QueryParams,
    pub views: Views,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Placeholder used when nothing has been fetched yet.
    pub fn empty(filter: FilterState) -> Self {
        Self {
            filter,
            query: QueryParams::from_filter(&filter),
            views: Views::default(),
            fetched_at: None,
        }
    }
}

/// Filter state in, chart views out. The upstream call is the only side effect.
pub async fn refresh(
    fetcher: &Fetcher,
    base: &Url,
    filter: &FilterState,
) -> Result<Snapshot, RefreshError> {
    let query = QueryParams::from_filter(filter);
    let url = query.url(base);
    let incidents = fetcher.fetch(&url).await?;
    let fetched = incidents.len();
    let window = Window::for_dates(query.after, query.before);
    let views = aggregate::aggregate_blocking(incidents, window).await?;
    log::info!(
        "refreshed {}..{} all={} fma={}: {} incidents, {} buckets",
        query.after,
        query.before,
        query.all,
        query.fma,
        fetched,
        views.line.len()
    );
    Ok(Snapshot {
        filter: *filter,
        query,
        views,
        fetched_at: Some(Utc::now()),
    })
}

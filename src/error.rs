/// Reasons a dashboard refresh can fail. None of them are fatal to the
/// process; the page falls back to the previous figures.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Request could not be sent, timed out, or came back with an error status.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response has no `{0}` key")]
    MissingKey(&'static str),

    #[error("aggregation failed: {0}")]
    Aggregate(#[from] duckdb::Error),

    #[error("aggregation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RefreshError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::MissingKey(_))
    }
}

use chrono::{Duration, NaiveDate};
use url::Url;

/// Upper bound on the number of records requested per search.
pub const LIMIT: u32 = 100_000;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterState {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fire_only: bool,
    pub fma_only: bool,
}

impl FilterState {
    /// The last two days, both toggles off.
    pub fn initial(today: NaiveDate) -> Self {
        Self {
            start_date: today - Duration::days(2),
            end_date: today,
            fire_only: false,
            fma_only: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryParams {
    pub before: NaiveDate,
    pub after: NaiveDate,
    pub limit: u32,
    pub fma: u8,
    pub all: u8,
}

impl QueryParams {
    pub fn from_filter(filter: &FilterState) -> Self {
        // (true, true) intentionally repeats the unfiltered row.
        let (all, fma) = match (filter.fire_only, filter.fma_only) {
            (false, false) => (1, 0),
            (true, false) => (1, 1),
            (false, true) => (0, 0),
            (true, true) => (1, 0),
        };
        Self {
            before: filter.end_date,
            after: filter.start_date,
            limit: LIMIT,
            fma,
            all,
        }
    }

    pub fn url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("before", &self.before.format(DATE_FORMAT).to_string())
            .append_pair("after", &self.after.format(DATE_FORMAT).to_string())
            .append_pair("limit", &self.limit.to_string())
            .append_pair("all", &self.all.to_string())
            .append_pair("fma", &self.fma.to_string());
        url
    }

    pub fn palette(&self) -> Palette {
        match (self.all, self.fma) {
            (1, 1) => Palette::Blues,
            (0, _) => Palette::InfernoReversed,
            _ => Palette::ViridisReversed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Palette {
    ViridisReversed,
    Blues,
    InfernoReversed,
}

const VIRIDIS: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];
const BLUES: &[&str] = &[
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c",
    "#08306b",
];
const INFERNO: &[&str] = &[
    "#000004", "#1b0c41", "#4a0c6b", "#781c6d", "#a52c60", "#cf4446", "#ed6925", "#fb9b06",
    "#f7d13d", "#fcffa4",
];

impl Palette {
    pub fn colors(self) -> Vec<&'static str> {
        match self {
            Self::ViridisReversed => VIRIDIS.iter().rev().copied().collect(),
            Self::Blues => BLUES.to_vec(),
            Self::InfernoReversed => INFERNO.iter().rev().copied().collect(),
        }
    }

    /// Colour for the `idx`-th series, cycling like a discrete sequence.
    pub fn color(self, idx: usize) -> &'static str {
        let colors = self.colors();
        colors[idx % colors.len()]
    }
}

use crate::error::RefreshError;
use crate::incident::Incident;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use duckdb::{params, Connection};

/// Width of a line-chart bucket in seconds.
pub const BUCKET_SECS: i64 = 15 * 60;
/// Buckets start this many seconds after each quarter hour.
pub const BUCKET_OFFSET_SECS: i64 = 1;
/// Above this many buckets only populated ones are returned (one year of quarter hours).
pub const MAX_FILLED_BUCKETS: i64 = 366 * 96;

/// Half-open `[start, end)` epoch-second range the line view is limited to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// From `after` 00:00 UTC up to the midnight that ends `before`.
    pub fn for_dates(after: NaiveDate, before: NaiveDate) -> Self {
        Self {
            start: midnight(after),
            end: before.succ_opt().map(midnight).unwrap_or(i64::MAX),
        }
    }

    pub fn contains(&self, sec: i64) -> bool {
        self.start <= sec && sec < self.end
    }
}

fn midnight(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
        .timestamp()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieRow {
    pub natureza: String,
    pub day: u32,
    pub familia: String,
    pub incidents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarRow {
    pub natureza: String,
    pub date: String,
    pub incidents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineBucket {
    /// Inclusive start of the bucket, epoch seconds.
    pub start: i64,
    pub count: i64,
}

impl LineBucket {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start, 0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Views {
    pub pie: Vec<PieRow>,
    pub bar: Vec<BarRow>,
    pub line: Vec<LineBucket>,
}

impl Views {
    pub fn is_empty(&self) -> bool {
        self.pie.is_empty() && self.bar.is_empty() && self.line.is_empty()
    }
}

/// Start of the half-open bucket `[start, start + 15min)` containing `sec`,
/// `None` when it is not representable.
pub fn bucket_start(sec: i64) -> Option<i64> {
    sec.checked_sub(BUCKET_OFFSET_SECS)?
        .div_euclid(BUCKET_SECS)
        .checked_mul(BUCKET_SECS)?
        .checked_add(BUCKET_OFFSET_SECS)
}

/// Runs the three groupings on the blocking pool.
pub async fn aggregate_blocking(
    incidents: Vec<Incident>,
    window: Window,
) -> Result<Views, RefreshError> {
    tokio::task::spawn_blocking(move || aggregate(&incidents, window)).await?
}

/// Timestamps outside `window` are left out of the line view only.
pub fn aggregate(incidents: &[Incident], window: Window) -> Result<Views, RefreshError> {
    let mut conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE incidents (
             incident_id VARCHAR,
             natureza    VARCHAR,
             familia     VARCHAR,
             date        VARCHAR,
             day         INTEGER,
             ts          BIGINT,
             bucket      BIGINT
         );",
    )?;
    load(&mut conn, incidents, window)?;

    Ok(Views {
        pie: pie_view(&conn)?,
        bar: bar_view(&conn)?,
        line: fill_gaps(&line_counts(&conn)?),
    })
}

fn load(conn: &mut Connection, incidents: &[Incident], window: Window) -> Result<(), RefreshError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO incidents (incident_id, natureza, familia, date, day, ts, bucket)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        for incident in incidents {
            let ts = incident
                .occurred_at()
                .filter(|sec| window.contains(*sec));
            let bucket = ts.and_then(bucket_start);
            stmt.execute(params![
                incident.key(),
                incident.natureza.as_deref(),
                incident.familia_name.as_deref(),
                incident.date.as_deref(),
                incident.day().map(|d| d as i32),
                bucket.and(ts),
                bucket,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn pie_view(conn: &Connection) -> Result<Vec<PieRow>, RefreshError> {
    let mut stmt = conn.prepare(
        "SELECT natureza, day, familia, COUNT(DISTINCT incident_id) AS cnt
         FROM incidents
         WHERE natureza IS NOT NULL AND day IS NOT NULL AND familia IS NOT NULL
         GROUP BY natureza, day, familia
         ORDER BY natureza, day, familia",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let day: i32 = row.get(1)?;
        out.push(PieRow {
            natureza: row.get(0)?,
            day: day as u32,
            familia: row.get(2)?,
            incidents: row.get(3)?,
        });
    }
    Ok(out)
}

fn bar_view(conn: &Connection) -> Result<Vec<BarRow>, RefreshError> {
    let mut stmt = conn.prepare(
        "SELECT natureza, date, COUNT(DISTINCT incident_id) AS cnt
         FROM incidents
         WHERE natureza IS NOT NULL AND date IS NOT NULL
         GROUP BY natureza, date
         ORDER BY natureza, date",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(BarRow {
            natureza: row.get(0)?,
            date: row.get(1)?,
            incidents: row.get(2)?,
        });
    }
    Ok(out)
}

/// Number of (timestamp, category) groups per populated bucket.
fn line_counts(conn: &Connection) -> Result<Vec<(i64, i64)>, RefreshError> {
    let mut stmt = conn.prepare(
        "WITH ts_groups AS (
             SELECT ts, natureza, ANY_VALUE(bucket) AS bucket
             FROM incidents
             WHERE ts IS NOT NULL AND bucket IS NOT NULL AND natureza IS NOT NULL
             GROUP BY ts, natureza
         )
         SELECT bucket, COUNT(*) AS cnt
         FROM ts_groups
         GROUP BY bucket
         ORDER BY bucket",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push((row.get(0)?, row.get(1)?));
    }
    Ok(out)
}

/// Expands sorted bucket counts into a contiguous series, zero where empty.
fn fill_gaps(counts: &[(i64, i64)]) -> Vec<LineBucket> {
    let (Some(first), Some(last)) = (counts.first(), counts.last()) else {
        return Vec::new();
    };
    let span = last.0.saturating_sub(first.0) / BUCKET_SECS + 1;
    if span > MAX_FILLED_BUCKETS {
        return counts
            .iter()
            .map(|&(start, count)| LineBucket { start, count })
            .collect();
    }
    let mut out = Vec::new();
    let mut next = counts.iter().peekable();
    let mut start = first.0;
    while start <= last.0 {
        let count = match next.peek().copied() {
            Some(&(bucket, count)) if bucket == start => {
                next.next();
                count
            }
            _ => 0,
        };
        out.push(LineBucket { start, count });
        match start.checked_add(BUCKET_SECS) {
            Some(next_start) => start = next_start,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::Timestamp;

    // 2022-02-05 00:00:00 UTC
    const MIDNIGHT: i64 = 1_644_019_200;

    fn window() -> Window {
        Window::for_dates(
            NaiveDate::from_ymd_opt(2022, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 2, 12).unwrap(),
        )
    }

    fn incident(id: &str, natureza: &str, familia: &str, date: &str, sec: i64) -> Incident {
        Incident {
            sado_id: Some(id.to_string()),
            natureza: Some(natureza.to_string()),
            familia_name: Some(familia.to_string()),
            date: Some(date.to_string()),
            date_time: Some(Timestamp { sec: Some(sec) }),
            ..Incident::default()
        }
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket_start(MIDNIGHT + 1), Some(MIDNIGHT + 1));
        assert_eq!(bucket_start(MIDNIGHT + 5), Some(MIDNIGHT + 1));
        assert_eq!(bucket_start(MIDNIGHT + 900), Some(MIDNIGHT + 1));
        assert_eq!(bucket_start(MIDNIGHT + 901), Some(MIDNIGHT + 901));
        assert_eq!(bucket_start(MIDNIGHT), Some(MIDNIGHT - 899));
        assert_eq!(bucket_start(i64::MIN), None);
        assert!(bucket_start(i64::MAX).is_some());
    }

    #[test]
    fn resamples_into_quarter_hours() {
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("2", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 600),
            incident("3", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 960),
        ];
        let views = aggregate(&incidents, window()).unwrap();
        assert_eq!(
            views.line,
            vec![
                LineBucket { start: MIDNIGHT + 1, count: 2 },
                LineBucket { start: MIDNIGHT + 901, count: 1 },
            ]
        );
        assert_eq!(
            views.line[0].start_time().unwrap().to_rfc3339(),
            "2022-02-05T00:00:01+00:00"
        );
    }

    #[test]
    fn line_fills_empty_buckets() {
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("2", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 3 * 900 + 5),
        ];
        let counts: Vec<i64> = aggregate(&incidents)
            .unwrap()
            .line
            .iter()
            .map(|b| b.count)
            .collect();
        assert_eq!(counts, vec![1, 0, 0, 1]);
    }

    #[test]
    fn line_counts_timestamp_category_groups() {
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("2", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("3", "Agrícola", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
        ];
        let views = aggregate(&incidents, window()).unwrap();
        assert_eq!(views.line, vec![LineBucket { start: MIDNIGHT + 1, count: 2 }]);
    }

    #[test]
    fn counts_distinct_ids() {
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 50),
            incident("2", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 70),
            incident("3", "Mato", "Incêndio Rural", "06-02-2022", MIDNIGHT + 86_400),
        ];
        let views = aggregate(&incidents, window()).unwrap();
        assert_eq!(
            views.pie,
            vec![
                PieRow {
                    natureza: "Mato".to_string(),
                    day: 5,
                    familia: "Incêndio Rural".to_string(),
                    incidents: 2,
                },
                PieRow {
                    natureza: "Mato".to_string(),
                    day: 6,
                    familia: "Incêndio Rural".to_string(),
                    incidents: 1,
                },
            ]
        );
        assert_eq!(
            views.bar,
            vec![
                BarRow {
                    natureza: "Mato".to_string(),
                    date: "05-02-2022".to_string(),
                    incidents: 2,
                },
                BarRow {
                    natureza: "Mato".to_string(),
                    date: "06-02-2022".to_string(),
                    incidents: 1,
                },
            ]
        );
    }

    #[test]
    fn missing_keys_drop_out_of_that_view_only() {
        let mut no_family = incident("1", "Mato", "x", "05-02-2022", MIDNIGHT + 5);
        no_family.familia_name = None;
        let mut no_time = incident("2", "Mato", "Incêndio Rural", "05-02-2022", 0);
        no_time.date_time = None;
        let views = aggregate(&[no_family, no_time], window()).unwrap();
        assert_eq!(views.pie.len(), 1);
        assert_eq!(views.pie[0].incidents, 1);
        assert_eq!(views.bar[0].incidents, 2);
        assert_eq!(views.line, vec![LineBucket { start: MIDNIGHT + 1, count: 1 }]);
    }

    #[test]
    fn empty_input_gives_empty_views() {
        let views = aggregate(&[], window()).unwrap();
        assert!(views.is_empty());
        assert_eq!(views, Views::default());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("2", "Agrícola", "Incêndio Rural", "05-02-2022", MIDNIGHT + 1000),
            incident("3", "Queda de Árvore", "Proteção e Assistência", "05-02-2022", MIDNIGHT + 4000),
        ];
        let first = aggregate(&incidents, window()).unwrap();
        let second = aggregate(&incidents, window()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn window_spans_whole_days() {
        let window = window();
        assert_eq!(window.start, 1_643_673_600);
        assert_eq!(window.end, 1_644_710_400);
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
        assert!(!window.contains(window.start - 1));
    }

    #[test]
    fn out_of_range_timestamps_stay_out_of_line_view() {
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-02-2022", 0),
            incident("2", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
            incident("3", "Mato", "Incêndio Rural", "05-02-2022", i64::MAX),
            incident("4", "Mato", "Incêndio Rural", "05-02-2022", i64::MIN),
            incident("5", "Mato", "Incêndio Rural", "13-02-2022", MIDNIGHT + 8 * 86_400),
        ];
        let views = aggregate(&incidents, window()).unwrap();
        assert_eq!(views.line, vec![LineBucket { start: MIDNIGHT + 1, count: 1 }]);
        let bar_total: i64 = views.bar.iter().map(|r| r.incidents).sum();
        assert_eq!(bar_total, 5);
    }

    #[test]
    fn wide_windows_are_not_zero_filled() {
        let wide = Window::for_dates(
            NaiveDate::from_ymd_opt(1995, 8, 5).unwrap(),
            NaiveDate::from_ymd_opt(2022, 2, 12).unwrap(),
        );
        let incidents = vec![
            incident("1", "Mato", "Incêndio Rural", "05-08-1995", wide.start + 5),
            incident("2", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5),
        ];
        let views = aggregate(&incidents, wide).unwrap();
        assert_eq!(views.line.len(), 2);
        assert!(views.line.iter().all(|b| b.count == 1));
    }

    #[test]
    fn fill_gaps_stops_at_the_end_of_the_range() {
        let last = bucket_start(i64::MAX).unwrap();
        let filled = fill_gaps(&[(last - BUCKET_SECS, 1), (last, 2)]);
        assert_eq!(
            filled,
            vec![
                LineBucket { start: last - BUCKET_SECS, count: 1 },
                LineBucket { start: last, count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn blocking_wrapper_matches() {
        let incidents = vec![incident("1", "Mato", "Incêndio Rural", "05-02-2022", MIDNIGHT + 5)];
        let direct = aggregate(&incidents, window()).unwrap();
        let pooled = aggregate_blocking(incidents, window()).await.unwrap();
        assert_eq!(direct, pooled);
    }
}

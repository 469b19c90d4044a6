//! Inline SVG renderings of the three aggregated views.

use crate::aggregate::{BarRow, LineBucket, PieRow};
use crate::incident::parse_date;
use crate::query::Palette;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt::Write;

const PIE_SIZE: f64 = 320.0;
const PIE_HOLE: f64 = 0.5;

const PLOT_W: usize = 600;
const PLOT_H: usize = 240;
const AXIS_H: usize = 30;
const AXIS_W: usize = 40;
const LINE_TICKS: usize = 5;

fn append(out: &mut String, value: &str) {
    let _ = writeln!(out, "{}", value);
}

/// Category to colour assignment shared by the pie and bar charts.
pub struct Colors {
    by_category: BTreeMap<String, &'static str>,
}

impl Colors {
    pub fn new<'a>(categories: impl IntoIterator<Item = &'a str>, palette: Palette) -> Self {
        let mut names: Vec<&str> = categories.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        let by_category = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), palette.color(idx)))
            .collect();
        Self { by_category }
    }

    pub fn get(&self, category: &str) -> &'static str {
        self.by_category.get(category).copied().unwrap_or("#888888")
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.by_category.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

pub fn pie(out: &mut String, rows: &[PieRow], colors: &Colors) {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.natureza.as_str()).or_default() += row.incidents;
    }
    let total: i64 = totals.values().sum();
    if total <= 0 {
        append_empty(out);
        return;
    }

    let c = PIE_SIZE / 2.0;
    let r = c - 4.0;
    let hole = r * PIE_HOLE;
    append(
        out,
        &format!(
            "<svg class=pie width={} height={} viewBox='0 0 {} {}'>",
            PIE_SIZE, PIE_SIZE, PIE_SIZE, PIE_SIZE
        ),
    );
    let mut angle = -PI / 2.0;
    for (category, count) in &totals {
        if *count <= 0 {
            continue;
        }
        let share = *count as f64 / total as f64;
        let title = format!("{}: {} ({})", escape(category), count, percent(share));
        if *count == total {
            // A single full slice cannot be drawn as an arc.
            append(
                out,
                &format!(
                    "<circle cx={c} cy={c} r={} fill=none stroke='{}' stroke-width={}><title>{}</title></circle>",
                    (r + hole) / 2.0,
                    colors.get(category),
                    r - hole,
                    title
                ),
            );
            break;
        }
        let sweep = share * 2.0 * PI;
        let end = angle + sweep;
        let large = if sweep > PI { 1 } else { 0 };
        append(
            out,
            &format!(
                "<path fill='{}' d='M{:.2},{:.2} A{r:.2},{r:.2} 0 {large} 1 {:.2},{:.2} L{:.2},{:.2} A{hole:.2},{hole:.2} 0 {large} 0 {:.2},{:.2} Z'><title>{}</title></path>",
                colors.get(category),
                c + r * angle.cos(),
                c + r * angle.sin(),
                c + r * end.cos(),
                c + r * end.sin(),
                c + hole * end.cos(),
                c + hole * end.sin(),
                c + hole * angle.cos(),
                c + hole * angle.sin(),
                title
            ),
        );
        angle = end;
    }
    append(
        out,
        &format!("<text class=total x={c} y={c} text-anchor=middle>{}</text>", total),
    );
    append(out, "</svg>");

    append(out, "<ul class=legend>");
    for (category, count) in &totals {
        append(
            out,
            &format!(
                "<li><span class=swatch style='background: {}'></span>{} <b>{}</b> {}</li>",
                colors.get(category),
                escape(category),
                count,
                percent(*count as f64 / total as f64)
            ),
        );
    }
    append(out, "</ul>");
}

pub fn bar(out: &mut String, rows: &[BarRow], colors: &Colors) {
    if rows.is_empty() {
        append_empty(out);
        return;
    }
    let mut by_date: BTreeMap<(String, &str), BTreeMap<&str, i64>> = BTreeMap::new();
    for row in rows {
        let sort_key = parse_date(&row.date)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| row.date.clone());
        *by_date
            .entry((sort_key, row.date.as_str()))
            .or_default()
            .entry(row.natureza.as_str())
            .or_default() += row.incidents;
    }

    let max_total = by_date
        .values()
        .map(|stack| stack.values().sum::<i64>())
        .max()
        .unwrap_or(0);
    let max_val = nice_max(max_total);
    let step = grid_step(max_val);
    let slot = (PLOT_W / by_date.len()).max(1);
    let bar_w = (slot * 4 / 5).max(1);
    let height = |v: i64| -> usize { (v.max(0) as usize * PLOT_H) / max_val as usize };

    append(
        out,
        &format!(
            "<svg class=bar width={} height={}>",
            AXIS_W + PLOT_W,
            PLOT_H + AXIS_H
        ),
    );
    append_grid(out, max_val, step);

    for (idx, ((_, label), stack)) in by_date.iter().enumerate() {
        let x = AXIS_W + idx * slot + slot.saturating_sub(bar_w) / 2;
        let mut top = PLOT_H;
        for (category, count) in colors.iter().filter_map(|(name, _)| {
            stack.get(name).map(|count| (name, *count))
        }) {
            let h = height(count);
            top = top.saturating_sub(h);
            append(
                out,
                &format!(
                    "<rect x={} y={} width={} height={} fill='{}'><title>{} {}: {}</title></rect>",
                    x,
                    top,
                    bar_w,
                    h,
                    colors.get(category),
                    escape(label),
                    escape(category),
                    count
                ),
            );
        }
        append(
            out,
            &format!(
                "<text x={} y={} text-anchor=middle>{}</text>",
                x + bar_w / 2,
                PLOT_H + 18,
                escape(label)
            ),
        );
    }
    append(out, "</svg>");
}

pub fn line(out: &mut String, buckets: &[LineBucket], palette: Palette) {
    if buckets.is_empty() {
        append_empty(out);
        return;
    }
    let max_val = nice_max(buckets.iter().map(|b| b.count).max().unwrap_or(0));
    let step = grid_step(max_val);
    let span = (buckets.len() - 1).max(1) as f64;
    let x_at = |idx: usize| -> f64 { AXIS_W as f64 + idx as f64 * PLOT_W as f64 / span };
    let y_at = |v: i64| -> f64 { PLOT_H as f64 - (v as f64 * PLOT_H as f64 / max_val as f64) };

    append(
        out,
        &format!(
            "<svg class=line width={} height={}>",
            AXIS_W + PLOT_W,
            PLOT_H + AXIS_H
        ),
    );
    append_grid(out, max_val, step);

    let mut points = String::new();
    for (idx, bucket) in buckets.iter().enumerate() {
        let _ = write!(points, "{:.1},{:.1} ", x_at(idx), y_at(bucket.count));
    }
    append(
        out,
        &format!(
            "<polyline fill=none stroke='{}' stroke-width=2 points='{}' />",
            palette.color(0),
            points.trim_end()
        ),
    );

    for idx in tick_indices(buckets.len(), LINE_TICKS) {
        let label = buckets[idx]
            .start_time()
            .map(|t| t.format("%d/%m %H:%M").to_string())
            .unwrap_or_default();
        append(
            out,
            &format!(
                "<line class=tick x1={x:.1} y1={} x2={x:.1} y2={} /><text x={x:.1} y={} text-anchor=middle>{}</text>",
                PLOT_H,
                PLOT_H + 6,
                PLOT_H + 20,
                label,
                x = x_at(idx)
            ),
        );
    }
    append(out, "</svg>");
}

fn append_grid(out: &mut String, max_val: i64, step: i64) {
    let mut val = 0;
    while val <= max_val {
        let y = PLOT_H - (val as usize * PLOT_H) / max_val as usize;
        append(
            out,
            &format!(
                "<line class=hrz x1={} y1={y} x2={} y2={y} /><text x={} y={} text-anchor=end>{}</text>",
                AXIS_W,
                AXIS_W + PLOT_W,
                AXIS_W - 4,
                y + 4,
                val
            ),
        );
        val += step;
    }
}

fn append_empty(out: &mut String) {
    append(out, "<div class=nodata>Sem dados</div>");
}

/// Evenly spread indices, always including the first and last point.
fn tick_indices(len: usize, ticks: usize) -> Vec<usize> {
    match len {
        0 => Vec::new(),
        1 => vec![0],
        _ if len <= ticks => (0..len).collect(),
        _ => {
            let mut out: Vec<usize> = (0..ticks)
                .map(|i| i * (len - 1) / (ticks - 1))
                .collect();
            out.dedup();
            out
        }
    }
}

/// Rounds an axis maximum up to 1, 2 or 5 times a power of ten.
fn nice_max(max_val: i64) -> i64 {
    if max_val <= 5 {
        return 5;
    }
    let mut magnitude = 1;
    while magnitude * 10 < max_val {
        magnitude *= 10;
    }
    match max_val {
        v if v <= magnitude * 2 => magnitude * 2,
        v if v <= magnitude * 5 => magnitude * 5,
        _ => magnitude * 10,
    }
}

fn grid_step(max_val: i64) -> i64 {
    match max_val {
        v if v % 5 == 0 => v / 5,
        v => (v / 4).max(1),
    }
}

fn percent(share: f64) -> String {
    let pct = share * 100.0;
    if pct < 2.0 {
        format!("{:.1}%", pct)
    } else {
        format!("{:.0}%", pct)
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pie_row(natureza: &str, incidents: i64) -> PieRow {
        PieRow {
            natureza: natureza.to_string(),
            day: 5,
            familia: "Incêndio Rural".to_string(),
            incidents,
        }
    }

    #[test]
    fn nice_axis_bounds() {
        assert_eq!(nice_max(0), 5);
        assert_eq!(nice_max(7), 10);
        assert_eq!(nice_max(13), 20);
        assert_eq!(nice_max(41), 50);
        assert_eq!(nice_max(51), 100);
        assert_eq!(nice_max(100), 100);
        assert_eq!(nice_max(1_234), 2_000);
        assert_eq!(grid_step(50), 10);
        assert_eq!(grid_step(5), 1);
    }

    #[test]
    fn ticks_cover_both_ends() {
        assert_eq!(tick_indices(0, 5), Vec::<usize>::new());
        assert_eq!(tick_indices(3, 5), vec![0, 1, 2]);
        assert_eq!(tick_indices(9, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(tick_indices(100, 5).last(), Some(&99));
    }

    #[test]
    fn colors_are_stable_per_category() {
        let colors = Colors::new(["Mato", "Agrícola", "Mato"], Palette::Blues);
        assert_eq!(colors.get("Agrícola"), Palette::Blues.color(0));
        assert_eq!(colors.get("Mato"), Palette::Blues.color(1));
        assert_eq!(colors.get("Urbano"), "#888888");
    }

    #[test]
    fn pie_sums_per_category() {
        let rows = vec![pie_row("Mato", 2), pie_row("Mato", 1), pie_row("Agrícola", 1)];
        let colors = Colors::new(rows.iter().map(|r| r.natureza.as_str()), Palette::ViridisReversed);
        let mut out = String::new();
        pie(&mut out, &rows, &colors);
        assert_eq!(out.matches("<path").count(), 2);
        assert!(out.contains("Mato <b>3</b> 75%"));
        assert!(out.contains("Agrícola <b>1</b> 25%"));
    }

    #[test]
    fn pie_single_category_is_a_ring() {
        let rows = vec![pie_row("Mato", 4)];
        let colors = Colors::new(["Mato"], Palette::ViridisReversed);
        let mut out = String::new();
        pie(&mut out, &rows, &colors);
        assert!(out.contains("<circle"));
        assert!(!out.contains("<path"));
    }

    #[test]
    fn bar_orders_dates_chronologically() {
        let rows = vec![
            BarRow {
                natureza: "Mato".to_string(),
                date: "01-03-2022".to_string(),
                incidents: 1,
            },
            BarRow {
                natureza: "Mato".to_string(),
                date: "28-02-2022".to_string(),
                incidents: 3,
            },
        ];
        let colors = Colors::new(["Mato"], Palette::Blues);
        let mut out = String::new();
        bar(&mut out, &rows, &colors);
        let feb = out.find(">28-02-2022<").unwrap();
        let mar = out.find(">01-03-2022<").unwrap();
        assert!(feb < mar);
        assert_eq!(out.matches("<rect").count(), 2);
    }

    #[test]
    fn line_draws_one_point_per_bucket() {
        let buckets: Vec<LineBucket> = (0..4)
            .map(|i| LineBucket {
                start: 1_644_019_201 + i * 900,
                count: i,
            })
            .collect();
        let mut out = String::new();
        line(&mut out, &buckets, Palette::InfernoReversed);
        let points = out.split("points='").nth(1).unwrap().split('\'').next().unwrap();
        assert_eq!(points.split(' ').count(), 4);
        assert!(out.contains("05/02 00:00"));
    }

    #[test]
    fn empty_views_render_placeholders() {
        let colors = Colors::new([], Palette::Blues);
        let mut out = String::new();
        pie(&mut out, &[], &colors);
        bar(&mut out, &[], &colors);
        line(&mut out, &[], Palette::Blues);
        assert_eq!(out.matches("Sem dados").count(), 3);
        assert!(!out.contains("<svg"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b>&'\""), "a&lt;b&gt;&amp;&#39;&quot;");
    }
}

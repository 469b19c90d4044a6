use crate::chart::{self, Colors};
use crate::error::RefreshError;
use crate::query::FilterState;
use crate::refresh::{self, Snapshot};
use crate::state::AppState;
use axum::{
    extract::{RawQuery, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt::Write;

const STYLE_CSS: &str = include_str!("../assets/style.css");
const SCRIPT_JS: &str = include_str!("../assets/script.js");

const DATE_FORMAT: &str = "%Y-%m-%d";
const MIN_DATE: &str = "1995-08-05";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/favicon.ico", get(favicon_handler))
        .with_state(state)
}

async fn favicon_handler() -> impl IntoResponse {
    axum::http::StatusCode::NO_CONTENT
}

#[derive(Debug)]
enum Notice {
    Stale { decode: bool, shown: FilterState },
    Empty,
}

async fn dashboard_handler(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let params = parse_query(raw.unwrap_or_default());
    let filter = match filter_from_params(&params) {
        Ok(Some(filter)) => filter,
        Ok(None) => {
            let latest = state.last_snapshot();
            return html(render_page(&latest.filter, &latest, None));
        }
        Err(()) => return Redirect::to("/").into_response(),
    };

    match refresh::refresh(&state.fetcher, &state.api_url, &filter).await {
        Ok(snapshot) => {
            state.remember(&snapshot);
            let notice = snapshot.views.is_empty().then_some(Notice::Empty);
            html(render_page(&filter, &snapshot, notice.as_ref()))
        }
        Err(err) => {
            log::warn!("refresh failed, keeping previous figures: {}", err);
            let previous = state.last_snapshot();
            let notice = stale_notice(&err, &previous);
            html(render_page(&filter, &previous, Some(&notice)))
        }
    }
}

fn stale_notice(err: &RefreshError, previous: &Snapshot) -> Notice {
    Notice::Stale {
        decode: err.is_decode(),
        shown: previous.filter,
    }
}

fn html(body: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Content-Type",
        "text/html; charset=utf-8".parse().expect("header"),
    );
    (headers, body).into_response()
}

fn append(out: &mut String, value: &str) {
    let _ = writeln!(out, "{}", value);
}

fn parse_query(raw: String) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
        params
            .entry(k.to_string())
            .or_default()
            .push(v.to_string());
    }
    params
}

fn first_value<'a>(params: &'a HashMap<String, Vec<String>>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|vals| vals.first()).map(String::as_str)
}

/// `Ok(None)` when no range was requested, `Err` when it cannot be parsed.
fn filter_from_params(params: &HashMap<String, Vec<String>>) -> Result<Option<FilterState>, ()> {
    let (from, to) = match (first_value(params, "from"), first_value(params, "to")) {
        (Some(from), Some(to)) => (from, to),
        (None, None) => return Ok(None),
        _ => return Err(()),
    };
    let start_date = NaiveDate::parse_from_str(from, DATE_FORMAT).map_err(|_| ())?;
    let end_date = NaiveDate::parse_from_str(to, DATE_FORMAT).map_err(|_| ())?;
    Ok(Some(FilterState {
        start_date,
        end_date,
        fire_only: toggled(params, "fire"),
        fma_only: toggled(params, "fma"),
    }))
}

fn toggled(params: &HashMap<String, Vec<String>>, key: &str) -> bool {
    matches!(first_value(params, key), Some("1" | "on" | "true"))
}

fn render_page(filter: &FilterState, snapshot: &Snapshot, notice: Option<&Notice>) -> String {
    let today = Utc::now().date_naive();
    let views = &snapshot.views;
    let palette = snapshot.query.palette();
    let colors = Colors::new(
        views
            .pie
            .iter()
            .map(|r| r.natureza.as_str())
            .chain(views.bar.iter().map(|r| r.natureza.as_str())),
        palette,
    );

    let mut body = String::new();
    append(&mut body, "<!DOCTYPE html>");
    append(&mut body, "<html lang=pt>");
    append(&mut body, "<head>");
    append(&mut body, "<meta charset=\"utf-8\">");
    append(
        &mut body,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
    );
    append(&mut body, "<link rel='icon' href='/favicon.ico' sizes='32x32'>");
    append(&mut body, "<title>PROCIV CHECKER</title>");
    append(&mut body, &format!("<style>{}</style>", STYLE_CSS));
    append(&mut body, &format!("<script>{}</script>", SCRIPT_JS));
    append(&mut body, "</head>");
    append(&mut body, "<body>");
    append(&mut body, "<div class=container>");

    append(&mut body, "<div class=header>");
    append(&mut body, "<h4 class=title>VOST PORTUGAL</h4>");
    append(&mut body, "<h4 class=subtitle>Dashboard Operacional</h4>");
    append(&mut body, "</div>");
    append(&mut body, "<hr>");

    append_filters(&mut body, filter, today);
    if let Some(notice) = notice {
        append_notice(&mut body, notice);
    }

    append(&mut body, "<div class=row>");
    append(&mut body, "<div class=panel>");
    chart::pie(&mut body, &views.pie, &colors);
    append(&mut body, "</div>");
    append(&mut body, "<div class=panel>");
    chart::bar(&mut body, &views.bar, &colors);
    append(&mut body, "</div>");
    append(&mut body, "</div>");

    append(&mut body, "<div class=row>");
    append(&mut body, "<div class='panel wide'>");
    chart::line(&mut body, &views.line, palette);
    append(&mut body, "</div>");
    append(&mut body, "</div>");

    if let Some(fetched_at) = snapshot.fetched_at {
        append(
            &mut body,
            &format!(
                "<div class=updated>Atualizado {}</div>",
                fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        );
    }

    append(&mut body, "</div>");
    append(&mut body, "</body>");
    append(&mut body, "</html>");
    body
}

fn append_filters(out: &mut String, filter: &FilterState, today: NaiveDate) {
    let max = today.format(DATE_FORMAT);
    append(out, "<form class=filters method=get action='/'>");
    for (name, date) in [("from", filter.start_date), ("to", filter.end_date)] {
        append(
            out,
            &format!(
                "<input type=date name={} value={} min={} max={}>",
                name,
                date.format(DATE_FORMAT),
                MIN_DATE,
                max
            ),
        );
    }
    append_toggle(out, "fire", "Apenas Incêndios", filter.fire_only);
    append_toggle(out, "fma", "Apenas FMA", filter.fma_only);
    append(out, "<noscript><button type=submit>Atualizar</button></noscript>");
    append(out, "</form>");
}

fn append_toggle(out: &mut String, name: &str, label: &str, on: bool) {
    append(
        out,
        &format!(
            "<label class='toggle {}'><input type=checkbox name={} value=1{}><span class=switch></span>{}</label>",
            name,
            name,
            if on { " checked" } else { "" },
            label
        ),
    );
}

fn append_notice(out: &mut String, notice: &Notice) {
    match notice {
        Notice::Stale { decode, shown } => {
            let reason = if *decode {
                "resposta inválida da API"
            } else {
                "falha de ligação à API"
            };
            append(
                out,
                &format!(
                    "<div class='notice stale'>Não foi possível atualizar ({}). A mostrar dados de {} a {}.</div>",
                    reason,
                    shown.start_date.format(DATE_FORMAT),
                    shown.end_date.format(DATE_FORMAT)
                ),
            );
        }
        Notice::Empty => {
            append(
                out,
                "<div class='notice empty'>Sem incidentes no período selecionado.</div>",
            );
        }
    }
}

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One record from the `data` array of the incidents search endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub sado_id: Option<String>,
    #[serde(default)]
    pub natureza: Option<String>,
    #[serde(default)]
    pub familia_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_time: Option<Timestamp>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Timestamp {
    #[serde(default)]
    pub sec: Option<i64>,
}

impl Incident {
    /// Identity used for distinct counting: the SADO number, else the API id.
    pub fn key(&self) -> Option<&str> {
        self.sado_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn occurred_at(&self) -> Option<i64> {
        self.date_time.and_then(|ts| ts.sec)
    }

    pub fn day(&self) -> Option<u32> {
        self.date.as_deref().and_then(parse_date).map(|d| d.day())
    }
}

/// The API reports `dd-mm-YYYY`; ISO dates are accepted too.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

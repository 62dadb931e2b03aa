use serde::{Deserialize, Deserializer};
use serde_json::Value;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

// Request body for POST/PUT /api/tasks
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_deadline")]
    pub deadline: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    // assignedUserName is derived from the assigned user and never read from the client
    pub assigned_user: Option<String>,
    // Immutable after creation; accepted only so it can be stripped
    pub date_created: Option<Value>,
}

// Request body for POST/PUT /api/users
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub pending_tasks: Option<Vec<String>>,
    pub date_created: Option<Value>,
}

// Query string of the list endpoints; every value is still raw JSON/text here
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ListParams {
    #[serde(rename = "where")]
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

// Query string of the get-by-id endpoints
#[derive(Debug, Deserialize, Default, Clone)]
pub struct GetParams {
    pub select: Option<String>,
}

// Accepts RFC 3339, a bare YYYY-MM-DD date, or epoch milliseconds (number or numeric string)
fn deserialize_deadline<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<Value> = Option::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| D::Error::custom("deadline is not a valid timestamp"))?;
            from_millis(millis).map(Some).ok_or_else(|| D::Error::custom("deadline out of range"))
        }
        Some(Value::String(s)) => parse_deadline(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid deadline '{}'", s))),
        Some(other) => Err(D::Error::custom(format!("invalid deadline {}", other))),
    }
}

pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    raw.parse::<i64>().ok().and_then(from_millis)
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

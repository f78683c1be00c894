// sql.rs — SQL text and row decoding for the Dolt backend.
//
// Dolt speaks MySQL-flavoured SQL. Queries are built as text (the CLI has no
// bind parameters) so every literal goes through `quote`. Results come back
// from `dolt sql -r json` as `{"rows": [{column: value, ...}]}`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use wl_board::{CompletionRecord, Stamp, WorkItem};

use crate::error::{Result, StoreError};

pub type Row = Map<String, Value>;

pub const ITEM_COLUMNS: &str = "id, title, description, project, type, priority, effort_level, \
     tags, posted_by, claimed_by, status, created_at, updated_at";

pub const COMPLETION_COLUMNS: &str =
    "id, wanted_id, completed_by, evidence, validated_by, stamp_id, completed_at, validated_at";

pub const STAMP_COLUMNS: &str = "id, author, subject, quality, reliability, severity, \
     context_id, skill_tags, message, created_at";

/// Quote a string literal, escaping quotes and backslashes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

pub fn quote_opt(value: Option<&str>) -> String {
    value.map(quote).unwrap_or_else(|| "NULL".to_string())
}

fn datetime(at: &DateTime<Utc>) -> String {
    quote(&at.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
}

fn datetime_opt(at: Option<&DateTime<Utc>>) -> String {
    at.map(datetime).unwrap_or_else(|| "NULL".to_string())
}

fn json_list(values: &[String]) -> Result<String> {
    Ok(quote(&serde_json::to_string(values)?))
}

/// Quote a ref for an `AS OF` clause.
pub fn as_of(reference: &str) -> String {
    quote(reference)
}

/// Decode `dolt sql -r json` output. Empty output means no rows.
pub fn parse_rows(stdout: &str) -> Result<Vec<Row>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(trimmed)?;
    let rows = match value.get("rows") {
        Some(Value::Array(rows)) => rows,
        Some(_) | None => return Ok(Vec::new()),
    };
    rows.iter()
        .map(|r| match r {
            Value::Object(map) => Ok(map.clone()),
            other => Err(StoreError::Parse {
                what: "sql row",
                reason: format!("expected object, got {}", other),
            }),
        })
        .collect()
}

fn get_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn require_str(row: &Row, column: &'static str) -> Result<String> {
    get_str(row, column).ok_or(StoreError::Parse {
        what: "sql row",
        reason: format!("missing column {}", column),
    })
}

fn get_u8(row: &Row, column: &'static str) -> Result<u8> {
    let raw = require_str(row, column)?;
    raw.parse().map_err(|_| StoreError::Parse {
        what: "sql row",
        reason: format!("{} is not a small integer: {}", column, raw),
    })
}

fn get_list(row: &Row, column: &str) -> Result<Vec<String>> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(serde_json::from_str(s)?),
        Some(v @ Value::Array(_)) => Ok(serde_json::from_value(v.clone())?),
        Some(other) => Err(StoreError::Parse {
            what: "json list",
            reason: other.to_string(),
        }),
    }
}

/// Parse a DATETIME as Dolt prints it, or RFC 3339.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::Parse {
            what: "datetime",
            reason: format!("{}: {}", raw, e),
        })
}

fn get_datetime(row: &Row, column: &'static str) -> Result<DateTime<Utc>> {
    parse_datetime(&require_str(row, column)?)
}

fn get_datetime_opt(row: &Row, column: &'static str) -> Result<Option<DateTime<Utc>>> {
    get_str(row, column).map(|s| parse_datetime(&s)).transpose()
}

fn parse_field<T: std::str::FromStr>(row: &Row, column: &'static str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = require_str(row, column)?;
    raw.parse().map_err(|e: T::Err| StoreError::Parse {
        what: "sql row",
        reason: format!("{}: {}", column, e),
    })
}

pub fn item_from_row(row: &Row) -> Result<WorkItem> {
    Ok(WorkItem {
        id: require_str(row, "id")?,
        title: require_str(row, "title")?,
        description: get_str(row, "description").unwrap_or_default(),
        project: get_str(row, "project").filter(|p| !p.is_empty()),
        item_type: parse_field(row, "type")?,
        priority: get_u8(row, "priority")?,
        effort_level: parse_field(row, "effort_level")?,
        tags: get_list(row, "tags")?,
        posted_by: require_str(row, "posted_by")?,
        claimed_by: get_str(row, "claimed_by").filter(|c| !c.is_empty()),
        status: parse_field(row, "status")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn completion_from_row(row: &Row) -> Result<CompletionRecord> {
    Ok(CompletionRecord {
        id: require_str(row, "id")?,
        wanted_id: require_str(row, "wanted_id")?,
        completed_by: require_str(row, "completed_by")?,
        evidence: get_str(row, "evidence").unwrap_or_default(),
        validated_by: get_str(row, "validated_by"),
        stamp_id: get_str(row, "stamp_id"),
        completed_at: get_datetime(row, "completed_at")?,
        validated_at: get_datetime_opt(row, "validated_at")?,
    })
}

pub fn stamp_from_row(row: &Row) -> Result<Stamp> {
    Ok(Stamp {
        id: require_str(row, "id")?,
        author: require_str(row, "author")?,
        subject: require_str(row, "subject")?,
        quality: get_u8(row, "quality")?,
        reliability: get_u8(row, "reliability")?,
        severity: parse_field(row, "severity")?,
        context_id: require_str(row, "context_id")?,
        skill_tags: get_list(row, "skill_tags")?,
        message: get_str(row, "message"),
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn insert_item(item: &WorkItem) -> Result<String> {
    Ok(format!(
        "INSERT INTO wanted ({}) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        ITEM_COLUMNS,
        quote(&item.id),
        quote(&item.title),
        quote(&item.description),
        quote_opt(item.project.as_deref()),
        quote(item.item_type.as_str()),
        item.priority,
        quote(item.effort_level.as_str()),
        json_list(&item.tags)?,
        quote(&item.posted_by),
        quote_opt(item.claimed_by.as_deref()),
        quote(item.status.as_str()),
        datetime(&item.created_at),
        datetime(&item.updated_at),
    ))
}

pub fn update_item(item: &WorkItem) -> Result<String> {
    Ok(format!(
        "UPDATE wanted SET title = {}, description = {}, project = {}, type = {}, \
         priority = {}, effort_level = {}, tags = {}, claimed_by = {}, status = {}, \
         updated_at = {} WHERE id = {}",
        quote(&item.title),
        quote(&item.description),
        quote_opt(item.project.as_deref()),
        quote(item.item_type.as_str()),
        item.priority,
        quote(item.effort_level.as_str()),
        json_list(&item.tags)?,
        quote_opt(item.claimed_by.as_deref()),
        quote(item.status.as_str()),
        datetime(&item.updated_at),
        quote(&item.id),
    ))
}

pub fn insert_completion(c: &CompletionRecord) -> String {
    format!(
        "INSERT INTO completions ({}) VALUES ({}, {}, {}, {}, {}, {}, {}, {})",
        COMPLETION_COLUMNS,
        quote(&c.id),
        quote(&c.wanted_id),
        quote(&c.completed_by),
        quote(&c.evidence),
        quote_opt(c.validated_by.as_deref()),
        quote_opt(c.stamp_id.as_deref()),
        datetime(&c.completed_at),
        datetime_opt(c.validated_at.as_ref()),
    )
}

pub fn update_completion(c: &CompletionRecord) -> String {
    format!(
        "UPDATE completions SET evidence = {}, validated_by = {}, stamp_id = {}, \
         validated_at = {} WHERE id = {}",
        quote(&c.evidence),
        quote_opt(c.validated_by.as_deref()),
        quote_opt(c.stamp_id.as_deref()),
        datetime_opt(c.validated_at.as_ref()),
        quote(&c.id),
    )
}

pub fn insert_stamp(s: &Stamp) -> Result<String> {
    Ok(format!(
        "INSERT INTO stamps ({}) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        STAMP_COLUMNS,
        quote(&s.id),
        quote(&s.author),
        quote(&s.subject),
        s.quality,
        s.reliability,
        quote(s.severity.as_str()),
        quote(&s.context_id),
        json_list(&s.skill_tags)?,
        quote_opt(s.message.as_deref()),
        datetime(&s.created_at),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wl_board::{ItemStatus, NewItem};

    #[test]
    fn quote_escapes_quotes_and_backslashes() {
        assert_eq!(quote("it's"), "'it''s'");
        assert_eq!(quote(r"a\b"), r"'a\\b'");
        assert_eq!(quote_opt(None), "NULL");
    }

    #[test]
    fn parse_rows_handles_empty_output() {
        assert!(parse_rows("").unwrap().is_empty());
        assert!(parse_rows("{\"rows\": []}").unwrap().is_empty());
    }

    #[test]
    fn item_row_decodes_dolt_json() {
        let out = r#"{"rows":[{"id":"w-0123456789","title":"Fix it","description":"",
            "type":"bug","priority":1,"effort_level":"small","tags":"[\"cli\"]",
            "posted_by":"alice","claimed_by":"bob","status":"claimed",
            "created_at":"2026-03-01 12:00:00","updated_at":"2026-03-02 08:30:00.5"}]}"#;
        let rows = parse_rows(out).unwrap();
        let item = item_from_row(&rows[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Claimed);
        assert_eq!(item.claimed_by.as_deref(), Some("bob"));
        assert_eq!(item.tags, vec!["cli".to_string()]);
        assert_eq!(item.priority, 1);
        assert!(item.project.is_none());
    }

    #[test]
    fn insert_item_quotes_every_text_field() {
        let item = WorkItem::post(NewItem::new("Bob's task"), "alice", Utc::now()).unwrap();
        let sql = insert_item(&item).unwrap();
        assert!(sql.starts_with("INSERT INTO wanted"));
        assert!(sql.contains("'Bob''s task'"));
        assert!(sql.contains("'open'"));
        assert!(sql.contains("NULL"));
    }
}

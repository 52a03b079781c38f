//! Field mapping between record-store records and catalog types.

use serde_json::{Map, Value};

use mentors_storage::{FieldChanges, MentorRecord, MentorStatus};

use crate::client::RawRecord;
use crate::error::{RecordsError, Result};

pub(crate) mod fields {
    pub const LEGACY_ID: &str = "Id";
    pub const SLUG: &str = "Alias";
    pub const NAME: &str = "Name";
    pub const JOB_TITLE: &str = "JobTitle";
    pub const WORKPLACE: &str = "Workplace";
    pub const ABOUT: &str = "About";
    pub const DESCRIPTION: &str = "Description";
    pub const COMPETENCIES: &str = "Competencies";
    pub const EXPERIENCE: &str = "Experience";
    pub const PRICE: &str = "Price";
    pub const IMAGE_URL: &str = "ImageUrl";
    /// Linked tag record IDs (written).
    pub const TAGS: &str = "Tags";
    /// Lookup of linked tag names (read-only).
    pub const TAG_NAMES: &str = "TagNames";
    pub const SORT_ORDER: &str = "SortOrder";
    pub const STATUS: &str = "Status";
    pub const TELEGRAM_CHAT_ID: &str = "TelegramChatId";
    pub const AUTH_TOKEN: &str = "AuthToken";
    pub const CALENDAR_URL: &str = "CalendarUrl";
    /// Name field of the tags table.
    pub const TAG_NAME: &str = "Name";
}

fn text(fields: &Map<String, Value>, name: &str) -> String {
    match fields.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn optional_text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    Some(text(fields, name)).filter(|s| !s.trim().is_empty())
}

fn integer(fields: &Map<String, Value>, name: &str) -> Option<i64> {
    match fields.get(name) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(fields: &Map<String, Value>, name: &str) -> Vec<String> {
    match fields.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Maps a mentors-table record to a catalog record.
pub(crate) fn mentor_from_raw(raw: &RawRecord) -> Result<MentorRecord> {
    let f = &raw.fields;
    let legacy_id = integer(f, fields::LEGACY_ID)
        .ok_or_else(|| RecordsError::decode(format!("record {} has no numeric Id", raw.id)))?;
    let slug = text(f, fields::SLUG);
    if slug.trim().is_empty() {
        return Err(RecordsError::decode(format!("record {} has no Alias", raw.id)));
    }
    let status = match optional_text(f, fields::STATUS) {
        Some(s) => s.parse::<MentorStatus>().map_err(|e| RecordsError::decode(e))?,
        None => MentorStatus::Pending,
    };

    let mut record = MentorRecord::new(raw.id.clone(), legacy_id, slug);
    record.external_id = Some(raw.id.clone());
    record.name = text(f, fields::NAME);
    record.job_title = text(f, fields::JOB_TITLE);
    record.workplace = text(f, fields::WORKPLACE);
    record.about = text(f, fields::ABOUT);
    record.description = text(f, fields::DESCRIPTION);
    record.competencies = text(f, fields::COMPETENCIES);
    record.experience = text(f, fields::EXPERIENCE);
    record.price = text(f, fields::PRICE);
    record.image_url = optional_text(f, fields::IMAGE_URL);
    record.tags = string_list(f, fields::TAG_NAMES);
    record.sort_order = integer(f, fields::SORT_ORDER).unwrap_or(0) as i32;
    record.status = status;
    record.telegram_chat_id = optional_text(f, fields::TELEGRAM_CHAT_ID);
    record.auth_token = optional_text(f, fields::AUTH_TOKEN);
    record.calendar_url = optional_text(f, fields::CALENDAR_URL);
    record.refresh_visibility();
    Ok(record)
}

/// Maps a tags-table record to `(name, record id)`. Nameless tags are skipped.
pub(crate) fn tag_from_raw(raw: &RawRecord) -> Option<(String, String)> {
    optional_text(&raw.fields, fields::TAG_NAME).map(|name| (name, raw.id.clone()))
}

/// Builds the PATCH field map for a set of changes.
pub(crate) fn changes_to_fields(changes: &FieldChanges) -> Map<String, Value> {
    let mut out = Map::new();
    let mut put = |name: &str, value: &Option<String>| {
        if let Some(v) = value {
            out.insert(name.to_owned(), Value::String(v.clone()));
        }
    };
    put(fields::NAME, &changes.name);
    put(fields::JOB_TITLE, &changes.job_title);
    put(fields::WORKPLACE, &changes.workplace);
    put(fields::ABOUT, &changes.about);
    put(fields::DESCRIPTION, &changes.description);
    put(fields::COMPETENCIES, &changes.competencies);
    put(fields::EXPERIENCE, &changes.experience);
    put(fields::PRICE, &changes.price);
    put(fields::CALENDAR_URL, &changes.calendar_url);
    put(fields::TELEGRAM_CHAT_ID, &changes.telegram_chat_id);
    if let Some(status) = changes.status {
        out.insert(fields::STATUS.to_owned(), Value::String(status.as_str().to_owned()));
    }
    if let Some(ids) = &changes.tag_ids {
        out.insert(
            fields::TAGS.to_owned(),
            Value::Array(ids.iter().cloned().map(Value::String).collect()),
        );
    }
    out
}

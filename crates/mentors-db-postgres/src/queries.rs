//! SQL for catalog reads and write-through updates.
//!
//! Tags live in `tags` and are linked through `mentor_tags(mentor_id, tag_id, position)`.
//! Reads aggregate tag names in link order; writes replace the link rows.

use sqlx_core::query_builder::QueryBuilder;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};
use uuid::Uuid;

use mentors_storage::{FieldChanges, MentorRecord, MentorStatus};

use crate::error::{PostgresError, Result};

/// Catalog projection shared by every mentor read. Callers append a `WHERE`
/// clause on `m` before the grouping suffix.
pub(crate) const SELECT_MENTORS: &str = r#"
    SELECT m.id::text AS id,
           m.legacy_id,
           m.external_id,
           m.slug,
           m.name,
           m.job_title,
           m.workplace,
           m.about,
           m.description,
           m.competencies,
           m.experience,
           m.price,
           m.image_url,
           m.sort_order,
           m.status,
           m.telegram_chat_id,
           m.auth_token,
           m.calendar_url,
           COALESCE(
               array_agg(t.name ORDER BY mt.position) FILTER (WHERE t.name IS NOT NULL),
               '{}'
           ) AS tags
      FROM mentors m
      LEFT JOIN mentor_tags mt ON mt.mentor_id = m.id
      LEFT JOIN tags t ON t.id = mt.tag_id
     WHERE m.status <> 'declined'"#;

pub(crate) const GROUP_AND_ORDER: &str =
    " GROUP BY m.id ORDER BY m.sort_order ASC, m.legacy_id DESC";

pub(crate) fn select_all() -> String {
    format!("{SELECT_MENTORS}{GROUP_AND_ORDER}")
}

pub(crate) fn select_by_slug() -> String {
    format!("{SELECT_MENTORS} AND m.slug = $1{GROUP_AND_ORDER}")
}

pub(crate) fn select_by_external_id() -> String {
    format!("{SELECT_MENTORS} AND m.external_id = $1{GROUP_AND_ORDER}")
}

pub(crate) const SELECT_TAGS: &str = "SELECT id::text AS id, name FROM tags";

pub(crate) const UPDATE_IMAGE_URL: &str = "UPDATE mentors SET image_url = $2 WHERE id = $1";

pub(crate) const DELETE_TAG_LINKS: &str = "DELETE FROM mentor_tags WHERE mentor_id = $1";

pub(crate) const INSERT_TAG_LINKS: &str = r#"
    INSERT INTO mentor_tags (mentor_id, tag_id, position)
    SELECT $1, tag_id, (ord - 1)::int
      FROM unnest($2::uuid[]) WITH ORDINALITY AS u(tag_id, ord)"#;

/// Maps a catalog row to a record, computing visibility the shared way.
pub(crate) fn mentor_from_row(row: &PgRow) -> Result<MentorRecord> {
    let status_text: String = row.try_get("status")?;
    let status = status_text
        .parse::<MentorStatus>()
        .map_err(|e| PostgresError::mapping(e))?;

    let mut record = MentorRecord::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<i64, _>("legacy_id")?,
        row.try_get::<String, _>("slug")?,
    );
    record.external_id = row.try_get("external_id")?;
    record.name = row.try_get("name")?;
    record.job_title = row.try_get("job_title")?;
    record.workplace = row.try_get("workplace")?;
    record.about = row.try_get("about")?;
    record.description = row.try_get("description")?;
    record.competencies = row.try_get("competencies")?;
    record.experience = row.try_get("experience")?;
    record.price = row.try_get("price")?;
    record.image_url = row.try_get("image_url")?;
    record.tags = row.try_get("tags")?;
    record.sort_order = row.try_get("sort_order")?;
    record.status = status;
    record.telegram_chat_id = row.try_get("telegram_chat_id")?;
    record.auth_token = row.try_get("auth_token")?;
    record.calendar_url = row.try_get("calendar_url")?;
    record.refresh_visibility();
    Ok(record)
}

/// Parses a store key; anything that is not a UUID cannot exist in this store.
pub(crate) fn parse_key(key: &str) -> Option<Uuid> {
    Uuid::parse_str(key).ok()
}

/// Parses tag IDs for a link rewrite.
pub(crate) fn parse_tag_ids(ids: &[String]) -> Result<Vec<Uuid>> {
    ids.iter()
        .map(|id| {
            Uuid::parse_str(id).map_err(|_| PostgresError::mapping(format!("invalid tag id '{id}'")))
        })
        .collect()
}

/// Builds the column update for a set of changes, or `None` when only tags change.
pub(crate) fn build_update(key: Uuid, changes: &FieldChanges) -> Option<QueryBuilder<'static, Postgres>> {
    let text_columns: [(&str, &Option<String>); 8] = [
        ("name", &changes.name),
        ("job_title", &changes.job_title),
        ("workplace", &changes.workplace),
        ("about", &changes.about),
        ("description", &changes.description),
        ("competencies", &changes.competencies),
        ("experience", &changes.experience),
        ("price", &changes.price),
    ];
    // Empty strings clear these nullable columns.
    let nullable_columns: [(&str, &Option<String>); 2] = [
        ("calendar_url", &changes.calendar_url),
        ("telegram_chat_id", &changes.telegram_chat_id),
    ];

    let has_columns = text_columns.iter().any(|(_, v)| v.is_some())
        || nullable_columns.iter().any(|(_, v)| v.is_some())
        || changes.status.is_some();
    if !has_columns {
        return None;
    }

    let mut builder = QueryBuilder::new("UPDATE mentors SET ");
    {
        let mut set = builder.separated(", ");
        for (column, value) in text_columns {
            if let Some(value) = value {
                set.push(format!("{column} = "));
                set.push_bind_unseparated(value.clone());
            }
        }
        for (column, value) in nullable_columns {
            if let Some(value) = value {
                set.push(format!("{column} = "));
                set.push_bind_unseparated(Some(value.clone()).filter(|v| !v.is_empty()));
            }
        }
        if let Some(status) = changes.status {
            set.push("status = ");
            set.push_bind_unseparated(status.as_str());
        }
    }
    builder.push(" WHERE id = ");
    builder.push_bind(key);
    Some(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_queries_exclude_declined_and_share_ordering() {
        for sql in [select_all(), select_by_slug(), select_by_external_id()] {
            assert!(sql.contains("m.status <> 'declined'"));
            assert!(sql.ends_with(GROUP_AND_ORDER));
        }
        assert!(select_by_slug().contains("m.slug = $1"));
        assert!(select_by_external_id().contains("m.external_id = $1"));
    }

    #[test]
    fn update_binds_only_changed_columns() {
        let key = Uuid::new_v4();
        let changes = FieldChanges {
            name: Some("Jane".into()),
            calendar_url: Some(String::new()),
            ..FieldChanges::status(MentorStatus::Active)
        };
        let builder = build_update(key, &changes).expect("has columns");
        assert_eq!(
            builder.sql(),
            "UPDATE mentors SET name = $1, calendar_url = $2, status = $3 WHERE id = $4"
        );
    }

    #[test]
    fn tag_only_changes_skip_column_update() {
        let changes = FieldChanges {
            tag_ids: Some(vec![Uuid::new_v4().to_string()]),
            ..FieldChanges::default()
        };
        assert!(build_update(Uuid::new_v4(), &changes).is_none());
    }

    #[test]
    fn keys_and_tag_ids_must_be_uuids() {
        assert!(parse_key("recABC").is_none());
        assert!(parse_key(&Uuid::new_v4().to_string()).is_some());
        assert!(parse_tag_ids(&["nope".into()]).is_err());
        assert_eq!(parse_tag_ids(&[Uuid::nil().to_string()]).unwrap(), vec![Uuid::nil()]);
    }
}

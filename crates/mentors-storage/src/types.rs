//! Catalog types shared by the backing stores and the directory cache.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Tag index as loaded from a store: display name -> store tag ID.
pub type TagMap = HashMap<String, String>;

/// Moderation status of a mentor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentorStatus {
    /// Registered, waiting for moderation.
    #[default]
    Pending,
    /// Approved and listed.
    Active,
    /// Temporarily disabled by the mentor or an admin.
    Inactive,
    /// Rejected by moderation.
    Declined,
}

impl MentorStatus {
    /// Returns the wire representation shared by both stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Declined => "declined",
        }
    }
}

impl fmt::Display for MentorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MentorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown mentor status '{other}'")),
        }
    }
}

/// A mentor as held by the directory catalog.
///
/// `auth_token`, `calendar_url` and `telegram_chat_id` are secure fields: they
/// are only meant for the mentor themself and for admins, and must be redacted
/// from public reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorRecord {
    /// Opaque store key (record ID for the legacy store, UUID for postgres).
    pub id: String,
    /// Integer ID kept for old links.
    pub legacy_id: i64,
    /// Legacy record-store record ID, used by change notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// URL slug, unique across the catalog.
    pub slug: String,
    pub name: String,
    pub job_title: String,
    pub workplace: String,
    pub about: String,
    pub description: String,
    pub competencies: String,
    pub experience: String,
    pub price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Tag display names, in store order.
    pub tags: Vec<String>,
    pub sort_order: i32,
    pub status: MentorStatus,
    /// Derived from `status` and `telegram_chat_id`, see [`Self::compute_visibility`].
    pub is_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_url: Option<String>,
}

impl MentorRecord {
    /// Creates a pending record with empty profile fields.
    #[must_use]
    pub fn new(id: impl Into<String>, legacy_id: i64, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            legacy_id,
            external_id: None,
            slug: slug.into(),
            name: String::new(),
            job_title: String::new(),
            workplace: String::new(),
            about: String::new(),
            description: String::new(),
            competencies: String::new(),
            experience: String::new(),
            price: String::new(),
            image_url: None,
            tags: Vec::new(),
            sort_order: 0,
            status: MentorStatus::Pending,
            is_visible: false,
            telegram_chat_id: None,
            auth_token: None,
            calendar_url: None,
        }
    }

    /// Visibility rule shared by every store: active and linked to a channel.
    #[must_use]
    pub fn compute_visibility(status: MentorStatus, telegram_chat_id: Option<&str>) -> bool {
        status == MentorStatus::Active && telegram_chat_id.is_some_and(|c| !c.trim().is_empty())
    }

    /// Recomputes `is_visible` from the current status and channel.
    pub fn refresh_visibility(&mut self) {
        self.is_visible = Self::compute_visibility(self.status, self.telegram_chat_id.as_deref());
    }

    /// Returns `true` if any secure field is populated.
    #[must_use]
    pub fn has_secure_fields(&self) -> bool {
        self.auth_token.is_some() || self.calendar_url.is_some() || self.telegram_chat_id.is_some()
    }

    /// Returns `true` if any long free-text section is populated.
    #[must_use]
    pub fn has_long_fields(&self) -> bool {
        !self.about.is_empty() || !self.description.is_empty() || !self.competencies.is_empty()
    }
}

/// Field changes written through to a store.
///
/// `None` leaves a field untouched. Tags are expressed as store tag IDs; the
/// caller resolves display names through the tag index before writing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChanges {
    pub name: Option<String>,
    pub job_title: Option<String>,
    pub workplace: Option<String>,
    pub about: Option<String>,
    pub description: Option<String>,
    pub competencies: Option<String>,
    pub experience: Option<String>,
    pub price: Option<String>,
    pub calendar_url: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub status: Option<MentorStatus>,
    pub tag_ids: Option<Vec<String>>,
}

impl FieldChanges {
    /// Changes that only touch the moderation status.
    #[must_use]
    pub fn status(status: MentorStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns `true` if nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Builds the post-write record from `base` without another store round trip.
    ///
    /// `tag_names` must be the display names matching `tag_ids` when tags changed.
    #[must_use]
    pub fn applied_to(&self, base: &MentorRecord, tag_names: Option<Vec<String>>) -> MentorRecord {
        let mut record = base.clone();
        let set = |field: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                field.clone_from(v);
            }
        };
        set(&mut record.name, &self.name);
        set(&mut record.job_title, &self.job_title);
        set(&mut record.workplace, &self.workplace);
        set(&mut record.about, &self.about);
        set(&mut record.description, &self.description);
        set(&mut record.competencies, &self.competencies);
        set(&mut record.experience, &self.experience);
        set(&mut record.price, &self.price);
        if let Some(url) = &self.calendar_url {
            record.calendar_url = Some(url.clone()).filter(|u| !u.is_empty());
        }
        if let Some(chat) = &self.telegram_chat_id {
            record.telegram_chat_id = Some(chat.clone()).filter(|c| !c.is_empty());
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(names) = tag_names {
            record.tags = names;
        }
        record.refresh_visibility();
        record
    }
}

/// Orders a catalog for display: `sort_order` ascending, newest legacy ID first.
pub fn sort_catalog(records: &mut [MentorRecord]) {
    records.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| b.legacy_id.cmp(&a.legacy_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_requires_active_status_and_channel() {
        assert!(MentorRecord::compute_visibility(MentorStatus::Active, Some("123")));
        assert!(!MentorRecord::compute_visibility(MentorStatus::Active, None));
        assert!(!MentorRecord::compute_visibility(MentorStatus::Active, Some("  ")));
        assert!(!MentorRecord::compute_visibility(MentorStatus::Inactive, Some("123")));
        assert!(!MentorRecord::compute_visibility(MentorStatus::Pending, Some("123")));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Active".parse::<MentorStatus>(), Ok(MentorStatus::Active));
        assert_eq!(" declined ".parse::<MentorStatus>(), Ok(MentorStatus::Declined));
        assert!("archived".parse::<MentorStatus>().is_err());
    }

    #[test]
    fn applied_changes_recompute_visibility() {
        let mut base = MentorRecord::new("rec1", 1, "jane");
        base.status = MentorStatus::Active;
        base.telegram_chat_id = Some("42".into());
        base.refresh_visibility();
        assert!(base.is_visible);

        let changes = FieldChanges {
            job_title: Some("Staff Engineer".into()),
            ..FieldChanges::status(MentorStatus::Inactive)
        };
        let updated = changes.applied_to(&base, Some(vec!["Rust".into()]));

        assert_eq!(updated.job_title, "Staff Engineer");
        assert_eq!(updated.tags, vec!["Rust".to_string()]);
        assert!(!updated.is_visible);
        // base untouched
        assert!(base.is_visible);
        assert!(base.tags.is_empty());
    }

    #[test]
    fn empty_calendar_url_clears_field() {
        let mut base = MentorRecord::new("rec1", 1, "jane");
        base.calendar_url = Some("https://cal.example/jane".into());
        let changes = FieldChanges {
            calendar_url: Some(String::new()),
            ..FieldChanges::default()
        };
        assert!(changes.applied_to(&base, None).calendar_url.is_none());
        assert!(!changes.is_empty());
        assert!(FieldChanges::default().is_empty());
    }

    #[test]
    fn catalog_sorts_by_order_then_newest() {
        let mut a = MentorRecord::new("a", 1, "a");
        a.sort_order = 1;
        let b = MentorRecord::new("b", 2, "b");
        let c = MentorRecord::new("c", 3, "c");
        let mut records = vec![a, b, c];
        sort_catalog(&mut records);
        let slugs: Vec<_> = records.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["c", "b", "a"]);
    }
}

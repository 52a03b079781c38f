//! Record builders.

use mentors_storage::{MentorRecord, MentorStatus};

/// External (legacy record-store) ID used by [`mentor`] for a legacy ID.
pub fn external_id(legacy_id: i64) -> String {
    format!("rec{legacy_id}")
}

/// A visible mentor: active, linked to a chat, with secure fields populated.
pub fn mentor(legacy_id: i64, slug: &str) -> MentorRecord {
    let mut record = MentorRecord::new(external_id(legacy_id), legacy_id, slug);
    record.external_id = Some(external_id(legacy_id));
    record.name = format!("Mentor {slug}");
    record.job_title = "Engineer".to_owned();
    record.workplace = "Acme".to_owned();
    record.about = format!("About {slug}");
    record.description = format!("Description of {slug}");
    record.competencies = "Rust, Go".to_owned();
    record.experience = "5-10".to_owned();
    record.price = "1000".to_owned();
    record.tags = vec!["Backend".to_owned()];
    record.status = MentorStatus::Active;
    record.telegram_chat_id = Some(format!("{}", 1000 + legacy_id));
    record.auth_token = Some(format!("token-{slug}"));
    record.calendar_url = Some(format!("https://cal.example/{slug}"));
    record.refresh_visibility();
    record
}

/// A mentor with the given status; visibility follows the shared rule.
pub fn mentor_with_status(legacy_id: i64, slug: &str, status: MentorStatus) -> MentorRecord {
    let mut record = mentor(legacy_id, slug);
    record.status = status;
    record.refresh_visibility();
    record
}

/// `count` visible mentors with legacy IDs `1..=count` and slugs `mentor-N`.
pub fn catalog(count: i64) -> Vec<MentorRecord> {
    (1..=count).map(|i| mentor(i, &format!("mentor-{i}"))).collect()
}

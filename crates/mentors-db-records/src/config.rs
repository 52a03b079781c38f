//! Configuration for the record-store backend.

use serde::{Deserialize, Serialize};

/// Connection settings for the record-store API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// API root, e.g. `https://api.records.example`.
    pub base_url: String,
    /// Identifier of the base holding the catalog tables.
    pub base_id: String,
    /// Bearer token for the API.
    pub api_key: String,
    #[serde(default = "default_mentors_table")]
    pub mentors_table: String,
    #[serde(default = "default_tags_table")]
    pub tags_table: String,
    /// Records requested per list page (the API caps this at 100).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_mentors_table() -> String {
    "Mentors".into()
}
fn default_tags_table() -> String {
    "Tags".into()
}
fn default_page_size() -> u32 {
    100
}
fn default_timeout_ms() -> u64 {
    10_000
}

impl RecordsConfig {
    /// Creates a config with default table names and limits.
    pub fn new(
        base_url: impl Into<String>,
        base_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            base_id: base_id.into(),
            api_key: api_key.into(),
            mentors_table: default_mentors_table(),
            tags_table: default_tags_table(),
            page_size: default_page_size(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

use crate::models::{Client, Lead, LeadStatus};
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter state for a lead table view. Persisted write-only under the
/// `leadFilters` key; not required for engine correctness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

/// Case-insensitive search over name/company/email, optional status filter,
/// then a stable sort by score.
pub fn filter_and_sort(leads: &[Lead], query: &LeadQuery) -> Vec<Lead> {
    let needle = query
        .search
        .as_deref()
        .map(str::to_lowercase)
        .filter(|needle| !needle.is_empty());

    let mut rows: Vec<Lead> = leads
        .iter()
        .filter(|lead| {
            let matches_search = needle.as_deref().map_or(true, |needle| {
                lead.name.to_lowercase().contains(needle)
                    || lead.company.to_lowercase().contains(needle)
                    || lead.email.to_lowercase().contains(needle)
            });
            let matches_status = query.status.map_or(true, |status| lead.status == status);
            matches_search && matches_status
        })
        .cloned()
        .collect();

    match query.sort_order {
        SortOrder::Desc => rows.sort_by(|a, b| b.score.cmp(&a.score)),
        SortOrder::Asc => rows.sort_by(|a, b| a.score.cmp(&b.score)),
    }
    rows
}

/// Stat-card aggregates over the client set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub count: usize,
    pub total_value: f64,
    pub average_value: f64,
}

pub fn summarize(clients: &[Client]) -> PipelineSummary {
    let count = clients.len();
    let total_value: f64 = clients.iter().filter_map(|client| client.value).sum();
    let average_value = if count == 0 {
        0.0
    } else {
        total_value / count as f64
    };
    PipelineSummary {
        count,
        total_value,
        average_value,
    }
}

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

pub fn validate_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Escapes the same characters `encodeURIComponent` does: everything outside
/// alphanumerics and `-_.!~*'()`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The lead's avatar, falling back to a deterministic generated image.
pub fn avatar_url(lead: &Lead) -> String {
    match &lead.image {
        Some(image) => image.clone(),
        None => format!(
            "https://ui-avatars.com/api/?name={}&background=4f46e5&color=ffffff&bold=true&size=128",
            utf8_percent_encode(&lead.name, URI_COMPONENT)
        ),
    }
}

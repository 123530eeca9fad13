use crate::models::Lead;
use once_cell::sync::Lazy;

const SEED_JSON: &str = include_str!("seed.json");

static SEED: Lazy<Vec<Lead>> = Lazy::new(|| {
    serde_json::from_str(SEED_JSON).expect("bundled seed dataset is valid JSON")
});

/// Immutable fallback source of truth for leads, used only when no lead set
/// has been persisted yet.
pub fn leads() -> &'static [Lead] {
    &SEED
}

pub fn lead_by_id(id: i64) -> Option<&'static Lead> {
    SEED.iter().find(|lead| lead.id == id)
}

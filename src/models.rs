use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "in contact")]
    InContact,
    #[serde(rename = "qualified")]
    Qualified,
    #[serde(rename = "disqualified")]
    Disqualified,
    #[serde(rename = "closed")]
    Closed,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InContact => "in contact",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    Prospecting,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl PipelineStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prospecting => "prospecting",
            Self::Qualified => "qualified",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed-won",
            Self::ClosedLost => "closed-lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub company: String,
    pub email: String,
    pub source: String,
    pub status: LeadStatus,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// A converted lead. The `account_name`/`step`/`value`/`created` fields are the
/// pipeline record proper; the remaining fields are denormalized copies of the
/// originating lead kept so the lead can be reinstated when the client is
/// deleted. Older persisted records may lack the copies, hence the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    pub account_name: String,
    pub step: PipelineStep,
    pub value: Option<f64>,
    pub created: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
}

impl Client {
    pub fn from_lead(lead: &Lead, created: NaiveDate) -> Self {
        Self {
            id: lead.id,
            account_name: format!("{} - {}", lead.name, lead.company),
            step: PipelineStep::Prospecting,
            value: lead.value,
            created,
            name: Some(lead.name.clone()),
            email: Some(lead.email.clone()),
            score: Some(lead.score),
            source: Some(lead.source.clone()),
            company: Some(lead.company.clone()),
            image: lead.image.clone(),
            status: Some(lead.status),
        }
    }

    /// Rebuild the originating lead from the denormalized copies. Returns None
    /// when the record predates denormalization and carries too little to
    /// reconstruct a lead (the caller then falls back to the seed dataset).
    pub fn restore_lead(&self) -> Option<Lead> {
        let name = self
            .name
            .clone()
            .or_else(|| {
                self.account_name
                    .splitn(2, " - ")
                    .next()
                    .map(str::to_string)
            })
            .filter(|name| !name.is_empty())?;
        let email = self.email.clone().filter(|email| !email.is_empty())?;
        let company = self.company.clone().unwrap_or_else(|| {
            self.account_name
                .splitn(2, " - ")
                .nth(1)
                .unwrap_or_default()
                .to_string()
        });

        Some(Lead {
            id: self.id,
            name,
            company,
            email,
            source: self.source.clone().unwrap_or_else(|| "unknown".to_string()),
            status: self.status.unwrap_or(LeadStatus::Qualified),
            score: self.score.unwrap_or(75),
            image: self.image.clone(),
            value: self.value,
        })
    }
}

/// Partial update applied to a lead by [`crate::engine::LeadEngine::update`].
/// Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub status: Option<LeadStatus>,
    pub score: Option<u8>,
    pub image: Option<String>,
    pub value: Option<f64>,
}

impl LeadPatch {
    pub fn apply(&self, lead: &mut Lead) {
        if let Some(name) = &self.name {
            lead.name = name.clone();
        }
        if let Some(company) = &self.company {
            lead.company = company.clone();
        }
        if let Some(email) = &self.email {
            lead.email = email.clone();
        }
        if let Some(source) = &self.source {
            lead.source = source.clone();
        }
        if let Some(status) = self.status {
            lead.status = status;
        }
        if let Some(score) = self.score {
            lead.score = score;
        }
        if let Some(image) = &self.image {
            lead.image = Some(image.clone());
        }
        if let Some(value) = self.value {
            lead.value = Some(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.company.is_none()
            && self.email.is_none()
            && self.source.is_none()
            && self.status.is_none()
            && self.score.is_none()
            && self.image.is_none()
            && self.value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{Client, Lead, LeadPatch, LeadStatus, PipelineStep};
    use chrono::NaiveDate;

    fn sample_lead() -> Lead {
        Lead {
            id: 3,
            name: "Ana Souza".to_string(),
            company: "Acme Corp".to_string(),
            email: "ana@acme.com".to_string(),
            source: "referral".to_string(),
            status: LeadStatus::InContact,
            score: 82,
            image: None,
            value: Some(12_000.0),
        }
    }

    #[test]
    fn lead_serializes_with_wire_field_names() {
        let json = serde_json::to_value(sample_lead()).expect("serialize lead");
        assert_eq!(json["status"], "in contact");
        assert_eq!(json["score"], 82);
        assert!(json.get("image").is_none());
    }

    #[test]
    fn pipeline_step_uses_kebab_case_wire_strings() {
        let step: PipelineStep = serde_json::from_str("\"closed-won\"").expect("parse step");
        assert_eq!(step, PipelineStep::ClosedWon);
        assert_eq!(PipelineStep::ClosedLost.as_str(), "closed-lost");
    }

    #[test]
    fn client_from_lead_derives_account_name_and_copies_fields() {
        let lead = sample_lead();
        let created = NaiveDate::from_ymd_opt(2026, 8, 29).expect("date");
        let client = Client::from_lead(&lead, created);

        assert_eq!(client.id, 3);
        assert_eq!(client.account_name, "Ana Souza - Acme Corp");
        assert_eq!(client.step, PipelineStep::Prospecting);
        assert_eq!(client.value, Some(12_000.0));
        assert_eq!(client.name.as_deref(), Some("Ana Souza"));
        assert_eq!(client.status, Some(LeadStatus::InContact));

        let json = serde_json::to_value(&client).expect("serialize client");
        assert_eq!(json["accountName"], "Ana Souza - Acme Corp");
        assert_eq!(json["created"], "2026-08-29");
    }

    #[test]
    fn restore_lead_round_trips_denormalized_fields() {
        let lead = sample_lead();
        let created = NaiveDate::from_ymd_opt(2026, 1, 2).expect("date");
        let restored = Client::from_lead(&lead, created)
            .restore_lead()
            .expect("restorable");
        assert_eq!(restored, lead);
    }

    #[test]
    fn restore_lead_falls_back_to_account_name_split() {
        let json = serde_json::json!({
            "id": 9,
            "accountName": "Bruno Lima - Globex",
            "step": "negotiation",
            "value": null,
            "created": "2025-11-03",
            "email": "bruno@globex.com"
        });
        let client: Client = serde_json::from_value(json).expect("parse client");
        let restored = client.restore_lead().expect("restorable");

        assert_eq!(restored.name, "Bruno Lima");
        assert_eq!(restored.company, "Globex");
        assert_eq!(restored.source, "unknown");
        assert_eq!(restored.status, LeadStatus::Qualified);
        assert_eq!(restored.score, 75);
    }

    #[test]
    fn restore_lead_requires_an_email() {
        let json = serde_json::json!({
            "id": 9,
            "accountName": "Bruno Lima - Globex",
            "step": "prospecting",
            "value": null,
            "created": "2025-11-03"
        });
        let client: Client = serde_json::from_value(json).expect("parse client");
        assert!(client.restore_lead().is_none());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut lead = sample_lead();
        let patch = LeadPatch {
            email: Some("ana.souza@acme.com".to_string()),
            status: Some(LeadStatus::Qualified),
            ..LeadPatch::default()
        };
        patch.apply(&mut lead);

        assert_eq!(lead.email, "ana.souza@acme.com");
        assert_eq!(lead.status, LeadStatus::Qualified);
        assert_eq!(lead.name, "Ana Souza");
        assert!(!patch.is_empty());
        assert!(LeadPatch::default().is_empty());
    }
}

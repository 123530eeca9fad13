use crate::errors::{AppError, AppResult};
use crate::events::{Event, EventBus};
use crate::models::{Client, Lead, LeadPatch};
use crate::seed;
use crate::store::KeyValueStore;
use crate::views::LeadQuery;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

pub const CONTACTS_KEY: &str = "contacts";
pub const CLIENTS_KEY: &str = "clients";
pub const LEAD_FILTERS_KEY: &str = "leadFilters";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOutcome {
    Converted,
    AlreadyClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    AlreadyLead,
    NotFound,
}

struct EngineState {
    leads: Vec<Lead>,
    loaded: bool,
    last_error: Option<AppError>,
}

/// Owns the derivation of the lead set from persisted state, the seed dataset
/// and the client-set exclusion, and is the sole reader and writer of the
/// persisted keys. Every mutation runs a full read-modify-persist-notify
/// cycle under the state lock; events are published only after the lock is
/// released, because subscribers reload synchronously.
pub struct LeadEngine {
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    state: Mutex<EngineState>,
}

impl LeadEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            state: Mutex::new(EngineState {
                leads: Vec::new(),
                loaded: false,
                last_error: None,
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Current lead set, materializing it on first access.
    pub fn leads(&self) -> Vec<Lead> {
        let mut state = self.lock_state();
        self.ensure_loaded(&mut state);
        state.leads.clone()
    }

    /// Current client set, read through the engine so views never touch the
    /// persisted keys directly.
    pub fn clients(&self) -> AppResult<Vec<Client>> {
        self.read_clients()
    }

    /// Error condition left by the most recent operation, for a retryable
    /// error banner. Cleared by the next successful operation.
    pub fn last_error(&self) -> Option<AppError> {
        self.lock_state().last_error.clone()
    }

    /// Recompute the canonical lead set: persisted copy if present, else the
    /// seed dataset minus converted ids; dedup by id (first seen wins), then
    /// re-filter against the client set. If the pass changed the list, the
    /// corrected version is persisted before returning (self-healing read).
    /// Never fails outward: any internal failure falls back to the raw seed.
    pub fn reload(&self) -> Vec<Lead> {
        let mut state = self.lock_state();
        self.reload_locked(&mut state)
    }

    /// Apply a partial field merge to the lead with the given id, persist,
    /// and propagate contact fields into a same-id client record if one
    /// exists. An absent id changes nothing but still notifies lead
    /// subscribers, so a view issuing a blind update refreshes either way.
    /// A failed persist keeps the in-memory update visible and is reported
    /// through the returned error and `last_error`.
    pub fn update(&self, id: i64, patch: &LeadPatch) -> AppResult<Vec<Lead>> {
        let (result, events) = {
            let mut state = self.lock_state();
            self.ensure_loaded(&mut state);

            if !state.leads.iter().any(|lead| lead.id == id) {
                let err = AppError::NotFound(format!("lead {id} is not in the lead set"));
                tracing::info!(error = %err, "update ignored");
                (Ok(state.leads.clone()), vec![Event::LeadsChanged])
            } else {
                for lead in state.leads.iter_mut().filter(|lead| lead.id == id) {
                    patch.apply(lead);
                }

                let mut write_error = None;
                if !self.write_json(CONTACTS_KEY, &state.leads) {
                    write_error = Some(AppError::StorageWrite(
                        "failed to persist lead set".to_string(),
                    ));
                }

                // Under the partition invariant this id is never in the
                // client set; checked anyway so a stale record still receives
                // the contact fields.
                let mut events = vec![Event::LeadsChanged];
                match self.read_clients() {
                    Ok(mut clients) => {
                        if let Some(client) = clients.iter_mut().find(|client| client.id == id) {
                            if let Some(email) = &patch.email {
                                client.email = Some(email.clone());
                            }
                            if let Some(name) = &patch.name {
                                client.name = Some(name.clone());
                            }
                            if let Some(status) = patch.status {
                                client.status = Some(status);
                            }
                            if !self.write_json(CLIENTS_KEY, &clients) {
                                write_error = Some(AppError::StorageWrite(
                                    "failed to persist client set".to_string(),
                                ));
                            }
                            events.push(Event::ClientsChanged);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping client propagation");
                    }
                }

                state.last_error = write_error.clone();
                let result = match write_error {
                    Some(err) => Err(err),
                    None => Ok(state.leads.clone()),
                };
                (result, events)
            }
        };

        for event in events {
            self.bus.publish(event);
        }
        result
    }

    /// Move a lead into the client set. Idempotent: converting an id already
    /// present in the client set is a no-op reported as `AlreadyClient`.
    pub fn convert(&self, lead: &Lead) -> AppResult<ConvertOutcome> {
        let outcome = {
            let mut state = self.lock_state();
            self.ensure_loaded(&mut state);

            let mut clients = match self.read_clients() {
                Ok(clients) => clients,
                Err(err) => {
                    state.last_error = Some(err.clone());
                    return Err(err);
                }
            };
            if clients.iter().any(|client| client.id == lead.id) {
                let err = AppError::AlreadyExists(format!("client {} already exists", lead.id));
                tracing::info!(error = %err, "conversion ignored");
                return Ok(ConvertOutcome::AlreadyClient);
            }

            clients.push(Client::from_lead(lead, Utc::now().date_naive()));
            // The client set must be durable before the lead set loses the
            // id: a subscriber reloading between the two writes re-filters
            // leads against clients and still observes a full partition.
            if !self.write_json(CLIENTS_KEY, &clients) {
                let err = AppError::StorageWrite("failed to persist client set".to_string());
                state.last_error = Some(err.clone());
                return Err(err);
            }

            state.leads.retain(|candidate| candidate.id != lead.id);
            if self.write_json(CONTACTS_KEY, &state.leads) {
                state.last_error = None;
                Ok(ConvertOutcome::Converted)
            } else {
                // In-memory state stays consistent; the next reload
                // re-filters the stale persisted lead set.
                let err = AppError::StorageWrite("failed to persist lead set".to_string());
                state.last_error = Some(err.clone());
                Err(err)
            }
        };

        self.bus.publish(Event::ClientsChanged);
        self.bus.publish(Event::LeadsChanged);
        outcome
    }

    /// Reinstate the lead for a client id being deleted, preferring the
    /// denormalized copies still in the client set and falling back to the
    /// seed dataset. Idempotent when the id is already a lead.
    pub fn restore_from_client(&self, client_id: i64) -> AppResult<RestoreOutcome> {
        let clients = match self.read_clients() {
            Ok(clients) => clients,
            Err(err) => {
                self.lock_state().last_error = Some(err.clone());
                return Err(err);
            }
        };
        let candidate = clients
            .into_iter()
            .find(|client| client.id == client_id)
            .and_then(|client| client.restore_lead())
            .or_else(|| seed::lead_by_id(client_id).cloned());

        let (outcome, emit_leads) = {
            let mut state = self.lock_state();
            self.ensure_loaded(&mut state);
            self.reinstate_locked(&mut state, client_id, candidate)
        };
        if emit_leads {
            self.bus.publish(Event::LeadsChanged);
        }
        outcome
    }

    /// Remove a client and reinstate its lead: remove, persist, restore,
    /// then announce the deletion with the id so the lead side can react
    /// without polling. An id missing from the client set is a logged no-op
    /// that persists and announces nothing.
    pub fn delete_client(&self, client: &Client) -> AppResult<RestoreOutcome> {
        let (outcome, emit_leads) = {
            let mut state = self.lock_state();
            self.ensure_loaded(&mut state);

            let mut clients = match self.read_clients() {
                Ok(clients) => clients,
                Err(err) => {
                    state.last_error = Some(err.clone());
                    return Err(err);
                }
            };
            let before = clients.len();
            clients.retain(|candidate| candidate.id != client.id);
            if clients.len() == before {
                let err =
                    AppError::NotFound(format!("client {} is not in the client set", client.id));
                tracing::info!(error = %err, "delete ignored");
                return Ok(RestoreOutcome::NotFound);
            }
            if !self.write_json(CLIENTS_KEY, &clients) {
                let err = AppError::StorageWrite("failed to persist client set".to_string());
                state.last_error = Some(err.clone());
                return Err(err);
            }

            // Restore prefers the copies carried by the record being
            // deleted; the seed dataset covers records that predate them.
            let candidate = client
                .restore_lead()
                .or_else(|| seed::lead_by_id(client.id).cloned());
            self.reinstate_locked(&mut state, client.id, candidate)
        };

        self.bus.publish(Event::ClientsChanged);
        if emit_leads {
            self.bus.publish(Event::LeadsChanged);
        }
        self.bus.publish(Event::ClientDeleted {
            client_id: client.id,
        });
        outcome
    }

    /// Persist view filter state under the reserved key. Write-only from the
    /// engine's perspective; not required for correctness.
    pub fn save_filters(&self, query: &LeadQuery) -> bool {
        self.write_json(LEAD_FILTERS_KEY, query)
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state lock")
    }

    fn ensure_loaded(&self, state: &mut EngineState) {
        if !state.loaded {
            self.reload_locked(state);
        }
    }

    fn reload_locked(&self, state: &mut EngineState) -> Vec<Lead> {
        state.last_error = None;
        let leads = match self.derive_leads() {
            Ok((leads, corrected)) => {
                if corrected && !self.write_json(CONTACTS_KEY, &leads) {
                    state.last_error = Some(AppError::StorageWrite(
                        "failed to persist corrected lead set".to_string(),
                    ));
                }
                leads
            }
            Err(err) => {
                tracing::warn!(error = %err, "lead reload failed, falling back to seed dataset");
                state.last_error = Some(err);
                seed::leads().to_vec()
            }
        };
        state.leads = leads.clone();
        state.loaded = true;
        leads
    }

    fn derive_leads(&self) -> AppResult<(Vec<Lead>, bool)> {
        let clients = self.read_clients()?;
        let client_ids: HashSet<i64> = clients.iter().map(|client| client.id).collect();

        let raw: Vec<Lead> = match self.store.get(CONTACTS_KEY) {
            Some(text) => serde_json::from_str(&text)
                .map_err(|err| AppError::StorageRead(format!("malformed lead set: {err}")))?,
            None => seed::leads()
                .iter()
                .filter(|lead| !client_ids.contains(&lead.id))
                .cloned()
                .collect(),
        };

        let mut seen = HashSet::new();
        let leads: Vec<Lead> = raw
            .iter()
            .filter(|lead| seen.insert(lead.id) && !client_ids.contains(&lead.id))
            .cloned()
            .collect();

        // Dedup and filtering only ever drop entries, so a length change is
        // a content change.
        let corrected = leads.len() != raw.len();
        Ok((leads, corrected))
    }

    fn reinstate_locked(
        &self,
        state: &mut EngineState,
        client_id: i64,
        candidate: Option<Lead>,
    ) -> (AppResult<RestoreOutcome>, bool) {
        if state.leads.iter().any(|lead| lead.id == client_id) {
            let err = AppError::AlreadyExists(format!(
                "lead {client_id} is already in the lead set"
            ));
            tracing::info!(error = %err, "restore ignored");
            return (Ok(RestoreOutcome::AlreadyLead), false);
        }
        let Some(lead) = candidate else {
            let err = AppError::NotFound(format!("no restorable record for client {client_id}"));
            tracing::warn!(error = %err, "restore skipped");
            return (Ok(RestoreOutcome::NotFound), false);
        };

        state.leads.push(lead);
        if self.write_json(CONTACTS_KEY, &state.leads) {
            state.last_error = None;
            (Ok(RestoreOutcome::Restored), true)
        } else {
            let err = AppError::StorageWrite("failed to persist lead set".to_string());
            state.last_error = Some(err.clone());
            (Err(err), true)
        }
    }

    fn read_clients(&self) -> AppResult<Vec<Client>> {
        match self.store.get(CLIENTS_KEY) {
            Some(text) => serde_json::from_str(&text)
                .map_err(|err| AppError::StorageRead(format!("malformed client set: {err}"))),
            None => Ok(Vec::new()),
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.store.set(key, &text),
            Err(err) => {
                tracing::error!(key, error = %err, "failed to encode value for persistence");
                false
            }
        }
    }
}

use std::collections::HashSet;

use crate::db::{DurableSlot, RECORDS_KEY};
use crate::error::TrackerError;
use crate::models::{ApplicationDraft, ApplicationRecord, Summary};

/// Owns the record collection and mirrors it to the durable slot after every
/// mutation. The in-memory copy is authoritative for the session.
pub struct RecordStore<S: DurableSlot> {
    slot: S,
    records: Vec<ApplicationRecord>,
}

impl<S: DurableSlot> RecordStore<S> {
    /// Never fails: a missing or unreadable snapshot yields an empty store.
    pub fn load(slot: S) -> Self {
        let records = match slot.read(RECORDS_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<ApplicationRecord>>(&json) {
                Ok(records) => {
                    log::info!("Loaded {} applications", records.len());
                    records
                }
                Err(e) => {
                    log::warn!("Stored applications are unreadable, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Could not read stored applications, starting empty: {:#}", e);
                Vec::new()
            }
        };
        Self { slot, records }
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    pub fn get(&self, id: i64) -> Option<&ApplicationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn summary(&self) -> Summary {
        Summary::of(&self.records)
    }

    pub fn create(&mut self, draft: ApplicationDraft) -> Result<i64, TrackerError> {
        draft.validate()?;
        let id = fresh_id(self.records.iter().map(|r| r.id));
        self.records.push(draft.into_record(id));
        self.persist();
        Ok(id)
    }

    /// Replaces every field but the id.
    pub fn update(&mut self, id: i64, draft: ApplicationDraft) -> Result<(), TrackerError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(TrackerError::NotFound(id))?;
        draft.validate()?;
        self.records[idx] = draft.into_record(id);
        self.persist();
        Ok(())
    }

    /// Returns whether anything was removed. Absent ids are a no-op.
    pub fn delete(&mut self, id: i64) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        let removed = self.records.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn replace_all(&mut self, records: Vec<ApplicationRecord>) {
        self.records = records;
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.records)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.slot.write(RECORDS_KEY, &json));
        if let Err(e) = result {
            let err = TrackerError::PersistenceWrite {
                key: RECORDS_KEY.to_string(),
                message: format!("{:#}", e),
            };
            log::error!("{}", err);
        }
    }
}

/// Largest id handed out or accepted from a backup (2^53 - 1, the largest
/// integer a JSON number round-trips exactly as a double).
pub const MAX_ID: i64 = (1 << 53) - 1;

/// Time-derived id that is strictly greater than every existing id, so two
/// creates in the same millisecond still get distinct ids.
pub fn fresh_id(existing: impl IntoIterator<Item = i64>) -> i64 {
    let used: HashSet<i64> = existing.into_iter().collect();
    next_free_id(&used)
}

/// Falls back to the smallest unused positive id once the time-derived
/// candidate would pass [`MAX_ID`].
fn next_free_id(used: &HashSet<i64>) -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let candidate = match used.iter().max() {
        Some(&max) if max >= now => max.checked_add(1),
        _ => Some(now),
    };
    match candidate {
        Some(id) if (1..=MAX_ID).contains(&id) && !used.contains(&id) => id,
        _ => (1..=MAX_ID).find(|id| !used.contains(id)).unwrap_or(MAX_ID),
    }
}

/// Gives every record a unique id, keeping the first occurrence of each id and
/// reassigning `None` or repeated ids. Returns how many were reassigned.
pub fn assign_unique_ids(records: &mut [(Option<i64>, ApplicationRecord)]) -> usize {
    let mut used = HashSet::new();
    let mut needs_id = Vec::new();
    for (idx, (id, _)) in records.iter().enumerate() {
        match id {
            Some(id) if used.insert(*id) => {}
            _ => needs_id.push(idx),
        }
    }

    for &idx in &needs_id {
        let id = next_free_id(&used);
        used.insert(id);
        records[idx].0 = Some(id);
    }

    for (id, record) in records.iter_mut() {
        if let Some(id) = id {
            record.id = *id;
        }
    }
    needs_id.len()
}

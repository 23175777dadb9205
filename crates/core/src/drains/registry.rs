//! In-memory drain registry backed by the local state store.
//!
//! The registry exclusively owns the list of drains. Every mutation runs
//! against a working copy, persists the result, then swaps it in and
//! publishes a domain event, so in-memory state never diverges from storage.

use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use crate::schedule;
use crate::store::{StateStore, STATE_KEY_DRAINS};

use super::{CategoryCounts, CleaningRecord, Drain, DrainCategory, DrainFields, DrainStats};

pub struct DrainRegistry {
    store: Arc<dyn StateStore>,
    drains: RwLock<Vec<Drain>>,
    event_sink: RwLock<Arc<dyn DomainEventSink>>,
}

impl DrainRegistry {
    /// Loads the registry from the state store. Missing state yields an
    /// empty registry.
    pub fn load(store: Arc<dyn StateStore>) -> Result<Self> {
        let drains = match store.load(STATE_KEY_DRAINS)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        Ok(Self {
            store,
            drains: RwLock::new(drains),
            event_sink: RwLock::new(Arc::new(NoOpDomainEventSink)),
        })
    }

    /// Replaces the sink that receives mutation events.
    pub fn set_event_sink(&self, event_sink: Arc<dyn DomainEventSink>) {
        *self.event_sink.write().unwrap() = event_sink;
    }

    /// Creates a drain with a fresh id and empty history.
    pub fn add_drain(&self, fields: DrainFields) -> Result<Drain> {
        if fields.frequency_days < 1 {
            return Err(Error::invalid_argument("frequencyDays must be at least 1"));
        }
        let drain = Drain {
            id: Uuid::new_v4().to_string(),
            name: fields.name,
            location: fields.location,
            category: fields.category,
            history: Vec::new(),
            frequency_days: fields.frequency_days,
        };
        self.commit(move |drains| {
            let event = DomainEvent::DrainAdded {
                drain_id: drain.id.clone(),
            };
            drains.push(drain.clone());
            Ok((drain, event))
        })
    }

    /// Replaces name/location/category/frequency on the matching drain.
    /// History is untouched.
    pub fn edit_drain(&self, id: &str, fields: DrainFields) -> Result<Drain> {
        if fields.frequency_days < 1 {
            return Err(Error::invalid_argument("frequencyDays must be at least 1"));
        }
        self.commit(move |drains| {
            let drain = drains
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| Error::not_found(format!("drain {} does not exist", id)))?;
            drain.name = fields.name;
            drain.location = fields.location;
            drain.category = fields.category;
            drain.frequency_days = fields.frequency_days;
            Ok((
                drain.clone(),
                DomainEvent::DrainUpdated {
                    drain_id: id.to_string(),
                },
            ))
        })
    }

    /// Removes the drain and its history.
    pub fn delete_drain(&self, id: &str) -> Result<()> {
        self.commit(move |drains| {
            let before = drains.len();
            drains.retain(|d| d.id != id);
            if drains.len() == before {
                return Err(Error::not_found(format!("drain {} does not exist", id)));
            }
            Ok((
                (),
                DomainEvent::DrainDeleted {
                    drain_id: id.to_string(),
                },
            ))
        })
    }

    /// Logs a cleaning dated today at the front of the drain's history.
    pub fn record_cleaning(&self, id: &str, notes: &str, performer: &str) -> Result<CleaningRecord> {
        self.record_cleaning_on(id, schedule::today(), notes, performer)
    }

    /// Logs a cleaning with an explicit date, for backfilling paper logs.
    pub fn record_cleaning_on(
        &self,
        id: &str,
        date: NaiveDate,
        notes: &str,
        performer: &str,
    ) -> Result<CleaningRecord> {
        let record = CleaningRecord {
            id: Uuid::new_v4().to_string(),
            date,
            notes: notes.to_string(),
            performer: performer.to_string(),
        };
        self.commit(move |drains| {
            let drain = drains
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| Error::not_found(format!("drain {} does not exist", id)))?;
            let event = DomainEvent::CleaningRecorded {
                drain_id: id.to_string(),
                record_id: record.id.clone(),
            };
            drain.history.insert(0, record.clone());
            Ok((record, event))
        })
    }

    /// Wholesale replacement of the collection. Used by the sync engine when
    /// a differing remote snapshot is adopted; never merges.
    pub fn replace_all(&self, drains: Vec<Drain>) -> Result<()> {
        let payload = serde_json::to_string(&drains)?;
        self.store.save(STATE_KEY_DRAINS, &payload)?;
        *self.drains.write().unwrap() = drains;
        self.publish(DomainEvent::StateReplaced);
        Ok(())
    }

    /// Copy of the full current state, for persistence and sync.
    pub fn snapshot(&self) -> Vec<Drain> {
        self.drains.read().unwrap().clone()
    }

    /// Copy of one drain by id.
    pub fn drain(&self, id: &str) -> Result<Drain> {
        self.drains
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("drain {} does not exist", id)))
    }

    /// Aggregate counts relative to an explicit `today`.
    pub fn stats_on(&self, today: NaiveDate) -> DrainStats {
        let drains = self.drains.read().unwrap();
        let total = drains.len();
        let mut by_category = CategoryCounts::default();
        let mut overdue = 0;
        for drain in drains.iter() {
            match drain.category {
                DrainCategory::Large => by_category.large += 1,
                DrainCategory::Medium => by_category.medium += 1,
                DrainCategory::Small => by_category.small += 1,
            }
            if drain.status_on(today).overdue {
                overdue += 1;
            }
        }
        let system_health_percentage = if total > 0 {
            (((total - overdue) as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };
        DrainStats {
            total,
            by_category,
            overdue,
            system_health_percentage,
        }
    }

    /// Aggregate counts relative to the local calendar date.
    pub fn stats(&self) -> DrainStats {
        self.stats_on(schedule::today())
    }

    /// Applies a mutation to a working copy, persists it, then swaps it in
    /// and publishes the resulting event. In-memory state is untouched when
    /// the mutation or persistence fails. The event is published after the
    /// write lock is released so sinks may read the registry.
    fn commit<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Drain>) -> Result<(T, DomainEvent)>,
    {
        let (value, event) = {
            let mut drains = self.drains.write().unwrap();
            let mut working = drains.clone();
            let (value, event) = mutate(&mut working)?;
            let payload = serde_json::to_string(&working)?;
            self.store.save(STATE_KEY_DRAINS, &payload)?;
            *drains = working;
            (value, event)
        };
        self.publish(event);
        Ok(value)
    }

    fn publish(&self, event: DomainEvent) {
        let sink = self.event_sink.read().unwrap().clone();
        sink.publish(event);
    }
}

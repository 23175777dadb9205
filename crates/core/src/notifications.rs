//! Deduplicated maintenance alerts.
//!
//! The gate walks the drain list, decides which drains warrant an alert
//! today, and emits each alert at most once per drain, bucket and calendar
//! day. Fired keys are persisted so a restart does not replay them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use log::info;

use crate::drains::Drain;
use crate::errors::Result;
use crate::schedule::{self, APPROACHING_THRESHOLD_DAYS, NEVER_CLEANED_DAYS};
use crate::store::{StateStore, STATE_KEY_NOTIFIED};

/// Outbound alert surface. Delivery is fire and forget; failures are the
/// sink's problem.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, title: &str, body: &str);
}

/// Default sink: alerts land in the log.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn emit(&self, title: &str, body: &str) {
        info!("[Alert] {}: {}", title, body);
    }
}

/// Emits due-soon and overdue alerts, suppressing repeats.
pub struct NotificationGate {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn NotificationSink>,
    notified: Mutex<HashSet<String>>,
}

impl NotificationGate {
    /// Restores the fired-key set from the state store. Missing state yields
    /// an empty set.
    pub fn load(store: Arc<dyn StateStore>, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let notified = match store.load(STATE_KEY_NOTIFIED)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => HashSet::new(),
        };
        Ok(Self {
            store,
            sink,
            notified: Mutex::new(notified),
        })
    }

    /// Evaluates the drain list against today's local calendar date.
    pub fn evaluate(&self, drains: &[Drain]) -> Result<usize> {
        self.evaluate_on(drains, schedule::today())
    }

    /// Deterministic core of `evaluate`. Returns how many alerts were
    /// emitted; suppressed repeats do not count.
    pub fn evaluate_on(&self, drains: &[Drain], today: NaiveDate) -> Result<usize> {
        let mut notified = self.notified.lock().unwrap();
        let mut emitted = 0usize;

        for drain in drains {
            let days_since = match drain.last_cleaning() {
                Some(record) => schedule::days_since(record.date, today),
                None => NEVER_CLEANED_DAYS,
            };
            let days_remaining = i64::from(drain.frequency_days) - days_since;

            let bucket = if days_remaining <= 0 {
                "overdue".to_string()
            } else {
                days_remaining.to_string()
            };
            let key = format!("{}-{}-{}", drain.id, bucket, today.format("%Y-%m-%d"));
            if notified.contains(&key) {
                continue;
            }

            if days_remaining == APPROACHING_THRESHOLD_DAYS {
                self.sink.emit(
                    "Cleaning due soon",
                    &format!(
                        "Drain \"{}\" is due for cleaning in {} days.",
                        drain.name, days_remaining
                    ),
                );
            } else if days_remaining <= 0 {
                self.sink.emit(
                    "Cleaning overdue",
                    &format!("Drain \"{}\" is past its cleaning schedule.", drain.name),
                );
            } else {
                continue;
            }

            notified.insert(key);
            emitted += 1;
        }

        if emitted > 0 {
            let payload = serde_json::to_string(&*notified)?;
            self.store.save(STATE_KEY_NOTIFIED, &payload)?;
        }
        Ok(emitted)
    }
}

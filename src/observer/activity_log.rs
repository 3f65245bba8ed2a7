use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use crate::control::{ActionReport, TriggerRecord};
use crate::gesture::{Action, GestureLabel, Hand};

pub const MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub hand: Hand,
    pub gesture: GestureLabel,
    pub action: Action,
    /// `None` until the executor reports back.
    pub succeeded: Option<bool>,
    pub detail: Option<String>,
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]  {}  →  {}",
            self.at.format("%H:%M:%S"),
            self.gesture.display_name(),
            self.action.description()
        )?;
        if self.succeeded == Some(false) {
            if let Some(detail) = &self.detail {
                write!(f, " (failed: {detail})")?;
            }
        }
        Ok(())
    }
}

/// Newest-last history of triggers, capped at [`MAX_ENTRIES`].
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_ENTRIES),
        }
    }

    pub fn record_trigger(&mut self, record: &TriggerRecord) {
        if self.entries.len() == MAX_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(ActivityEntry {
            at: record.triggered_at,
            hand: record.hand,
            gesture: record.label,
            action: record.action,
            succeeded: None,
            detail: None,
        });
    }

    /// Attach an outcome to the oldest pending entry for the same hand and gesture.
    /// Actions run in order, so oldest-pending is the one this report belongs to.
    pub fn record_report(&mut self, report: &ActionReport) -> bool {
        let pending = self.entries.iter_mut().find(|entry| {
            entry.succeeded.is_none()
                && entry.hand == report.hand
                && entry.gesture == report.label
                && entry.action == report.action
        });
        match pending {
            Some(entry) => {
                entry.succeeded = Some(report.success);
                entry.detail = Some(report.message.clone());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

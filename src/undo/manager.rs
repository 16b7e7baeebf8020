use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::contact::{CIRCLE_FIELD, Contact};

use super::record::{
    Metadata, PreviousValues, RestoreAction, RestoreReport, RestoreStrategy, UndoRecord,
    UndoSummary,
};

/// Error type for undo operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UndoError {
    #[error("no action to undo")]
    NothingToUndo,
    #[error("undo already in progress")]
    UndoInProgress,
    #[error("incomplete undo record: missing {0}")]
    IncompleteRecord(&'static str),
    #[error("failed to undo: {0}")]
    RestoreFailed(String),
}

/// Hook invoked by the default restore path with the reverted contacts,
/// letting external UI refresh
pub type ContactsChangedHook = Arc<dyn Fn(&[Contact]) + Send + Sync>;

/// Single-slot store for the latest undoable bulk action.
///
/// At most one record is pending at a time; saving a new one discards
/// the old one, so only the most recent bulk action can be undone.
/// Purely in-memory: any API round-trip lives in the record's restore
/// capability, not here. Construct one instance at startup and hand it
/// (behind an `Arc`) to whichever UI components need it.
pub struct UndoStateManager {
    slot: Mutex<Option<UndoRecord>>,
    restoring: AtomicBool,
    on_contacts_changed: Mutex<Option<ContactsChangedHook>>,
}

/// Releases the in-flight flag on every exit path of `restore_state`
struct RestoreGuard<'a>(&'a AtomicBool);

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for UndoStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStateManager {
    pub fn new() -> Self {
        UndoStateManager {
            slot: Mutex::new(None),
            restoring: AtomicBool::new(false),
            on_contacts_changed: Mutex::new(None),
        }
    }

    /// Register the optional contacts-changed notification hook used by
    /// the default restore path
    pub fn set_contacts_changed_hook(&self, hook: ContactsChangedHook) {
        *self.on_contacts_changed.lock().unwrap() = Some(hook);
    }

    /// Store a record, discarding any pending one.
    ///
    /// The record must carry a non-empty action type, contact list, and
    /// previous-value snapshot; otherwise nothing is stored. `created_at`
    /// is stamped here, not taken from the candidate.
    pub fn save_state(&self, mut record: UndoRecord) -> Result<(), UndoError> {
        let missing = if record.action_type.is_empty() {
            Some("action_type")
        } else if record.affected_contacts.is_empty() {
            Some("affected_contacts")
        } else if record.previous_values.is_empty() {
            Some("previous_values")
        } else {
            None
        };
        if let Some(field) = missing {
            warn!(field, "rejected undo record missing required field");
            return Err(UndoError::IncompleteRecord(field));
        }

        record.created_at = Utc::now();
        let mut slot = self.slot.lock().unwrap();
        if let Some(previous) = slot.as_ref() {
            info!(
                previous_action = %previous.action_type,
                action = %record.action_type,
                "undo slot overwritten"
            );
        }
        info!(
            action = %record.action_type,
            contacts = record.affected_contacts.len(),
            "undo slot saved"
        );
        *slot = Some(record);
        Ok(())
    }

    /// Revert the pending record.
    ///
    /// Runs the record's restore capability (or the default circle
    /// write-back) and clears the slot on success. On failure the record
    /// stays put so the caller can retry; the in-flight flag is released
    /// either way. A logically concurrent second call (say, a rapid
    /// double-click) fails with [`UndoError::UndoInProgress`].
    pub async fn restore_state(&self) -> Result<RestoreReport, UndoError> {
        if self
            .restoring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UndoError::UndoInProgress);
        }
        let _guard = RestoreGuard(&self.restoring);

        let record = self
            .slot
            .lock()
            .unwrap()
            .clone()
            .ok_or(UndoError::NothingToUndo)?;

        let outcome = match &record.restore {
            RestoreStrategy::Custom(action) => {
                action
                    .restore(&record.previous_values, &record.affected_contacts)
                    .await
            }
            RestoreStrategy::Default => {
                self.apply_default_restore(&record);
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {
                *self.slot.lock().unwrap() = None;
                info!(
                    action = %record.action_type,
                    contacts = record.affected_contacts.len(),
                    "bulk action undone"
                );
                Ok(RestoreReport {
                    action_type: record.action_type,
                    contacts_restored: record.affected_contacts.len(),
                    metadata: record.metadata,
                })
            }
            Err(e) => {
                warn!(
                    action = %record.action_type,
                    error = %e,
                    "restore failed, record kept for retry"
                );
                Err(UndoError::RestoreFailed(e.to_string()))
            }
        }
    }

    /// Write captured circle values back onto the stored contacts and
    /// notify the contacts-changed hook. Contacts missing from the
    /// snapshot are left untouched.
    fn apply_default_restore(&self, record: &UndoRecord) {
        let mut contacts = record.affected_contacts.clone();
        let mut skipped = 0usize;
        for contact in &mut contacts {
            match record.previous_values.get(&contact.id) {
                Some(value) => contact.set_field(CIRCLE_FIELD, value.clone()),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "contacts absent from snapshot left untouched");
        }
        let hook = self.on_contacts_changed.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(&contacts);
        }
    }

    /// Discard the pending record. No-op when the slot is empty.
    pub fn clear_undo_stack(&self) {
        let mut slot = self.slot.lock().unwrap();
        if slot.take().is_some() {
            debug!("undo slot cleared");
        }
    }

    /// True when a record is pending and no restoration is in flight
    pub fn can_undo(&self) -> bool {
        !self.restoring.load(Ordering::SeqCst) && self.slot.lock().unwrap().is_some()
    }

    /// Summary of the pending record, or `None` when the slot is empty
    pub fn undo_info(&self) -> Option<UndoSummary> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|record| UndoSummary {
                action_type: record.action_type.clone(),
                contact_count: record.affected_contacts.len(),
                created_at: record.created_at,
                metadata: record.metadata.clone(),
            })
    }

    /// Snapshot the named field of each contact, keyed by contact ID.
    /// Absent fields are recorded as JSON null. Does not mutate input.
    pub fn capture_contact_state(contacts: &[Contact], field: &str) -> PreviousValues {
        contacts
            .iter()
            .map(|c| (c.id.clone(), c.field(field).unwrap_or(Value::Null)))
            .collect()
    }

    /// Assemble a ready-to-save record for a bulk circle assignment.
    ///
    /// Captures the circle field of every contact and merges the
    /// caller's metadata with the contact-id list and capture timestamp.
    /// Composition is the caller's: this does not save.
    pub fn create_bulk_assignment_state(
        action_type: &str,
        contacts: &[Contact],
        restore: Option<Arc<dyn RestoreAction>>,
        metadata: Metadata,
    ) -> UndoRecord {
        let previous = Self::capture_contact_state(contacts, CIRCLE_FIELD);
        let mut merged = metadata;
        merged.insert(
            "contact_ids".to_string(),
            Value::Array(
                contacts
                    .iter()
                    .map(|c| Value::String(c.id.clone()))
                    .collect(),
            ),
        );
        merged.insert(
            "captured_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        let mut record =
            UndoRecord::new(action_type, contacts.to_vec(), previous).with_metadata(merged);
        if let Some(action) = restore {
            record = record.with_restore(action);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::contact::Circle;
    use crate::undo::record::{RestoreError, restore_fn};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn sample_contacts() -> Vec<Contact> {
        vec![
            Contact::with_circle("c1", "Ada", Circle::Casual),
            Contact::with_circle("c2", "Grace", Circle::Casual),
        ]
    }

    fn sample_record() -> UndoRecord {
        let contacts = sample_contacts();
        let previous = UndoStateManager::capture_contact_state(&contacts, CIRCLE_FIELD);
        UndoRecord::new("bulk-assign", contacts, previous)
    }

    // -----------------------------------------------------------------------
    // save_state validation
    // -----------------------------------------------------------------------

    #[test]
    fn save_rejects_empty_action_type() {
        let manager = UndoStateManager::new();
        let mut record = sample_record();
        record.action_type = String::new();
        assert_eq!(
            manager.save_state(record),
            Err(UndoError::IncompleteRecord("action_type"))
        );
        assert!(!manager.can_undo());
    }

    #[test]
    fn save_rejects_empty_contacts() {
        let manager = UndoStateManager::new();
        let mut record = sample_record();
        record.affected_contacts.clear();
        assert_eq!(
            manager.save_state(record),
            Err(UndoError::IncompleteRecord("affected_contacts"))
        );
    }

    #[test]
    fn save_rejects_empty_previous_values() {
        let manager = UndoStateManager::new();
        let mut record = sample_record();
        record.previous_values.clear();
        assert_eq!(
            manager.save_state(record),
            Err(UndoError::IncompleteRecord("previous_values"))
        );
    }

    // -----------------------------------------------------------------------
    // Single slot
    // -----------------------------------------------------------------------

    #[test]
    fn save_overwrites_previous_record() {
        let manager = UndoStateManager::new();
        manager.save_state(sample_record()).unwrap();

        let mut second = sample_record();
        second.action_type = "accept-all".to_string();
        manager.save_state(second).unwrap();

        let info = manager.undo_info().unwrap();
        assert_eq!(info.action_type, "accept-all");
    }

    #[test]
    fn clear_is_idempotent() {
        let manager = UndoStateManager::new();
        manager.save_state(sample_record()).unwrap();

        manager.clear_undo_stack();
        assert!(!manager.can_undo());
        manager.clear_undo_stack();
        assert!(!manager.can_undo());
        assert_eq!(manager.undo_info(), None);
    }

    #[test]
    fn undo_info_reflects_pending_record() {
        let manager = UndoStateManager::new();
        assert_eq!(manager.undo_info(), None);

        manager.save_state(sample_record()).unwrap();
        let info = manager.undo_info().unwrap();
        assert_eq!(info.action_type, "bulk-assign");
        assert_eq!(info.contact_count, 2);
    }

    // -----------------------------------------------------------------------
    // Capture helpers
    // -----------------------------------------------------------------------

    #[test]
    fn capture_records_absent_fields_as_null() {
        let contacts = vec![
            Contact::with_circle("c1", "Ada", Circle::Inner),
            Contact::new("c2", "Grace"),
        ];
        let captured = UndoStateManager::capture_contact_state(&contacts, CIRCLE_FIELD);
        assert_eq!(captured.get("c1"), Some(&json!("inner")));
        assert_eq!(captured.get("c2"), Some(&Value::Null));
    }

    #[test]
    fn capture_reads_open_fields() {
        let mut contact = Contact::new("c1", "Ada");
        contact.set_field("cadence", json!("monthly"));
        let captured = UndoStateManager::capture_contact_state(&[contact], "cadence");
        assert_eq!(captured.get("c1"), Some(&json!("monthly")));
    }

    #[test]
    fn bulk_assignment_state_merges_metadata() {
        let contacts = sample_contacts();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!("circles-screen"));

        let record =
            UndoStateManager::create_bulk_assignment_state("bulk-assign", &contacts, None, metadata);

        assert_eq!(record.action_type, "bulk-assign");
        assert_eq!(record.metadata.get("source"), Some(&json!("circles-screen")));
        assert_eq!(
            record.metadata.get("contact_ids"),
            Some(&json!(["c1", "c2"]))
        );
        assert!(record.metadata.contains_key("captured_at"));
        assert_eq!(record.previous_values.get("c1"), Some(&json!("casual")));
        assert!(matches!(record.restore, RestoreStrategy::Default));
    }

    // -----------------------------------------------------------------------
    // restore_state
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn restore_with_empty_slot_fails() {
        let manager = UndoStateManager::new();
        assert_eq!(
            manager.restore_state().await,
            Err(UndoError::NothingToUndo)
        );
    }

    #[tokio::test]
    async fn default_restore_reverts_circles_and_notifies_hook() {
        let manager = UndoStateManager::new();
        let seen: Arc<Mutex<Vec<Contact>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = Arc::clone(&seen);
        manager.set_contacts_changed_hook(Arc::new(move |contacts| {
            *seen_hook.lock().unwrap() = contacts.to_vec();
        }));

        // Capture before the bulk action, then mutate to inner
        let contacts = sample_contacts();
        let previous = UndoStateManager::capture_contact_state(&contacts, CIRCLE_FIELD);
        let mut mutated = contacts.clone();
        for c in &mut mutated {
            c.circle = Some(Circle::Inner);
        }
        manager
            .save_state(UndoRecord::new("bulk-assign", mutated, previous))
            .unwrap();

        let report = manager.restore_state().await.unwrap();
        assert_eq!(report.action_type, "bulk-assign");
        assert_eq!(report.contacts_restored, 2);
        assert!(!manager.can_undo());

        let reverted = seen.lock().unwrap();
        assert_eq!(reverted.len(), 2);
        assert!(reverted.iter().all(|c| c.circle == Some(Circle::Casual)));
    }

    #[tokio::test]
    async fn default_restore_skips_contacts_missing_from_snapshot() {
        let manager = UndoStateManager::new();
        let seen: Arc<Mutex<Vec<Contact>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = Arc::clone(&seen);
        manager.set_contacts_changed_hook(Arc::new(move |contacts| {
            *seen_hook.lock().unwrap() = contacts.to_vec();
        }));

        let contacts = sample_contacts();
        let mut previous = UndoStateManager::capture_contact_state(&contacts, CIRCLE_FIELD);
        previous.shift_remove("c2");
        let mut mutated = contacts.clone();
        for c in &mut mutated {
            c.circle = Some(Circle::Inner);
        }
        manager
            .save_state(UndoRecord::new("bulk-assign", mutated, previous))
            .unwrap();
        manager.restore_state().await.unwrap();

        let reverted = seen.lock().unwrap();
        assert_eq!(reverted[0].circle, Some(Circle::Casual));
        // c2 had no snapshot entry and keeps its mutated value
        assert_eq!(reverted[1].circle, Some(Circle::Inner));
    }

    #[tokio::test]
    async fn custom_restore_receives_snapshot_and_contacts() {
        let manager = UndoStateManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_inner = Arc::clone(&calls);
        let action = restore_fn(move |previous, contacts| {
            let calls = Arc::clone(&calls_inner);
            async move {
                assert_eq!(previous.get("c1"), Some(&json!("casual")));
                assert_eq!(contacts.len(), 2);
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let record = sample_record().with_restore(action);
        manager.save_state(record).unwrap();

        manager.restore_state().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!manager.can_undo());
    }

    #[tokio::test]
    async fn failed_restore_keeps_record_for_retry() {
        let manager = UndoStateManager::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_inner = Arc::clone(&attempts);
        let action = restore_fn(move |_, _| {
            let attempts = Arc::clone(&attempts_inner);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RestoreError::new("api unreachable"))
                } else {
                    Ok(())
                }
            }
        });
        manager
            .save_state(sample_record().with_restore(action))
            .unwrap();

        let err = manager.restore_state().await.unwrap_err();
        assert_eq!(err, UndoError::RestoreFailed("api unreachable".to_string()));
        assert!(manager.can_undo());

        // Same stored record, second attempt succeeds and clears the slot
        manager.restore_state().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!manager.can_undo());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_restore_is_rejected() {
        let manager = Arc::new(UndoStateManager::new());
        let action = restore_fn(|_, _| async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        });
        manager
            .save_state(sample_record().with_restore(action))
            .unwrap();

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.restore_state().await })
        };
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // First call is parked on its sleep; a second one must bounce
        assert!(!manager.can_undo());
        assert_eq!(
            manager.restore_state().await,
            Err(UndoError::UndoInProgress)
        );

        let report = first.await.unwrap().unwrap();
        assert_eq!(report.contacts_restored, 2);
        assert!(!manager.can_undo());
    }
}

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;

use crate::model::contact::Contact;

/// Pre-action field values keyed by contact ID. `Value::Null` records
/// that the field was absent when captured.
pub type PreviousValues = IndexMap<String, Value>;

/// Open metadata carried on a record, opaque to the manager, reported
/// back to the caller on completion
pub type Metadata = IndexMap<String, Value>;

/// Error surfaced by a failed restore operation
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct RestoreError {
    message: String,
}

impl RestoreError {
    pub fn new(message: impl Into<String>) -> Self {
        RestoreError {
            message: message.into(),
        }
    }
}

/// Reverses a bulk mutation. Implementations own any API round-trip
/// needed to persist the reversal; the manager only awaits the result.
#[async_trait]
pub trait RestoreAction: Send + Sync {
    async fn restore(
        &self,
        previous: &PreviousValues,
        contacts: &[Contact],
    ) -> Result<(), RestoreError>;
}

struct FnRestore<F>(F);

#[async_trait]
impl<F, Fut> RestoreAction for FnRestore<F>
where
    F: Fn(PreviousValues, Vec<Contact>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RestoreError>> + Send,
{
    async fn restore(
        &self,
        previous: &PreviousValues,
        contacts: &[Contact],
    ) -> Result<(), RestoreError> {
        (self.0)(previous.clone(), contacts.to_vec()).await
    }
}

/// Wrap an async closure as a [`RestoreAction`]
pub fn restore_fn<F, Fut>(f: F) -> Arc<dyn RestoreAction>
where
    F: Fn(PreviousValues, Vec<Contact>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RestoreError>> + Send + 'static,
{
    Arc::new(FnRestore(f))
}

/// How a stored record is reverted, fixed at record construction
#[derive(Clone)]
pub enum RestoreStrategy {
    /// Caller-supplied capability
    Custom(Arc<dyn RestoreAction>),
    /// Write captured circle values back onto the stored contacts
    Default,
}

impl fmt::Debug for RestoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreStrategy::Custom(_) => write!(f, "Custom(..)"),
            RestoreStrategy::Default => write!(f, "Default"),
        }
    }
}

/// A single undoable bulk action
#[derive(Debug, Clone)]
pub struct UndoRecord {
    /// Tag identifying the kind of bulk operation, e.g. "bulk-assign"
    pub action_type: String,
    /// Owned snapshot of the contacts the action touched
    pub affected_contacts: Vec<Contact>,
    /// Pre-action field values keyed by contact ID
    pub previous_values: PreviousValues,
    /// How to revert the mutation
    pub restore: RestoreStrategy,
    /// Auxiliary context (contact count, source screen, ...)
    pub metadata: Metadata,
    /// Capture time; informational only, expiry is the toast's job
    pub created_at: DateTime<Utc>,
}

impl UndoRecord {
    /// Build a record with the default restore strategy and no metadata
    pub fn new(
        action_type: impl Into<String>,
        affected_contacts: Vec<Contact>,
        previous_values: PreviousValues,
    ) -> Self {
        UndoRecord {
            action_type: action_type.into(),
            affected_contacts,
            previous_values,
            restore: RestoreStrategy::Default,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a caller-supplied restore capability
    pub fn with_restore(mut self, action: Arc<dyn RestoreAction>) -> Self {
        self.restore = RestoreStrategy::Custom(action);
        self
    }

    /// Attach caller metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Read-only summary of the pending record, enough for the UI to decide
/// whether to offer an undo affordance
#[derive(Debug, Clone, PartialEq)]
pub struct UndoSummary {
    pub action_type: String,
    pub contact_count: usize,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Success payload from a completed restoration
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub action_type: String,
    pub contacts_restored: usize,
    pub metadata: Metadata,
}

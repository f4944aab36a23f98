//! Optimistic concurrency control for versioned records.
//!
//! Every mutable record carries a version that starts at 1 and grows by
//! exactly one per successful write. A write names the version it was based
//! on; the store applies it only if that version is still current, in one
//! atomic statement:
//!
//! ```text
//! UPDATE ... SET ..., version = version + 1
//! WHERE id = $id AND version = $expected
//! RETURNING version
//! ```
//!
//! No row back means someone else won. There are no locks and no retries
//! here: on [`UpdateError::Conflict`] the caller re-reads and tries again, or
//! tells the end user.

use async_trait::async_trait;
use thiserror::Error;

use crate::repos::StoreError;

/// A record protected by a version counter.
pub trait Versioned {
    fn id(&self) -> i64;
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write went through; carries the new version.
    Applied(i32),
    /// No row had the given id and version.
    NoMatch,
}

/// Storage boundary for versioned records.
#[async_trait]
pub trait VersionedStore<T>: Send + Sync {
    /// Load the current state of a record.
    async fn fetch(&self, id: i64) -> Result<Option<T>, StoreError>;

    /// Persist `record` only if the stored version still equals
    /// `record.version()`, bumping the version by one.
    async fn write_if_version(&self, record: &T) -> Result<WriteOutcome, StoreError>;
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    Conflict,
    /// The mutation refused to produce a valid record.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies mutations to versioned records through a [`VersionedStore`].
pub struct ConditionalUpdater<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: ?Sized> ConditionalUpdater<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Loads record `id`, then behaves like [`Self::apply_to`].
    pub async fn apply<T, F>(
        &self,
        id: i64,
        precondition: Option<i32>,
        mutate: F,
    ) -> Result<T, UpdateError>
    where
        S: VersionedStore<T>,
        T: Versioned + Send + Sync,
        F: FnOnce(&mut T) -> Result<(), String> + Send,
    {
        let snapshot = self.store.fetch(id).await?.ok_or(UpdateError::NotFound)?;
        self.apply_to(snapshot, precondition, mutate).await
    }

    /// Mutates `snapshot` and writes it back if nobody else has written since
    /// it was read.
    ///
    /// `precondition` is a version the client claims to have seen. It is
    /// compared with the snapshot before any write is attempted, which saves
    /// a round trip for obviously stale requests; the conditional write is
    /// still what decides.
    ///
    /// A write that matches no row is reported as a conflict: the record was
    /// present when the snapshot was taken.
    pub async fn apply_to<T, F>(
        &self,
        mut snapshot: T,
        precondition: Option<i32>,
        mutate: F,
    ) -> Result<T, UpdateError>
    where
        S: VersionedStore<T>,
        T: Versioned + Send + Sync,
        F: FnOnce(&mut T) -> Result<(), String>,
    {
        let expected = snapshot.version();
        if let Some(claimed) = precondition
            && claimed != expected
        {
            tracing::debug!(
                id = snapshot.id(),
                claimed,
                current = expected,
                "stale precondition"
            );
            return Err(UpdateError::Conflict);
        }

        mutate(&mut snapshot).map_err(UpdateError::Rejected)?;

        match self.store.write_if_version(&snapshot).await? {
            WriteOutcome::Applied(version) => {
                snapshot.set_version(version);
                Ok(snapshot)
            }
            WriteOutcome::NoMatch => {
                tracing::info!(id = snapshot.id(), expected, "edit conflict");
                Err(UpdateError::Conflict)
            }
        }
    }
}

//! Role-scoped visibility.
//!
//! One rule covers every owner-scoped record: privileged actors see everything,
//! collectors see what they collected, anonymous callers see nothing. A
//! transaction belongs to whoever owns the item it sells.
use super::actor::Caller;
use super::error::LedgerError;
use super::item::CollectedItem;
use super::transaction::Transaction;
use super::types::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    Nothing,
    OwnedBy(ActorId),
    Everything,
}

impl AccessScope {
    pub fn for_caller(caller: &Caller) -> Self {
        match caller.actor() {
            None => AccessScope::Nothing,
            Some(actor) if actor.is_privileged() => AccessScope::Everything,
            Some(actor) => AccessScope::OwnedBy(actor.id),
        }
    }

    /// Whether a record owned by `owner` is visible. Orphaned records are
    /// visible to privileged actors only.
    pub fn admits_owner(&self, owner: Option<ActorId>) -> bool {
        match self {
            AccessScope::Nothing => false,
            AccessScope::Everything => true,
            AccessScope::OwnedBy(id) => owner == Some(*id),
        }
    }

    pub fn admits_item(&self, item: &CollectedItem) -> bool {
        self.admits_owner(item.collector)
    }

    /// `item` must be the item `transaction` references.
    pub fn admits_transaction(&self, transaction: &Transaction, item: &CollectedItem) -> bool {
        transaction.item == item.id && self.admits_item(item)
    }

    /// Maps a record outside the scope to [`LedgerError::NotFound`].
    pub fn require(&self, visible: bool) -> Result<(), LedgerError> {
        if visible { Ok(()) } else { Err(LedgerError::NotFound) }
    }
}

/// Gate for operations that are privileged in full rather than owner-scoped.
pub fn require_privileged(caller: &Caller) -> Result<(), LedgerError> {
    match caller.actor() {
        None => Err(LedgerError::Unauthenticated),
        Some(actor) if actor.is_privileged() => Ok(()),
        Some(_) => Err(LedgerError::Forbidden),
    }
}

/// Gate for writes open to any authenticated actor.
pub fn require_authenticated(caller: &Caller) -> Result<ActorId, LedgerError> {
    caller
        .actor()
        .map(|actor| actor.id)
        .ok_or(LedgerError::Unauthenticated)
}

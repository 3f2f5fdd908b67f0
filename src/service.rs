//! Service layer API for collection and resale operations.
//!
//! Every operation takes the [`Caller`] supplied by the identity provider.
//! Owner-scoped records (items and transactions) pass through [`AccessScope`];
//! a record outside the caller's scope is reported exactly like a missing one.
//! Writes run inside one store transaction together with their validation.
use super::actor::{ActorDraft, ActorRecord, Caller, Role};
use super::catalog::{Category, CategoryDraft, CategoryPatch};
use super::config::SeedCategory;
use super::error::{LedgerError, ValidationError};
use super::item::{CollectedItem, ItemDetail, ItemDraft, ItemPatch};
use super::scope::{AccessScope, require_authenticated, require_privileged};
use super::store::{Store, StoreTx, TxResult, aborted};
use super::supplier::{Supplier, SupplierDraft, SupplierPatch};
use super::transaction::{SaleStatus, Transaction, TransactionDraft, TransactionPatch};
use super::types::{ActorId, CategoryId, ItemId, Money, SupplierId, TimeStamp, TransactionId};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, info};

pub struct LedgerService {
    store: Store,
}

/// Result of seeding the category catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedOutcome {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

// Loads an item the scope admits, or fails as not found.
fn scoped_item(tx: &StoreTx<'_>, scope: AccessScope, id: ItemId) -> TxResult<CollectedItem> {
    match tx.item(id)? {
        Some(item) if scope.admits_item(&item) => Ok(item),
        _ => Err(aborted(LedgerError::NotFound)),
    }
}

fn scoped_transaction(
    tx: &StoreTx<'_>,
    scope: AccessScope,
    id: TransactionId,
) -> TxResult<Transaction> {
    let Some(transaction) = tx.transaction(id)? else {
        return Err(aborted(LedgerError::NotFound));
    };
    match tx.item(transaction.item)? {
        Some(item) if scope.admits_transaction(&transaction, &item) => Ok(transaction),
        _ => Err(aborted(LedgerError::NotFound)),
    }
}

// An item a transaction may reference. Unknown and out-of-scope items are
// rejected with the same message.
fn sellable_item(tx: &StoreTx<'_>, scope: AccessScope, id: ItemId) -> TxResult<CollectedItem> {
    match tx.item(id)? {
        Some(item) if scope.admits_item(&item) => Ok(item),
        _ => Err(aborted(ValidationError::new("ewaste_item", "Invalid item."))),
    }
}

fn log_rejection(operation: &str, err: &LedgerError) {
    if err.is_client_error() {
        debug!(operation, error = %err, "request rejected");
    }
}

impl LedgerService {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            store: Store::new(instance),
        }
    }

    pub fn with_store(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // CATEGORIES

    /// All categories ordered by name. Anonymous callers get an empty list.
    pub fn list_categories(&self, caller: &Caller) -> Result<Vec<Category>, LedgerError> {
        if caller.actor().is_none() {
            return Ok(Vec::new());
        }
        let mut categories = self.store.categories()?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    pub fn category(&self, caller: &Caller, id: CategoryId) -> Result<Category, LedgerError> {
        if caller.actor().is_none() {
            return Err(LedgerError::NotFound);
        }
        self.store.category(id)?.ok_or(LedgerError::NotFound)
    }

    pub fn create_category(&self, caller: &Caller, draft: CategoryDraft) -> Result<Category, LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("create_category", e))?;
        let id = CategoryId(self.store.next_id()?);
        let category = draft
            .finalise(id)
            .map_err(LedgerError::from)
            .inspect_err(|e| log_rejection("create_category", e))?;

        self.store
            .atomically(|tx| tx.put_category(&category))
            .inspect_err(|e| log_rejection("create_category", e))?;

        info!(category = %category.id, name = %category.name, price = %category.base_price_per_kg, "category created");
        Ok(category)
    }

    /// Updates a category. Stamped item values are not recomputed, and the name
    /// is frozen once any item references the category.
    pub fn update_category(
        &self,
        caller: &Caller,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("update_category", e))?;

        let category = self
            .store
            .atomically(|tx| {
                let existing = tx.category(id)?.ok_or_else(|| aborted(LedgerError::NotFound))?;
                let updated = patch.apply(&existing).map_err(aborted)?;
                if updated.name != existing.name && tx.category_references(id)? > 0 {
                    return Err(aborted(ValidationError::new(
                        "name",
                        "Category name cannot change while collected items reference it.",
                    )));
                }
                tx.put_category(&updated)?;
                Ok(updated)
            })
            .inspect_err(|e| log_rejection("update_category", e))?;

        info!(category = %category.id, price = %category.base_price_per_kg, "category updated");
        Ok(category)
    }

    /// Deletes a category no item references.
    pub fn delete_category(&self, caller: &Caller, id: CategoryId) -> Result<(), LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("delete_category", e))?;

        self.store
            .atomically(|tx| tx.delete_category(id)?.ok_or_else(|| aborted(LedgerError::NotFound)))
            .inspect_err(|e| log_rejection("delete_category", e))?;

        info!(category = %id, "category deleted");
        Ok(())
    }

    /// Creates every seed category whose name is not taken yet.
    pub fn seed_categories(&self, caller: &Caller, seeds: &[SeedCategory]) -> Result<SeedOutcome, LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("seed_categories", e))?;
        let mut outcome = SeedOutcome::default();

        for seed in seeds {
            if self.store.category_by_name(seed.name.trim())?.is_some() {
                outcome.existing.push(seed.name.clone());
                continue;
            }
            self.create_category(caller, CategoryDraft::new(seed.name.clone(), seed.base_price_per_kg))?;
            outcome.created.push(seed.name.clone());
        }
        Ok(outcome)
    }

    // SUPPLIERS

    pub fn list_suppliers(&self, caller: &Caller) -> Result<Vec<Supplier>, LedgerError> {
        if caller.actor().is_none() {
            return Ok(Vec::new());
        }
        let mut suppliers = self.store.suppliers()?;
        suppliers.sort_by(|a, b| a.supplier_name.cmp(&b.supplier_name).then(a.id.cmp(&b.id)));
        Ok(suppliers)
    }

    pub fn supplier(&self, caller: &Caller, id: SupplierId) -> Result<Supplier, LedgerError> {
        if caller.actor().is_none() {
            return Err(LedgerError::NotFound);
        }
        self.store.supplier(id)?.ok_or(LedgerError::NotFound)
    }

    pub fn create_supplier(&self, caller: &Caller, draft: SupplierDraft) -> Result<Supplier, LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("create_supplier", e))?;
        let id = SupplierId(self.store.next_id()?);
        let supplier = draft
            .finalise(id)
            .map_err(LedgerError::from)
            .inspect_err(|e| log_rejection("create_supplier", e))?;

        self.store
            .atomically(|tx| tx.put_supplier(&supplier))
            .inspect_err(|e| log_rejection("create_supplier", e))?;

        info!(supplier = %supplier.id, name = %supplier.supplier_name, "supplier created");
        Ok(supplier)
    }

    pub fn update_supplier(
        &self,
        caller: &Caller,
        id: SupplierId,
        patch: SupplierPatch,
    ) -> Result<Supplier, LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("update_supplier", e))?;

        let supplier = self
            .store
            .atomically(|tx| {
                let existing = tx.supplier(id)?.ok_or_else(|| aborted(LedgerError::NotFound))?;
                let updated = patch.apply(&existing).map_err(aborted)?;
                tx.put_supplier(&updated)?;
                Ok(updated)
            })
            .inspect_err(|e| log_rejection("update_supplier", e))?;

        info!(supplier = %supplier.id, "supplier updated");
        Ok(supplier)
    }

    /// Deletes a supplier; items it supplied are kept with no supplier.
    pub fn delete_supplier(&self, caller: &Caller, id: SupplierId) -> Result<(), LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("delete_supplier", e))?;

        self.store
            .atomically(|tx| tx.delete_supplier(id)?.ok_or_else(|| aborted(LedgerError::NotFound)))
            .inspect_err(|e| log_rejection("delete_supplier", e))?;

        info!(supplier = %id, "supplier deleted");
        Ok(())
    }

    // ACTORS

    /// Self-registration. The new actor is always a collector.
    pub fn register_actor(&self, draft: ActorDraft) -> Result<ActorRecord, LedgerError> {
        self.insert_actor(draft, Role::Collector)
    }

    /// Out-of-band provisioning of a privileged account.
    pub fn provision_admin(&self, draft: ActorDraft) -> Result<ActorRecord, LedgerError> {
        self.insert_actor(draft, Role::Admin)
    }

    fn insert_actor(&self, draft: ActorDraft, role: Role) -> Result<ActorRecord, LedgerError> {
        draft
            .validate()
            .map_err(LedgerError::from)
            .inspect_err(|e| log_rejection("register_actor", e))?;
        let record = ActorRecord {
            id: ActorId(self.store.next_id()?),
            username: draft.username.trim().to_string(),
            email: draft.email.filter(|e| !e.is_empty()),
            role,
            created_at: TimeStamp::new(),
        };

        self.store
            .atomically(|tx| tx.put_actor(&record))
            .inspect_err(|e| log_rejection("register_actor", e))?;

        info!(actor = %record.id, role = record.role.as_str(), "actor registered");
        Ok(record)
    }

    /// An actor's own record, or any record for a privileged caller.
    pub fn actor(&self, caller: &Caller, id: ActorId) -> Result<ActorRecord, LedgerError> {
        let visible = caller
            .actor()
            .is_some_and(|actor| actor.is_privileged() || actor.id == id);
        if !visible {
            return Err(LedgerError::NotFound);
        }
        self.store.actor(id)?.ok_or(LedgerError::NotFound)
    }

    pub fn list_actors(&self, caller: &Caller) -> Result<Vec<ActorRecord>, LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("list_actors", e))?;
        let mut actors = self.store.actors()?;
        actors.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(actors)
    }

    /// Deletes an actor. Their items survive without an owning collector.
    pub fn delete_actor(&self, caller: &Caller, id: ActorId) -> Result<(), LedgerError> {
        require_privileged(caller).inspect_err(|e| log_rejection("delete_actor", e))?;

        let (_, orphaned) = self
            .store
            .atomically(|tx| tx.delete_actor(id)?.ok_or_else(|| aborted(LedgerError::NotFound)))
            .inspect_err(|e| log_rejection("delete_actor", e))?;

        info!(actor = %id, orphaned, "actor deleted");
        Ok(())
    }

    // ITEMS

    /// Items visible to the caller, newest collection date first.
    pub fn list_items(&self, caller: &Caller) -> Result<Vec<CollectedItem>, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        if scope == AccessScope::Nothing {
            return Ok(Vec::new());
        }
        let mut items: Vec<_> = self
            .store
            .items()?
            .into_iter()
            .filter(|item| scope.admits_item(item))
            .collect();
        items.sort_by_key(|item| (Reverse(item.date_collected), Reverse(item.created_at)));
        Ok(items)
    }

    pub fn item(&self, caller: &Caller, id: ItemId) -> Result<CollectedItem, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        let item = self.store.item(id)?.ok_or(LedgerError::NotFound)?;
        scope.require(scope.admits_item(&item))?;
        Ok(item)
    }

    /// An item with its category and supplier names resolved.
    pub fn item_detail(&self, caller: &Caller, id: ItemId) -> Result<ItemDetail, LedgerError> {
        let item = self.item(caller, id)?;
        let category_detail = self
            .store
            .category(item.category)?
            .ok_or(LedgerError::NotFound)?
            .name;
        let supplier_detail = match item.supplier {
            Some(supplier) => self.store.supplier(supplier)?.map(|s| s.supplier_name),
            None => None,
        };
        Ok(ItemDetail {
            item,
            category_detail,
            supplier_detail,
        })
    }

    /// Records a collected item owned by the caller, stamping its estimated value.
    pub fn create_item(&self, caller: &Caller, draft: ItemDraft) -> Result<CollectedItem, LedgerError> {
        let collector = require_authenticated(caller).inspect_err(|e| log_rejection("create_item", e))?;
        let id = ItemId(self.store.next_id()?);

        let item = self
            .store
            .atomically(|tx| {
                let category = tx
                    .category(draft.category)?
                    .ok_or_else(|| aborted(ValidationError::new("category", "Invalid category.")))?;
                let item = draft.finalise(id, &category, collector).map_err(aborted)?;
                tx.put_item(&item)?;
                Ok(item)
            })
            .inspect_err(|e| log_rejection("create_item", e))?;

        info!(
            item = %item.id,
            collector = %collector,
            weight_kg = %item.weight_kg,
            condition = %item.condition,
            estimated_value = %item.estimated_value,
            "item collected"
        );
        Ok(item)
    }

    /// Applies a partial update, re-stamping the value when category, weight or condition change.
    pub fn update_item(
        &self,
        caller: &Caller,
        id: ItemId,
        patch: ItemPatch,
    ) -> Result<CollectedItem, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        require_authenticated(caller).inspect_err(|e| log_rejection("update_item", e))?;

        let item = self
            .store
            .atomically(|tx| {
                let existing = scoped_item(tx, scope, id)?;
                let category = tx
                    .category(patch.target_category(&existing))?
                    .ok_or_else(|| aborted(ValidationError::new("category", "Invalid category.")))?;
                let updated = patch.apply(&existing, &category).map_err(aborted)?;
                tx.put_item(&updated)?;
                Ok(updated)
            })
            .inspect_err(|e| log_rejection("update_item", e))?;

        info!(item = %item.id, estimated_value = %item.estimated_value, "item updated");
        Ok(item)
    }

    /// Deletes an item and, with it, every transaction selling it.
    pub fn delete_item(&self, caller: &Caller, id: ItemId) -> Result<(), LedgerError> {
        let scope = AccessScope::for_caller(caller);
        require_authenticated(caller).inspect_err(|e| log_rejection("delete_item", e))?;

        let cascaded = self
            .store
            .atomically(|tx| {
                scoped_item(tx, scope, id)?;
                let (_, cascaded) = tx.delete_item(id)?.ok_or_else(|| aborted(LedgerError::NotFound))?;
                Ok(cascaded)
            })
            .inspect_err(|e| log_rejection("delete_item", e))?;

        info!(item = %id, transactions = cascaded, "item deleted");
        Ok(())
    }

    /// Value of an item at its category's current price. Nothing is persisted.
    pub fn estimate_item_value(&self, caller: &Caller, id: ItemId) -> Result<Money, LedgerError> {
        let item = self.item(caller, id)?;
        let category = self.store.category(item.category)?.ok_or(LedgerError::NotFound)?;
        Ok(item.current_estimate(&category)?)
    }

    // TRANSACTIONS

    /// Transactions whose item is visible to the caller, newest first.
    pub fn list_transactions(&self, caller: &Caller) -> Result<Vec<Transaction>, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        if scope == AccessScope::Nothing {
            return Ok(Vec::new());
        }
        let mut visible = Vec::new();
        for transaction in self.store.transactions()? {
            let Some(item) = self.store.item(transaction.item)? else {
                continue;
            };
            if scope.admits_transaction(&transaction, &item) {
                visible.push(transaction);
            }
        }
        visible.sort_by_key(|t| Reverse(t.created_at));
        Ok(visible)
    }

    pub fn transaction(&self, caller: &Caller, id: TransactionId) -> Result<Transaction, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        let transaction = self.store.transaction(id)?.ok_or(LedgerError::NotFound)?;
        let item = self.store.item(transaction.item)?.ok_or(LedgerError::NotFound)?;
        scope.require(scope.admits_transaction(&transaction, &item))?;
        Ok(transaction)
    }

    pub fn create_transaction(
        &self,
        caller: &Caller,
        draft: TransactionDraft,
    ) -> Result<Transaction, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        require_authenticated(caller).inspect_err(|e| log_rejection("create_transaction", e))?;
        let id = TransactionId(self.store.next_id()?);

        let transaction = self
            .store
            .atomically(|tx| {
                sellable_item(tx, scope, draft.item)?;
                let transaction = draft.finalise(id).map_err(aborted)?;
                tx.put_transaction(&transaction)?;
                Ok(transaction)
            })
            .inspect_err(|e| log_rejection("create_transaction", e))?;

        info!(
            transaction = %transaction.id,
            item = %transaction.item,
            status = %transaction.status,
            sale_price = %transaction.sale_price,
            "transaction created"
        );
        Ok(transaction)
    }

    /// Merges the patch over the stored transaction and validates the result.
    pub fn update_transaction(
        &self,
        caller: &Caller,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, LedgerError> {
        let scope = AccessScope::for_caller(caller);
        require_authenticated(caller).inspect_err(|e| log_rejection("update_transaction", e))?;

        let (previous, transaction) = self
            .store
            .atomically(|tx| {
                let existing = scoped_transaction(tx, scope, id)?;
                if let Some(item) = patch.item.filter(|item| *item != existing.item) {
                    sellable_item(tx, scope, item)?;
                }
                let updated = patch.apply(&existing).map_err(aborted)?;
                tx.put_transaction(&updated)?;
                Ok((existing.status, updated))
            })
            .inspect_err(|e| log_rejection("update_transaction", e))?;

        match (previous, transaction.status) {
            (SaleStatus::Stocked, SaleStatus::Sold) => {
                info!(transaction = %id, date_sold = ?transaction.date_sold, "transaction sold")
            }
            (SaleStatus::Sold, SaleStatus::Stocked) => {
                info!(transaction = %id, "transaction returned to stock")
            }
            _ => info!(transaction = %id, "transaction updated"),
        }
        Ok(transaction)
    }

    pub fn delete_transaction(&self, caller: &Caller, id: TransactionId) -> Result<(), LedgerError> {
        let scope = AccessScope::for_caller(caller);
        require_authenticated(caller).inspect_err(|e| log_rejection("delete_transaction", e))?;

        self.store
            .atomically(|tx| {
                scoped_transaction(tx, scope, id)?;
                tx.delete_transaction(id)?.ok_or_else(|| aborted(LedgerError::NotFound))
            })
            .inspect_err(|e| log_rejection("delete_transaction", e))?;

        info!(transaction = %id, "transaction deleted");
        Ok(())
    }
}

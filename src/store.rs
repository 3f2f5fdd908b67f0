//! Persistence on top of a single sled tree.
//!
//! Records are CBOR-encoded under `"<kind>/" ++ id.to_be_bytes()`. Link records
//! (`category-items/`, `supplier-items/`, `actor-items/`, `item-transactions/`)
//! hold the ids that reference a record, so that protect, set-null and cascade
//! rules can be enforced inside one sled transaction without scanning.
use super::actor::ActorRecord;
use super::catalog::Category;
use super::error::{LedgerError, ValidationError};
use super::item::CollectedItem;
use super::supplier::Supplier;
use super::transaction::Transaction;
use super::types::{ActorId, CategoryId, ItemId, SupplierId, TransactionId};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use std::path::Path;
use std::sync::Arc;

const CATEGORY: &[u8] = b"category/";
const CATEGORY_NAME: &[u8] = b"category-name/";
const CATEGORY_ITEMS: &[u8] = b"category-items/";
const SUPPLIER: &[u8] = b"supplier/";
const SUPPLIER_ITEMS: &[u8] = b"supplier-items/";
const ITEM: &[u8] = b"item/";
const ITEM_TRANSACTIONS: &[u8] = b"item-transactions/";
const TRANSACTION: &[u8] = b"transaction/";
const ACTOR: &[u8] = b"actor/";
const ACTOR_NAME: &[u8] = b"actor-name/";
const ACTOR_ITEMS: &[u8] = b"actor-items/";

pub type TxResult<T> = ConflictableTransactionResult<T, LedgerError>;

/// Turns a domain error into a transaction abort.
pub(crate) fn aborted<E: Into<LedgerError>>(err: E) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(err.into())
}

fn id_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn name_key(prefix: &[u8], name: &str) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}

fn decode<T>(bytes: &[u8]) -> Result<T, LedgerError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, LedgerError> {
    Ok(minicbor::to_vec(value)?)
}

fn decode_id(bytes: &[u8]) -> Result<u64, LedgerError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LedgerError::Encoding("index entry must be 8 bytes".into()))?;
    Ok(u64::from_be_bytes(raw))
}

#[derive(Clone)]
pub struct Store {
    db: Arc<sled::Db>,
}

/// View of the store inside one atomic unit of work.
pub struct StoreTx<'a> {
    tree: &'a TransactionalTree,
}

impl Store {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }

    /// Fresh identifier, unique for the life of the database and never zero.
    pub fn next_id(&self) -> Result<u64, LedgerError> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Runs `work` as one serialisable transaction. `work` may be re-run on conflict.
    pub fn atomically<A, F>(&self, work: F) -> Result<A, LedgerError>
    where
        F: Fn(&StoreTx<'_>) -> TxResult<A>,
    {
        Ok(self.db.transaction(|tree| work(&StoreTx { tree }))?)
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }

    fn get<T>(&self, prefix: &[u8], id: u64) -> Result<Option<T>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        self.db
            .get(id_key(prefix, id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn scan<T>(&self, prefix: &[u8]) -> Result<Vec<T>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        self.db
            .scan_prefix(prefix)
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    pub fn category(&self, id: CategoryId) -> Result<Option<Category>, LedgerError> {
        self.get(CATEGORY, id.0)
    }

    pub fn category_by_name(&self, name: &str) -> Result<Option<Category>, LedgerError> {
        match self.db.get(name_key(CATEGORY_NAME, name))? {
            Some(id) => self.category(CategoryId(decode_id(&id)?)),
            None => Ok(None),
        }
    }

    pub fn categories(&self) -> Result<Vec<Category>, LedgerError> {
        self.scan(CATEGORY)
    }

    pub fn supplier(&self, id: SupplierId) -> Result<Option<Supplier>, LedgerError> {
        self.get(SUPPLIER, id.0)
    }

    pub fn suppliers(&self) -> Result<Vec<Supplier>, LedgerError> {
        self.scan(SUPPLIER)
    }

    pub fn item(&self, id: ItemId) -> Result<Option<CollectedItem>, LedgerError> {
        self.get(ITEM, id.0)
    }

    pub fn items(&self) -> Result<Vec<CollectedItem>, LedgerError> {
        self.scan(ITEM)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        self.get(TRANSACTION, id.0)
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        self.scan(TRANSACTION)
    }

    pub fn actor(&self, id: ActorId) -> Result<Option<ActorRecord>, LedgerError> {
        self.get(ACTOR, id.0)
    }

    pub fn actors(&self) -> Result<Vec<ActorRecord>, LedgerError> {
        self.scan(ACTOR)
    }
}

impl StoreTx<'_> {
    fn get<T>(&self, prefix: &[u8], id: u64) -> TxResult<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.tree.get(id_key(prefix, id))? {
            Some(bytes) => decode(&bytes).map(Some).map_err(aborted),
            None => Ok(None),
        }
    }

    fn put<T: minicbor::Encode<()>>(&self, prefix: &[u8], id: u64, value: &T) -> TxResult<()> {
        let bytes = encode(value).map_err(aborted)?;
        self.tree.insert(id_key(prefix, id), bytes)?;
        Ok(())
    }

    fn remove(&self, prefix: &[u8], id: u64) -> TxResult<()> {
        self.tree.remove(id_key(prefix, id))?;
        Ok(())
    }

    fn links(&self, prefix: &[u8], id: u64) -> TxResult<Vec<u64>> {
        Ok(self.get::<Vec<u64>>(prefix, id)?.unwrap_or_default())
    }

    fn link(&self, prefix: &[u8], id: u64, member: u64) -> TxResult<()> {
        let mut members = self.links(prefix, id)?;
        if let Err(pos) = members.binary_search(&member) {
            members.insert(pos, member);
            self.put(prefix, id, &members)?;
        }
        Ok(())
    }

    fn unlink(&self, prefix: &[u8], id: u64, member: u64) -> TxResult<()> {
        let mut members = self.links(prefix, id)?;
        if let Ok(pos) = members.binary_search(&member) {
            members.remove(pos);
            if members.is_empty() {
                self.remove(prefix, id)?;
            } else {
                self.put(prefix, id, &members)?;
            }
        }
        Ok(())
    }

    // Keeps a `from -> to` link in step with an optional reference changing.
    fn relink(&self, prefix: &[u8], from: Option<u64>, to: Option<u64>, member: u64) -> TxResult<()> {
        if from == to {
            return Ok(());
        }
        if let Some(old) = from {
            self.unlink(prefix, old, member)?;
        }
        if let Some(new) = to {
            self.link(prefix, new, member)?;
        }
        Ok(())
    }

    // Points the unique name index at `id`, releasing `old` when renaming.
    fn claim_name(
        &self,
        prefix: &[u8],
        old: Option<&str>,
        new: &str,
        id: u64,
        field: &'static str,
        message: &str,
    ) -> TxResult<()> {
        if old == Some(new) {
            return Ok(());
        }
        let key = name_key(prefix, new);
        if let Some(holder) = self.tree.get(&key)? {
            if decode_id(&holder).map_err(aborted)? != id {
                return Err(aborted(ValidationError::new(field, message)));
            }
        }
        if let Some(old) = old {
            self.tree.remove(name_key(prefix, old))?;
        }
        self.tree.insert(key, id.to_be_bytes().to_vec())?;
        Ok(())
    }

    pub fn category(&self, id: CategoryId) -> TxResult<Option<Category>> {
        self.get(CATEGORY, id.0)
    }

    /// Inserts or replaces a category, enforcing name uniqueness.
    pub fn put_category(&self, category: &Category) -> TxResult<()> {
        let existing = self.category(category.id)?;
        self.claim_name(
            CATEGORY_NAME,
            existing.as_ref().map(|c| c.name.as_str()),
            &category.name,
            category.id.0,
            "name",
            "item category with this name already exists.",
        )?;
        self.put(CATEGORY, category.id.0, category)
    }

    /// Number of items referencing the category.
    pub fn category_references(&self, id: CategoryId) -> TxResult<usize> {
        Ok(self.links(CATEGORY_ITEMS, id.0)?.len())
    }

    /// Removes a category. Fails while any item still references it.
    pub fn delete_category(&self, id: CategoryId) -> TxResult<Option<Category>> {
        let Some(category) = self.category(id)? else {
            return Ok(None);
        };
        let references = self.category_references(id)?;
        if references > 0 {
            return Err(aborted(LedgerError::ReferentialIntegrity {
                entity: "category",
                id: id.0,
                references,
            }));
        }
        self.tree.remove(name_key(CATEGORY_NAME, &category.name))?;
        self.remove(CATEGORY, id.0)?;
        Ok(Some(category))
    }

    pub fn supplier(&self, id: SupplierId) -> TxResult<Option<Supplier>> {
        self.get(SUPPLIER, id.0)
    }

    pub fn put_supplier(&self, supplier: &Supplier) -> TxResult<()> {
        self.put(SUPPLIER, supplier.id.0, supplier)
    }

    /// Removes a supplier and detaches it from every item it supplied.
    pub fn delete_supplier(&self, id: SupplierId) -> TxResult<Option<Supplier>> {
        let Some(supplier) = self.supplier(id)? else {
            return Ok(None);
        };
        for item_id in self.links(SUPPLIER_ITEMS, id.0)? {
            if let Some(mut item) = self.item(ItemId(item_id))? {
                item.supplier = None;
                self.put(ITEM, item_id, &item)?;
            }
        }
        self.remove(SUPPLIER_ITEMS, id.0)?;
        self.remove(SUPPLIER, id.0)?;
        Ok(Some(supplier))
    }

    pub fn item(&self, id: ItemId) -> TxResult<Option<CollectedItem>> {
        self.get(ITEM, id.0)
    }

    /// Inserts or replaces an item. Its category and supplier must exist.
    pub fn put_item(&self, item: &CollectedItem) -> TxResult<()> {
        if self.category(item.category)?.is_none() {
            return Err(aborted(ValidationError::new("category", "Invalid category.")));
        }
        if let Some(supplier) = item.supplier {
            if self.supplier(supplier)?.is_none() {
                return Err(aborted(ValidationError::new("source_supplier", "Invalid supplier.")));
            }
        }

        let existing = self.item(item.id)?;
        let member = item.id.0;
        self.relink(
            CATEGORY_ITEMS,
            existing.as_ref().map(|i| i.category.0),
            Some(item.category.0),
            member,
        )?;
        self.relink(
            SUPPLIER_ITEMS,
            existing.as_ref().and_then(|i| i.supplier).map(|s| s.0),
            item.supplier.map(|s| s.0),
            member,
        )?;
        self.relink(
            ACTOR_ITEMS,
            existing.as_ref().and_then(|i| i.collector).map(|a| a.0),
            item.collector.map(|a| a.0),
            member,
        )?;
        self.put(ITEM, member, item)
    }

    /// Removes an item together with every transaction selling it.
    pub fn delete_item(&self, id: ItemId) -> TxResult<Option<(CollectedItem, usize)>> {
        let Some(item) = self.item(id)? else {
            return Ok(None);
        };
        let transactions = self.links(ITEM_TRANSACTIONS, id.0)?;
        for tx_id in &transactions {
            self.remove(TRANSACTION, *tx_id)?;
        }
        self.remove(ITEM_TRANSACTIONS, id.0)?;
        self.relink(CATEGORY_ITEMS, Some(item.category.0), None, id.0)?;
        self.relink(SUPPLIER_ITEMS, item.supplier.map(|s| s.0), None, id.0)?;
        self.relink(ACTOR_ITEMS, item.collector.map(|a| a.0), None, id.0)?;
        self.remove(ITEM, id.0)?;
        Ok(Some((item, transactions.len())))
    }

    pub fn transaction(&self, id: TransactionId) -> TxResult<Option<Transaction>> {
        self.get(TRANSACTION, id.0)
    }

    /// Inserts or replaces a transaction. The item it sells must exist.
    pub fn put_transaction(&self, transaction: &Transaction) -> TxResult<()> {
        if self.item(transaction.item)?.is_none() {
            return Err(aborted(ValidationError::new("ewaste_item", "Invalid item.")));
        }
        let existing = self.transaction(transaction.id)?;
        self.relink(
            ITEM_TRANSACTIONS,
            existing.as_ref().map(|t| t.item.0),
            Some(transaction.item.0),
            transaction.id.0,
        )?;
        self.put(TRANSACTION, transaction.id.0, transaction)
    }

    pub fn delete_transaction(&self, id: TransactionId) -> TxResult<Option<Transaction>> {
        let Some(transaction) = self.transaction(id)? else {
            return Ok(None);
        };
        self.relink(ITEM_TRANSACTIONS, Some(transaction.item.0), None, id.0)?;
        self.remove(TRANSACTION, id.0)?;
        Ok(Some(transaction))
    }

    pub fn actor(&self, id: ActorId) -> TxResult<Option<ActorRecord>> {
        self.get(ACTOR, id.0)
    }

    pub fn put_actor(&self, actor: &ActorRecord) -> TxResult<()> {
        let existing = self.actor(actor.id)?;
        self.claim_name(
            ACTOR_NAME,
            existing.as_ref().map(|a| a.username.as_str()),
            &actor.username,
            actor.id.0,
            "username",
            "A user with that username already exists.",
        )?;
        self.put(ACTOR, actor.id.0, actor)
    }

    /// Removes an actor; the items they collected stay but lose their collector.
    pub fn delete_actor(&self, id: ActorId) -> TxResult<Option<(ActorRecord, usize)>> {
        let Some(actor) = self.actor(id)? else {
            return Ok(None);
        };
        let items = self.links(ACTOR_ITEMS, id.0)?;
        for item_id in &items {
            if let Some(mut item) = self.item(ItemId(*item_id))? {
                item.collector = None;
                self.put(ITEM, *item_id, &item)?;
            }
        }
        self.remove(ACTOR_ITEMS, id.0)?;
        self.tree.remove(name_key(ACTOR_NAME, &actor.username))?;
        self.remove(ACTOR, id.0)?;
        Ok(Some((actor, items.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CategoryDraft;
    use crate::item::ItemDraft;
    use crate::supplier::SupplierDraft;
    use crate::transaction::TransactionDraft;
    use crate::types::CalendarDate;
    use crate::valuation::Condition;
    use rust_decimal_macros::dec;

    fn temp_store() -> Store {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Store::new(Arc::new(db))
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let store = temp_store();
        let a = store.next_id().unwrap();
        let b = store.next_id().unwrap();
        assert!(a >= 1);
        assert!(b > a);
    }

    #[test]
    fn category_names_are_unique() {
        let store = temp_store();
        let first = CategoryDraft::new("RAM", dec!(7500)).finalise(CategoryId(1)).unwrap();
        let second = CategoryDraft::new("RAM", dec!(1)).finalise(CategoryId(2)).unwrap();

        store.atomically(|tx| tx.put_category(&first)).unwrap();
        let err = store.atomically(|tx| tx.put_category(&second)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ref v) if v.field == "name"));

        // renaming keeps the index in step
        let renamed = Category { name: "Memory".into(), ..first.clone() };
        store.atomically(|tx| tx.put_category(&renamed)).unwrap();
        store.atomically(|tx| tx.put_category(&second)).unwrap();
        assert_eq!(store.category_by_name("RAM").unwrap().unwrap().id, CategoryId(2));
    }

    #[test]
    fn item_links_drive_protect_set_null_and_cascade() {
        let store = temp_store();
        let category = CategoryDraft::new("Boards", dec!(100)).finalise(CategoryId(1)).unwrap();
        let supplier = SupplierDraft::new("Depot").finalise(SupplierId(2)).unwrap();
        let item = ItemDraft::new(category.id, dec!(1), Condition::Fair, CalendarDate::today())
            .set_supplier(supplier.id)
            .finalise(ItemId(3), &category, ActorId(9))
            .unwrap();
        let sale = TransactionDraft::new(item.id, dec!(50), "Buyer").finalise(TransactionId(4)).unwrap();

        store
            .atomically(|tx| {
                tx.put_category(&category)?;
                tx.put_supplier(&supplier)?;
                tx.put_item(&item)?;
                tx.put_transaction(&sale)
            })
            .unwrap();

        let err = store.atomically(|tx| tx.delete_category(category.id)).unwrap_err();
        assert!(matches!(err, LedgerError::ReferentialIntegrity { references: 1, .. }));

        store.atomically(|tx| tx.delete_supplier(supplier.id)).unwrap();
        assert_eq!(store.item(item.id).unwrap().unwrap().supplier, None);

        let (_, cascaded) = store.atomically(|tx| tx.delete_item(item.id)).unwrap().unwrap();
        assert_eq!(cascaded, 1);
        assert!(store.transaction(sale.id).unwrap().is_none());

        assert!(store.atomically(|tx| tx.delete_category(category.id)).unwrap().is_some());
    }

    #[test]
    fn item_requires_existing_category() {
        let store = temp_store();
        let category = CategoryDraft::new("Boards", dec!(100)).finalise(CategoryId(1)).unwrap();
        let item = ItemDraft::new(category.id, dec!(1), Condition::Fair, CalendarDate::today())
            .finalise(ItemId(3), &category, ActorId(9))
            .unwrap();
        let err = store.atomically(|tx| tx.put_item(&item)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ref v) if v.field == "category"));
    }
}

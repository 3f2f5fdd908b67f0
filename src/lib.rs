//! E-waste collection and resale ledger.
//!
//! Items are collected from suppliers, valued by category price, weight and
//! condition, and later sold. Collectors see only what they collected;
//! administrators see everything and can read the aggregate reports.

pub mod actor;
pub mod catalog;
pub mod config;
pub mod error;
pub mod item;
pub mod report;
pub mod scope;
pub mod service;
pub mod store;
pub mod supplier;
pub mod transaction;
pub mod types;
pub mod valuation;

pub use actor::{Actor, ActorDraft, ActorRecord, Caller, Role};
pub use catalog::{Category, CategoryDraft, CategoryPatch};
pub use config::{Config, SeedCategory};
pub use error::{LedgerError, ValidationError};
pub use item::{CollectedItem, ItemDetail, ItemDraft, ItemPatch};
pub use report::{DailyTotals, MonthlyTotals, ReportingAggregator, SupplierRank};
pub use scope::AccessScope;
pub use service::{LedgerService, SeedOutcome};
pub use store::Store;
pub use supplier::{Supplier, SupplierDraft, SupplierPatch};
pub use transaction::{SaleStatus, Transaction, TransactionDraft, TransactionPatch};
pub use types::{ActorId, CalendarDate, CategoryId, ItemId, Money, SupplierId, TimeStamp, TransactionId, Weight};
pub use valuation::{Condition, estimate};

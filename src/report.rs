//! Read-only rollups over collected items.
//!
//! Reports are privileged in full: a collector is refused outright rather than
//! given an owner-filtered view. Periods and suppliers without items report
//! zero totals.
use super::actor::Caller;
use super::error::LedgerError;
use super::item::CollectedItem;
use super::scope::require_privileged;
use super::service::LedgerService;
use super::store::Store;
use super::supplier::Supplier;
use super::types::{CalendarDate, MONEY_PLACES, SupplierId, WEIGHT_PLACES};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    pub date: CalendarDate,
    pub total_weight_kg: Decimal,
    pub total_estimated_value: Decimal,
    pub items_collected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyTotals {
    /// `YYYY-MM`
    pub month: String,
    pub total_weight_kg: Decimal,
    pub total_estimated_value: Decimal,
    pub items_collected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierRank {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub total_estimated_value: Decimal,
    pub item_count: u64,
}

#[derive(Debug, Clone, Copy)]
struct Totals {
    weight: Decimal,
    value: Decimal,
    count: u64,
}

impl Default for Totals {
    fn default() -> Self {
        Self {
            weight: Decimal::new(0, WEIGHT_PLACES),
            value: Decimal::new(0, MONEY_PLACES),
            count: 0,
        }
    }
}

impl Totals {
    fn add(&mut self, item: &CollectedItem) {
        self.weight += item.weight_kg.kilograms();
        self.value += item.estimated_value.amount();
        self.count += 1;
    }
}

pub fn daily_totals(items: &[CollectedItem], date: CalendarDate) -> DailyTotals {
    let mut totals = Totals::default();
    for item in items.iter().filter(|item| item.date_collected == date) {
        totals.add(item);
    }
    DailyTotals {
        date,
        total_weight_kg: totals.weight,
        total_estimated_value: totals.value,
        items_collected: totals.count,
    }
}

/// Per-month totals in ascending month order.
pub fn monthly_totals(items: &[CollectedItem]) -> Vec<MonthlyTotals> {
    let mut months: BTreeMap<String, Totals> = BTreeMap::new();
    for item in items {
        months.entry(item.date_collected.month_key()).or_default().add(item);
    }
    months
        .into_iter()
        .map(|(month, totals)| MonthlyTotals {
            month,
            total_weight_kg: totals.weight,
            total_estimated_value: totals.value,
            items_collected: totals.count,
        })
        .collect()
}

/// Every supplier with the value of the items it supplied, highest first.
/// Ties are broken by supplier name, then id.
pub fn supplier_ranking(suppliers: &[Supplier], items: &[CollectedItem]) -> Vec<SupplierRank> {
    let mut per_supplier: HashMap<SupplierId, Totals> = HashMap::new();
    for item in items {
        if let Some(supplier) = item.supplier {
            per_supplier.entry(supplier).or_default().add(item);
        }
    }

    let mut ranking: Vec<SupplierRank> = suppliers
        .iter()
        .map(|supplier| {
            let totals = per_supplier.get(&supplier.id).copied().unwrap_or_default();
            SupplierRank {
                supplier_id: supplier.id,
                supplier_name: supplier.supplier_name.clone(),
                total_estimated_value: totals.value,
                item_count: totals.count,
            }
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.total_estimated_value
            .cmp(&a.total_estimated_value)
            .then_with(|| a.supplier_name.cmp(&b.supplier_name))
            .then_with(|| a.supplier_id.cmp(&b.supplier_id))
    });
    ranking
}

/// Privileged entry point to the reports.
pub struct ReportingAggregator<'a> {
    store: &'a Store,
}

impl<'a> ReportingAggregator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn authorise(&self, caller: &Caller, report: &str) -> Result<(), LedgerError> {
        require_privileged(caller).inspect_err(|err| debug!(report, error = %err, "report refused"))
    }

    pub fn daily(&self, caller: &Caller, date: CalendarDate) -> Result<DailyTotals, LedgerError> {
        self.authorise(caller, "daily")?;
        Ok(daily_totals(&self.store.items()?, date))
    }

    pub fn monthly(&self, caller: &Caller) -> Result<Vec<MonthlyTotals>, LedgerError> {
        self.authorise(caller, "monthly")?;
        Ok(monthly_totals(&self.store.items()?))
    }

    pub fn supplier_ranking(&self, caller: &Caller) -> Result<Vec<SupplierRank>, LedgerError> {
        self.authorise(caller, "supplier_ranking")?;
        Ok(supplier_ranking(&self.store.suppliers()?, &self.store.items()?))
    }
}

impl LedgerService {
    pub fn reports(&self) -> ReportingAggregator<'_> {
        ReportingAggregator::new(self.store())
    }
}

//! Collected items and the value stamped on them.
//!
//! `estimated_value` has no input path: drafts and patches do not carry it, and
//! it is recomputed through the valuation engine whenever the category, weight
//! or condition of an item is written.
use super::catalog::Category;
use super::error::ValidationError;
use super::types::{ActorId, CalendarDate, CategoryId, ItemId, Money, SupplierId, TimeStamp, Weight};
use super::valuation::{self, Condition};
use rust_decimal::Decimal;
use serde::Serialize;

pub const WEIGHT_MAX_DIGITS: u32 = 10;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedItem {
    #[n(0)]
    pub id: ItemId,
    #[n(1)]
    pub category: CategoryId,
    #[n(2)]
    pub weight_kg: Weight,
    #[n(3)]
    pub condition: Condition,
    #[n(4)]
    pub supplier: Option<SupplierId>,
    #[n(5)]
    pub date_collected: CalendarDate,
    #[n(6)]
    pub estimated_value: Money,
    #[n(7)]
    pub collector: Option<ActorId>,
    #[n(8)]
    pub created_at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub category: CategoryId,
    pub weight_kg: Decimal,
    pub condition: Condition,
    pub supplier: Option<SupplierId>,
    pub date_collected: CalendarDate,
}

/// Partial update. `supplier: Some(None)` detaches the supplier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub category: Option<CategoryId>,
    pub weight_kg: Option<Decimal>,
    pub condition: Option<Condition>,
    pub supplier: Option<Option<SupplierId>>,
    pub date_collected: Option<CalendarDate>,
}

/// An item together with the names of what it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: CollectedItem,
    pub category_detail: String,
    pub supplier_detail: Option<String>,
}

fn validate_weight(weight: Decimal) -> Result<Weight, ValidationError> {
    Weight::new("weight_kg", weight, WEIGHT_MAX_DIGITS)
}

fn stamp(category: &Category, weight: Weight, condition: Condition) -> Result<Money, ValidationError> {
    valuation::estimate_money(category.base_price_per_kg, weight, condition)
}

impl ItemDraft {
    pub fn new(category: CategoryId, weight_kg: Decimal, condition: Condition, date_collected: CalendarDate) -> Self {
        Self {
            category,
            weight_kg,
            condition,
            supplier: None,
            date_collected,
        }
    }

    pub fn set_supplier(mut self, supplier: SupplierId) -> Self {
        self.supplier = Some(supplier);
        self
    }

    /// Builds the stored record, stamping its value from `category`.
    pub(crate) fn finalise(
        &self,
        id: ItemId,
        category: &Category,
        collector: ActorId,
    ) -> Result<CollectedItem, ValidationError> {
        debug_assert_eq!(category.id, self.category);
        let weight_kg = validate_weight(self.weight_kg)?;

        Ok(CollectedItem {
            id,
            category: category.id,
            weight_kg,
            condition: self.condition,
            supplier: self.supplier,
            date_collected: self.date_collected,
            estimated_value: stamp(category, weight_kg, self.condition)?,
            collector: Some(collector),
            created_at: TimeStamp::new(),
        })
    }
}

impl ItemPatch {
    pub fn set_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    pub fn set_weight(mut self, weight_kg: Decimal) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn set_supplier(mut self, supplier: Option<SupplierId>) -> Self {
        self.supplier = Some(supplier);
        self
    }

    pub fn set_date_collected(mut self, date: CalendarDate) -> Self {
        self.date_collected = Some(date);
        self
    }

    /// True when the patch writes a field the estimated value depends on.
    pub fn touches_valuation(&self) -> bool {
        self.category.is_some() || self.weight_kg.is_some() || self.condition.is_some()
    }

    /// Category the merged record will reference.
    pub fn target_category(&self, existing: &CollectedItem) -> CategoryId {
        self.category.unwrap_or(existing.category)
    }

    /// Merges the patch over `existing`. `category` must be the merged record's category.
    pub(crate) fn apply(
        &self,
        existing: &CollectedItem,
        category: &Category,
    ) -> Result<CollectedItem, ValidationError> {
        debug_assert_eq!(category.id, self.target_category(existing));
        let mut updated = existing.clone();

        updated.category = category.id;
        if let Some(weight) = self.weight_kg {
            updated.weight_kg = validate_weight(weight)?;
        }
        if let Some(condition) = self.condition {
            updated.condition = condition;
        }
        if let Some(supplier) = self.supplier {
            updated.supplier = supplier;
        }
        if let Some(date) = self.date_collected {
            updated.date_collected = date;
        }
        if self.touches_valuation() {
            updated.estimated_value = stamp(category, updated.weight_kg, updated.condition)?;
        }
        Ok(updated)
    }
}

impl CollectedItem {
    /// Value at the category's current price, without touching the stamped value.
    pub fn current_estimate(&self, category: &Category) -> Result<Money, ValidationError> {
        stamp(category, self.weight_kg, self.condition)
    }
}

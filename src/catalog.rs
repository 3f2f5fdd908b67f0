//! Item categories and their per-kilogram base price.
use super::error::ValidationError;
use super::types::{CategoryId, Money};
use rust_decimal::Decimal;
use serde::Serialize;

pub const NAME_MAX_LEN: usize = 100;
pub const BASE_PRICE_MAX_DIGITS: u32 = 10;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    #[n(0)]
    pub id: CategoryId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub base_price_per_kg: Money,
}

/// Fields for a new category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub base_price_per_kg: Decimal,
}

/// Partial update; `None` leaves the stored value as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub base_price_per_kg: Option<Decimal>,
}

pub(crate) fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "This field may not be blank."));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ValidationError::new(
            "name",
            format!("Ensure this field has no more than {NAME_MAX_LEN} characters."),
        ));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_price(price: Decimal) -> Result<Money, ValidationError> {
    Money::new("base_price_per_kg", price, BASE_PRICE_MAX_DIGITS)
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>, base_price_per_kg: Decimal) -> Self {
        Self {
            name: name.into(),
            base_price_per_kg,
        }
    }

    /// Checks the draft without assigning an id.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.finalise(CategoryId(0)).map(|_| ())
    }

    pub(crate) fn finalise(&self, id: CategoryId) -> Result<Category, ValidationError> {
        Ok(Category {
            id,
            name: validate_name(&self.name)?,
            base_price_per_kg: validate_price(self.base_price_per_kg)?,
        })
    }
}

impl CategoryPatch {
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_base_price(mut self, price: Decimal) -> Self {
        self.base_price_per_kg = Some(price);
        self
    }

    pub(crate) fn apply(&self, existing: &Category) -> Result<Category, ValidationError> {
        let mut updated = existing.clone();
        if let Some(name) = &self.name {
            updated.name = validate_name(name)?;
        }
        if let Some(price) = self.base_price_per_kg {
            updated.base_price_per_kg = validate_price(price)?;
        }
        Ok(updated)
    }
}

//! Valuation of collected items.
//!
//! The estimate is `base_price_per_kg * weight_kg * multiplier(condition)`,
//! rounded half-up to the cent. Conditions form a closed set; anything else is
//! rejected while parsing and can never reach [`estimate`].
use super::error::ValidationError;
use super::types::{MONEY_PLACES, Money, Weight, check_fixed};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[n(0)]
    Poor,
    #[n(1)]
    Fair,
    #[n(2)]
    Good,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Poor, Condition::Fair, Condition::Good];

    pub fn multiplier(&self) -> Decimal {
        match self {
            Condition::Poor => Decimal::new(80, 2),
            Condition::Fair => Decimal::new(90, 2),
            Condition::Good => Decimal::new(100, 2),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Poor => "poor",
            Condition::Fair => "fair",
            Condition::Good => "good",
        }
    }
}

impl FromStr for Condition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poor" => Ok(Condition::Poor),
            "fair" => Ok(Condition::Fair),
            "good" => Ok(Condition::Good),
            _ => Err(ValidationError::new("condition", "Invalid condition value.")),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated resale value of `weight_kg` of material in `condition`.
///
/// Fails on a negative base price or a non-positive weight. Midpoints round
/// away from zero, so `0.005` becomes `0.01`.
pub fn estimate(
    base_price_per_kg: Decimal,
    weight_kg: Decimal,
    condition: Condition,
) -> Result<Decimal, ValidationError> {
    if base_price_per_kg < Decimal::ZERO {
        return Err(ValidationError::new(
            "base_price_per_kg",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    if weight_kg <= Decimal::ZERO {
        return Err(ValidationError::new("weight_kg", "Ensure this value is greater than 0."));
    }

    let raw = base_price_per_kg
        .checked_mul(weight_kg)
        .and_then(|v| v.checked_mul(condition.multiplier()))
        .ok_or_else(|| ValidationError::new("weight_kg", "Estimated value is out of range."))?;

    let mut rounded = raw.round_dp_with_strategy(MONEY_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_PLACES);
    Ok(rounded)
}

/// Widest value the `estimated_value` column holds.
pub const ESTIMATED_VALUE_MAX_DIGITS: u32 = 12;

/// [`estimate`] over already-validated amounts, bounded to the stored column.
pub fn estimate_money(
    base_price_per_kg: Money,
    weight_kg: Weight,
    condition: Condition,
) -> Result<Money, ValidationError> {
    let value = estimate(base_price_per_kg.amount(), weight_kg.kilograms(), condition)?;
    check_fixed("estimated_value", value, ESTIMATED_VALUE_MAX_DIGITS, MONEY_PLACES).map(Money::from_rounded)
}

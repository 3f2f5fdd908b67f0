//! Sale records and the stocked/sold lifecycle.
//!
//! Status rules are evaluated on the merged view of the stored record and the
//! incoming request, never on the request alone:
//!
//! - a record that ends up `sold` must carry a `date_sold`;
//! - a record that ends up `stocked` loses its `date_sold` unless the same
//!   request supplies one.
//!
//! `sold -> stocked` is permitted and follows the second rule.
use super::error::ValidationError;
use super::types::{CalendarDate, ItemId, Money, TimeStamp, TransactionId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const SALE_PRICE_MAX_DIGITS: u32 = 12;
const BUYER_NAME_MAX_LEN: usize = 200;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    #[default]
    #[n(0)]
    Stocked,
    #[n(1)]
    Sold,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    #[n(0)]
    pub id: TransactionId,
    #[n(1)]
    pub item: ItemId,
    #[n(2)]
    pub sale_price: Money,
    #[n(3)]
    pub buyer_name: String,
    #[n(4)]
    pub status: SaleStatus,
    #[n(5)]
    pub date_sold: Option<CalendarDate>,
    #[n(6)]
    pub created_at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub item: ItemId,
    pub sale_price: Decimal,
    pub buyer_name: String,
    pub status: Option<SaleStatus>,
    pub date_sold: Option<CalendarDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    pub item: Option<ItemId>,
    pub sale_price: Option<Decimal>,
    pub buyer_name: Option<String>,
    pub status: Option<SaleStatus>,
    pub date_sold: Option<CalendarDate>,
}

/// Status and sale date as they will be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleState {
    pub status: SaleStatus,
    pub date_sold: Option<CalendarDate>,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Stocked => "stocked",
            SaleStatus::Sold => "sold",
        }
    }
}

impl FromStr for SaleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stocked" => Ok(SaleStatus::Stocked),
            "sold" => Ok(SaleStatus::Sold),
            other => Err(ValidationError::new(
                "status",
                format!("\"{other}\" is not a valid choice."),
            )),
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves the status fields of a write against what is already stored.
///
/// `stored` is `None` on create. `requested_*` are the values present in the
/// incoming request.
pub fn resolve_sale_state(
    stored: Option<SaleState>,
    requested_status: Option<SaleStatus>,
    requested_date: Option<CalendarDate>,
) -> Result<SaleState, ValidationError> {
    let status = requested_status
        .or(stored.map(|s| s.status))
        .unwrap_or_default();
    let date_sold = requested_date.or(stored.and_then(|s| s.date_sold));

    match status {
        SaleStatus::Sold if date_sold.is_none() => Err(ValidationError::new(
            "date_sold",
            "date_sold is required when status is 'sold'",
        )),
        SaleStatus::Sold => Ok(SaleState { status, date_sold }),
        SaleStatus::Stocked => Ok(SaleState {
            status,
            date_sold: requested_date,
        }),
    }
}

fn validate_price(price: Decimal) -> Result<Money, ValidationError> {
    Money::new("sale_price", price, SALE_PRICE_MAX_DIGITS)
}

fn validate_buyer(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("buyer_name", "This field may not be blank."));
    }
    if name.chars().count() > BUYER_NAME_MAX_LEN {
        return Err(ValidationError::new(
            "buyer_name",
            format!("Ensure this field has no more than {BUYER_NAME_MAX_LEN} characters."),
        ));
    }
    Ok(name.to_string())
}

impl TransactionDraft {
    pub fn new(item: ItemId, sale_price: Decimal, buyer_name: impl Into<String>) -> Self {
        Self {
            item,
            sale_price,
            buyer_name: buyer_name.into(),
            status: None,
            date_sold: None,
        }
    }

    pub fn set_status(mut self, status: SaleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn set_date_sold(mut self, date: CalendarDate) -> Self {
        self.date_sold = Some(date);
        self
    }

    pub(crate) fn finalise(&self, id: TransactionId) -> Result<Transaction, ValidationError> {
        let sale_price = validate_price(self.sale_price)?;
        let buyer_name = validate_buyer(&self.buyer_name)?;
        let state = resolve_sale_state(None, self.status, self.date_sold)?;

        Ok(Transaction {
            id,
            item: self.item,
            sale_price,
            buyer_name,
            status: state.status,
            date_sold: state.date_sold,
            created_at: TimeStamp::new(),
        })
    }
}

impl TransactionPatch {
    pub fn set_item(mut self, item: ItemId) -> Self {
        self.item = Some(item);
        self
    }

    pub fn set_sale_price(mut self, price: Decimal) -> Self {
        self.sale_price = Some(price);
        self
    }

    pub fn set_buyer_name(mut self, name: impl Into<String>) -> Self {
        self.buyer_name = Some(name.into());
        self
    }

    pub fn set_status(mut self, status: SaleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn set_date_sold(mut self, date: CalendarDate) -> Self {
        self.date_sold = Some(date);
        self
    }

    pub(crate) fn apply(&self, existing: &Transaction) -> Result<Transaction, ValidationError> {
        let mut updated = existing.clone();

        if let Some(item) = self.item {
            updated.item = item;
        }
        if let Some(price) = self.sale_price {
            updated.sale_price = validate_price(price)?;
        }
        if let Some(name) = &self.buyer_name {
            updated.buyer_name = validate_buyer(name)?;
        }
        let state = resolve_sale_state(Some(existing.sale_state()), self.status, self.date_sold)?;
        updated.status = state.status;
        updated.date_sold = state.date_sold;

        Ok(updated)
    }
}

impl Transaction {
    pub fn sale_state(&self) -> SaleState {
        SaleState {
            status: self.status,
            date_sold: self.date_sold,
        }
    }
}

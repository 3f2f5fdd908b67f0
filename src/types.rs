//! Value types shared by every record: fixed-point amounts, calendar dates,
//! timestamps and record identifiers.
use super::error::ValidationError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Fractional digits kept for monetary amounts.
pub const MONEY_PLACES: u32 = 2;
/// Fractional digits kept for weights.
pub const WEIGHT_PLACES: u32 = 3;

/// Non-negative monetary amount held at two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

/// Strictly positive weight in kilograms held at three fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Weight(Decimal);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CalendarDate(NaiveDate);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeStamp(DateTime<Utc>);

// Rejects values carrying more fractional digits than the column holds, or more
// digits overall than `max_digits`.
pub(crate) fn check_fixed(
    field: &'static str,
    value: Decimal,
    max_digits: u32,
    places: u32,
) -> Result<Decimal, ValidationError> {
    let value = value.normalize();
    if value.scale() > places {
        return Err(ValidationError::new(
            field,
            format!("Ensure that there are no more than {places} decimal places."),
        ));
    }
    let whole_digits = value.trunc().abs().to_string().trim_start_matches('0').len() as u32;
    if whole_digits > max_digits - places {
        return Err(ValidationError::new(
            field,
            format!("Ensure that there are no more than {max_digits} digits in total."),
        ));
    }
    let mut value = value;
    value.rescale(places);
    Ok(value)
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Validates a caller-supplied amount for a column of `max_digits` digits.
    pub fn new(field: &'static str, value: Decimal, max_digits: u32) -> Result<Self, ValidationError> {
        if value < Decimal::ZERO {
            return Err(ValidationError::new(
                field,
                "Ensure this value is greater than or equal to 0.",
            ));
        }
        check_fixed(field, value, max_digits, MONEY_PLACES).map(Money)
    }

    pub fn parse(field: &'static str, raw: &str, max_digits: u32) -> Result<Self, ValidationError> {
        let value = raw
            .trim()
            .parse::<Decimal>()
            .map_err(|_| ValidationError::new(field, "A valid number is required."))?;
        Self::new(field, value, max_digits)
    }

    // Values produced by the valuation engine are already rounded to the cent.
    pub(crate) fn from_rounded(value: Decimal) -> Self {
        let mut value = value;
        value.rescale(MONEY_PLACES);
        Money(value)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl Weight {
    pub fn new(field: &'static str, value: Decimal, max_digits: u32) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::new(field, "Ensure this value is greater than 0."));
        }
        check_fixed(field, value, max_digits, WEIGHT_PLACES).map(Weight)
    }

    pub fn parse(field: &'static str, raw: &str, max_digits: u32) -> Result<Self, ValidationError> {
        let value = raw
            .trim()
            .parse::<Decimal>()
            .map_err(|_| ValidationError::new(field, "A valid number is required."))?;
        Self::new(field, value, max_digits)
    }

    pub fn kilograms(&self) -> Decimal {
        self.0
    }
}

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(CalendarDate)
    }

    pub fn today() -> Self {
        CalendarDate(Utc::now().date_naive())
    }

    /// Parses an ISO-8601 calendar date (`YYYY-MM-DD`).
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, ValidationError> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(CalendarDate)
            .map_err(|_| {
                ValidationError::new(field, "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.")
            })
    }

    /// Calendar month key in `YYYY-MM` form.
    pub fn month_key(&self) -> String {
        format!("{:04}-{:02}", self.0.year(), self.0.month())
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }

    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(value: NaiveDate) -> Self {
        CalendarDate(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.u64(self.0)?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                d.u64().map($name)
            }
        }
    };
}

record_id!(CategoryId);
record_id!(SupplierId);
record_id!(ItemId);
record_id!(TransactionId);
record_id!(
    /// Identity of an actor as established by the identity provider.
    ActorId
);

fn encode_decimal<W: minicbor::encode::Write>(
    value: &Decimal,
    e: &mut minicbor::Encoder<W>,
) -> Result<(), minicbor::encode::Error<W::Error>> {
    e.bytes(&value.serialize())?.ok()
}

fn decode_decimal(d: &mut minicbor::Decoder<'_>) -> Result<Decimal, minicbor::decode::Error> {
    let raw: [u8; 16] = d
        .bytes()?
        .try_into()
        .map_err(|_| minicbor::decode::Error::message("decimal must be 16 bytes"))?;
    Ok(Decimal::deserialize(raw))
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        encode_decimal(&self.0, e)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        decode_decimal(d).map(Money)
    }
}

impl<C> minicbor::Encode<C> for Weight {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        encode_decimal(&self.0, e)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Weight {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        decode_decimal(d).map(Weight)
    }
}

impl<C> minicbor::Encode<C> for CalendarDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for CalendarDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(CalendarDate)
            .ok_or(minicbor::decode::Error::message("day number out of range"))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

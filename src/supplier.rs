use super::error::ValidationError;
use super::types::SupplierId;
use serde::Serialize;

const FIELD_MAX_LEN: usize = 200;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Supplier {
    #[n(0)]
    pub id: SupplierId,
    #[n(1)]
    pub supplier_name: String,
    #[n(2)]
    pub contact: String,
    #[n(3)]
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplierDraft {
    pub supplier_name: String,
    pub contact: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplierPatch {
    pub supplier_name: Option<String>,
    pub contact: Option<String>,
    pub location: Option<String>,
}

fn bounded(field: &'static str, value: &str, required: bool) -> Result<String, ValidationError> {
    let value = value.trim();
    if required && value.is_empty() {
        return Err(ValidationError::new(field, "This field may not be blank."));
    }
    if value.chars().count() > FIELD_MAX_LEN {
        return Err(ValidationError::new(
            field,
            format!("Ensure this field has no more than {FIELD_MAX_LEN} characters."),
        ));
    }
    Ok(value.to_string())
}

impl SupplierDraft {
    pub fn new(supplier_name: impl Into<String>) -> Self {
        Self {
            supplier_name: supplier_name.into(),
            ..Self::default()
        }
    }

    pub fn set_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    pub fn set_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.finalise(SupplierId(0)).map(|_| ())
    }

    pub(crate) fn finalise(&self, id: SupplierId) -> Result<Supplier, ValidationError> {
        Ok(Supplier {
            id,
            supplier_name: bounded("supplier_name", &self.supplier_name, true)?,
            contact: bounded("contact", &self.contact, false)?,
            location: bounded("location", &self.location, false)?,
        })
    }
}

impl SupplierPatch {
    pub fn set_supplier_name(mut self, name: impl Into<String>) -> Self {
        self.supplier_name = Some(name.into());
        self
    }

    pub fn set_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn set_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub(crate) fn apply(&self, existing: &Supplier) -> Result<Supplier, ValidationError> {
        let mut updated = existing.clone();
        if let Some(name) = &self.supplier_name {
            updated.supplier_name = bounded("supplier_name", name, true)?;
        }
        if let Some(contact) = &self.contact {
            updated.contact = bounded("contact", contact, false)?;
        }
        if let Some(location) = &self.location {
            updated.location = bounded("location", location, false)?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplier_name_is_required() {
        assert!(SupplierDraft::new(" ").finalise(SupplierId(1)).is_err());

        let supplier = SupplierDraft::new("Local Supplier")
            .set_contact("0700-111-222")
            .set_location("Nairobi")
            .finalise(SupplierId(1))
            .unwrap();
        assert_eq!(supplier.location, "Nairobi");
    }

    #[test]
    fn contact_is_bounded() {
        let long = "x".repeat(FIELD_MAX_LEN + 1);
        let err = SupplierDraft::new("A").set_contact(long).finalise(SupplierId(1)).unwrap_err();
        assert_eq!(err.field, "contact");
    }
}

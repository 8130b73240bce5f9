//! Relationship registries: customers and partners
//!
//! Pure reference data. A customer owns orders, a partner owns loans;
//! deleting either cascades to what it owns (see the service layer).

use crate::error::LedgerError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub phone: String,
    #[n(3)]
    pub email: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub phone: String,
    #[n(3)]
    pub email: String,
}

/// Shared create/update fields for both registries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyAttrs {
    pub name: String,
    pub phone: String,
    pub email: String,
}

impl PartyAttrs {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("name is required"));
        }
        Ok(())
    }
}

impl Customer {
    pub fn from_attrs(id: String, attrs: PartyAttrs) -> Self {
        Self {
            id,
            name: attrs.name,
            phone: attrs.phone,
            email: attrs.email,
        }
    }

    pub fn apply_attrs(&mut self, attrs: PartyAttrs) {
        self.name = attrs.name;
        self.phone = attrs.phone;
        self.email = attrs.email;
    }
}

impl Partner {
    pub fn from_attrs(id: String, attrs: PartyAttrs) -> Self {
        Self {
            id,
            name: attrs.name,
            phone: attrs.phone,
            email: attrs.email,
        }
    }

    pub fn apply_attrs(&mut self, attrs: PartyAttrs) {
        self.name = attrs.name;
        self.phone = attrs.phone;
        self.email = attrs.email;
    }
}

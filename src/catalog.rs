//! Catalog records: products held in stock

use crate::error::LedgerError;

/// A stocked product. `price_per_unit` is in the smallest currency unit
/// (use integers for currency); `points_per_unit` is whole loyalty points.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Product {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub quantity: u32,
    #[n(3)]
    pub price_per_unit: u64,
    #[n(4)]
    pub points_per_unit: u64,
}

/// Caller-supplied product fields for create/update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductAttrs {
    pub name: String,
    pub quantity: u32,
    pub price_per_unit: u64,
    pub points_per_unit: u64,
}

impl ProductAttrs {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("product name is required"));
        }
        Ok(())
    }
}

impl Product {
    pub fn from_attrs(id: String, attrs: ProductAttrs) -> Self {
        Self {
            id,
            name: attrs.name,
            quantity: attrs.quantity,
            price_per_unit: attrs.price_per_unit,
            points_per_unit: attrs.points_per_unit,
        }
    }

    pub fn apply_attrs(&mut self, attrs: ProductAttrs) {
        self.name = attrs.name;
        self.quantity = attrs.quantity;
        self.price_per_unit = attrs.price_per_unit;
        self.points_per_unit = attrs.points_per_unit;
    }
}

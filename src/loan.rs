//! Partner loans: stock handed out outside the sales channel
//!
//! A loan snapshots the product's per-unit price/points the same way an
//! order line does, and it draws from the same stock pool.

use chrono::Utc;

use crate::time::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub partner_id: String,
    #[n(2)]
    pub product_id: String,
    #[n(3)]
    pub quantity: u32,
    #[n(4)]
    pub points_at_loan: u64,
    #[n(5)]
    pub price_at_loan: u64,
    #[n(6)]
    pub loan_date: TimeStamp<Utc>,
}

impl Loan {
    // report folds cannot fail, so extreme values clamp instead of wrapping
    pub fn points_value(&self) -> u64 {
        u64::from(self.quantity).saturating_mul(self.points_at_loan)
    }

    pub fn price_value(&self) -> u64 {
        u64::from(self.quantity).saturating_mul(self.price_at_loan)
    }
}

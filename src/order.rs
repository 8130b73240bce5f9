//! Order aggregate: the order record, its immutable lines and the
//! status lifecycle

use chrono::Utc;

use crate::error::LedgerError;
use crate::time::TimeStamp;

/// Order lifecycle. `Pending` is the only non-terminal state.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Delivered,
    #[n(2)]
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// The only legal moves are Pending -> Delivered and Pending -> Cancelled.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Delivered)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub customer_id: String,
    #[n(2)]
    pub delivery_date: TimeStamp<Utc>,
    #[n(3)]
    pub status: OrderStatus,
    #[n(4)]
    pub is_paid: bool,
    /// Persisted at creation. `None` only for rows imported from elsewhere;
    /// reporting resolves those through the line-snapshot fallback chain.
    #[n(5)]
    pub total_points: Option<u64>,
    #[n(6)]
    pub total_price: Option<u64>,
    /// Set exactly when the order becomes `Delivered`.
    #[n(7)]
    pub completed_at: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

/// A point-in-time snapshot of the product's per-unit price/points,
/// frozen when the order is created. Never rewritten.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub order_id: String,
    #[n(2)]
    pub product_id: String,
    #[n(3)]
    pub quantity: u32,
    #[n(4)]
    pub points_at_sale: u64,
    #[n(5)]
    pub price_at_sale: u64,
}

/// Requested line before the product snapshot is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftLine {
    pub product_id: String,
    pub quantity: u32,
}

/// Builder for a new order. Validation happens on `validate()`, called by
/// the service before anything is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDraft {
    customer_id: Option<String>,
    delivery_date: Option<TimeStamp<Utc>>,
    is_paid: bool,
    lines: Vec<DraftLine>,
}

impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn delivery_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.delivery_date = Some(date);
        self
    }

    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = is_paid;
        self
    }

    pub fn line(mut self, product_id: impl Into<String>, quantity: u32) -> Self {
        self.lines.push(DraftLine {
            product_id: product_id.into(),
            quantity,
        });
        self
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    /// Checks required fields and returns the customer id and delivery date.
    pub fn validate(&self) -> Result<(String, TimeStamp<Utc>), LedgerError> {
        let customer_id = self
            .customer_id
            .clone()
            .ok_or_else(|| LedgerError::validation("order customer is required"))?;
        let delivery_date = self
            .delivery_date
            .ok_or_else(|| LedgerError::validation("order delivery date is required"))?;
        if self.lines.is_empty() {
            return Err(LedgerError::validation("order needs at least one line"));
        }
        for line in &self.lines {
            if line.quantity == 0 {
                return Err(LedgerError::validation(
                    "order line quantity must be at least 1",
                ));
            }
        }
        Ok((customer_id, delivery_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_open_state() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        for from in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for to in [
                OrderStatus::Pending,
                OrderStatus::Delivered,
                OrderStatus::Cancelled,
            ] {
                assert!(!from.can_transition(to));
            }
        }
    }

    #[test]
    fn pending_transitions_to_both_terminals() {
        assert!(OrderStatus::Pending.can_transition(OrderStatus::Delivered));
        assert!(OrderStatus::Pending.can_transition(OrderStatus::Cancelled));
        assert!(!OrderStatus::Pending.can_transition(OrderStatus::Pending));
    }

    #[test]
    fn draft_rejects_zero_quantity_lines() {
        let draft = OrderDraft::new()
            .customer("cust_x")
            .delivery_date(TimeStamp::new())
            .line("prod_x", 0);

        assert!(matches!(
            draft.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn draft_rejects_missing_customer_and_empty_lines() {
        let no_customer = OrderDraft::new()
            .delivery_date(TimeStamp::new())
            .line("prod_x", 1);
        assert!(no_customer.validate().is_err());

        let no_lines = OrderDraft::new()
            .customer("cust_x")
            .delivery_date(TimeStamp::new());
        assert!(no_lines.validate().is_err());
    }
}

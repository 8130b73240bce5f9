//! Read-only projections for the presentation collaborator
//!
//! Views pair a record with its weak references resolved against the
//! live catalog. A dangling reference stays `None`; display layers fall
//! back the same way the aggregations do.

use crate::catalog::Product;
use crate::loan::Loan;
use crate::order::{Order, OrderLine};
use crate::party::{Customer, Partner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub line: OrderLine,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub order: Order,
    pub customer: Option<Customer>,
    pub lines: Vec<LineView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanView {
    pub loan: Loan,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerView {
    pub partner: Partner,
    pub loans: Vec<LoanView>,
}

//! Aggregation folds over already-fetched ledger records
//!
//! Everything here is pure and independently recomputable. A missing
//! product reference contributes zero, never an error, matching the
//! weak-reference display fallback used across the system.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::catalog::Product;
use crate::loan::Loan;
use crate::order::{Order, OrderLine, OrderStatus};
use crate::time::TimeStamp;

/// Default trailing window for the dashboard's delivered totals.
pub const DASHBOARD_WINDOW_DAYS: i64 = 60;

/// Per-unit (points, price) lookup against the live catalog, the last
/// step of the fallback chain.
pub type UnitLookup<'a> = &'a dyn Fn(&str) -> Option<(u64, u64)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub points: u64,
    pub price: u64,
}

impl Totals {
    // folds clamp on overflow; reports have no error channel
    fn add(&mut self, points: u64, price: u64) {
        self.points = self.points.saturating_add(points);
        self.price = self.price.saturating_add(price);
    }
}

/// Snapshot price with fallback: line snapshot, else current product
/// price, else zero. A zero snapshot means the product was already gone
/// when the line was written.
fn line_price(line: &OrderLine, lookup: UnitLookup) -> u64 {
    if line.price_at_sale > 0 {
        return line.price_at_sale;
    }
    lookup(&line.product_id).map(|(_, price)| price).unwrap_or(0)
}

fn line_points(line: &OrderLine, lookup: UnitLookup) -> u64 {
    if line.points_at_sale > 0 {
        return line.points_at_sale;
    }
    lookup(&line.product_id)
        .map(|(points, _)| points)
        .unwrap_or(0)
}

/// Resolve an order's value through the documented fallback chain:
/// persisted total, else recompute from line snapshots, else zero.
pub fn order_totals(order: &Order, lines: &[OrderLine], lookup: UnitLookup) -> Totals {
    let points = order.total_points.unwrap_or_else(|| {
        lines
            .iter()
            .map(|l| u64::from(l.quantity).saturating_mul(line_points(l, lookup)))
            .fold(0u64, u64::saturating_add)
    });
    let price = order.total_price.unwrap_or_else(|| {
        lines
            .iter()
            .map(|l| u64::from(l.quantity).saturating_mul(line_price(l, lookup)))
            .fold(0u64, u64::saturating_add)
    });
    Totals { points, price }
}

/// Pending totals over persisted order totals. Absent totals count zero
/// here; callers wanting the recompute fallback go through
/// [`order_totals`].
pub fn pending_totals(orders: &[Order]) -> Totals {
    let mut totals = Totals::default();
    for order in orders.iter().filter(|o| o.status == OrderStatus::Pending) {
        totals.add(
            order.total_points.unwrap_or(0),
            order.total_price.unwrap_or(0),
        );
    }
    totals
}

/// Delivered totals over the half-open window `[window_start, now)`,
/// compared on `completed_at`.
pub fn delivered_totals(
    orders: &[Order],
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Totals {
    let mut totals = Totals::default();
    for order in orders {
        if order.status != OrderStatus::Delivered {
            continue;
        }
        let Some(completed) = order.completed_at else {
            continue;
        };
        let completed = completed.to_datetime_utc();
        if completed >= window_start && completed < now {
            totals.add(
                order.total_points.unwrap_or(0),
                order.total_price.unwrap_or(0),
            );
        }
    }
    totals
}

/// One row of the monthly sales series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyRow {
    /// `"yyyy-mm"` bucket of `completed_at`.
    pub month: String,
    pub price: u64,
    pub points: u64,
}

/// Group delivered orders by calendar month of `completed_at`, summing
/// their value through the fallback chain. `range` is an inclusive pair
/// of month keys; `None` keeps every month. Rows come back sorted by
/// month key.
pub fn monthly_sales(
    orders: &[Order],
    lines_by_order: &HashMap<String, Vec<OrderLine>>,
    lookup: UnitLookup,
    range: Option<(&str, &str)>,
) -> Vec<MonthlyRow> {
    let mut buckets: BTreeMap<String, Totals> = BTreeMap::new();
    for order in orders {
        if order.status != OrderStatus::Delivered {
            continue;
        }
        let Some(completed) = order.completed_at else {
            continue;
        };
        let month = completed.month_key();
        if let Some((start, end)) = range {
            if month.as_str() < start || month.as_str() > end {
                continue;
            }
        }
        let lines = lines_by_order
            .get(&order.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let totals = order_totals(order, lines, lookup);
        buckets
            .entry(month)
            .or_default()
            .add(totals.points, totals.price);
    }
    buckets
        .into_iter()
        .map(|(month, totals)| MonthlyRow {
            month,
            price: totals.price,
            points: totals.points,
        })
        .collect()
}

/// Per-partner loan totals from the loan-time snapshots.
pub fn loan_totals_by_partner(loans: &[Loan]) -> BTreeMap<String, Totals> {
    let mut totals: BTreeMap<String, Totals> = BTreeMap::new();
    for loan in loans {
        totals
            .entry(loan.partner_id.clone())
            .or_default()
            .add(loan.points_value(), loan.price_value());
    }
    totals
}

// Flat report rows for the export collaborator. Rendering is not our
// problem; these carry everything a formatter needs.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub name: String,
    pub quantity: u32,
    pub price_per_unit: u64,
    pub points_per_unit: u64,
}

pub fn inventory_rows(products: &[Product]) -> Vec<InventoryRow> {
    products
        .iter()
        .map(|p| InventoryRow {
            name: p.name.clone(),
            quantity: p.quantity,
            price_per_unit: p.price_per_unit,
            points_per_unit: p.points_per_unit,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRow {
    pub partner: String,
    pub product: String,
    pub quantity: u32,
    pub points: u64,
    pub price: u64,
    pub loan_date: TimeStamp<Utc>,
}

/// Loan rows with display names resolved through weak references;
/// a dangling reference renders as `"unknown"`.
pub fn loan_rows(
    loans: &[Loan],
    partner_name: &dyn Fn(&str) -> Option<String>,
    product_name: &dyn Fn(&str) -> Option<String>,
) -> Vec<LoanRow> {
    loans
        .iter()
        .map(|loan| LoanRow {
            partner: partner_name(&loan.partner_id).unwrap_or_else(|| "unknown".to_string()),
            product: product_name(&loan.product_id).unwrap_or_else(|| "unknown".to_string()),
            quantity: loan.quantity,
            points: loan.points_value(),
            price: loan.price_value(),
            loan_date: loan.loan_date,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, status: OrderStatus, points: u64, price: u64) -> Order {
        Order {
            id: id.to_string(),
            customer_id: "cust_a".to_string(),
            delivery_date: TimeStamp::new(),
            status,
            is_paid: false,
            total_points: Some(points),
            total_price: Some(price),
            completed_at: None,
            created_at: TimeStamp::new(),
        }
    }

    #[test]
    fn pending_totals_ignore_terminal_orders() {
        let orders = vec![
            order("ord_a", OrderStatus::Pending, 10, 100),
            order("ord_b", OrderStatus::Pending, 5, 50),
            order("ord_c", OrderStatus::Delivered, 99, 999),
            order("ord_d", OrderStatus::Cancelled, 7, 70),
        ];

        let totals = pending_totals(&orders);
        assert_eq!(totals.points, 15);
        assert_eq!(totals.price, 150);
    }

    #[test]
    fn delivered_window_is_half_open() {
        let start = TimeStamp::new_with(2026, 1, 1, 0, 0, 0).to_datetime_utc();
        let now = TimeStamp::new_with(2026, 3, 1, 0, 0, 0).to_datetime_utc();

        let mut inside = order("ord_a", OrderStatus::Delivered, 1, 10);
        inside.completed_at = Some(TimeStamp::new_with(2026, 1, 1, 0, 0, 0));
        let mut at_end = order("ord_b", OrderStatus::Delivered, 2, 20);
        at_end.completed_at = Some(TimeStamp::new_with(2026, 3, 1, 0, 0, 0));
        let mut before = order("ord_c", OrderStatus::Delivered, 4, 40);
        before.completed_at = Some(TimeStamp::new_with(2025, 12, 31, 23, 59, 59));

        let totals = delivered_totals(&[inside, at_end, before], start, now);
        // window start is included, `now` is not
        assert_eq!(totals.price, 10);
        assert_eq!(totals.points, 1);
    }

    #[test]
    fn monthly_series_recomputes_absent_totals_from_snapshots() {
        let mut delivered = order("ord_a", OrderStatus::Delivered, 0, 0);
        delivered.total_points = None;
        delivered.total_price = None;
        delivered.completed_at = Some(TimeStamp::new_with(2026, 5, 10, 12, 0, 0));

        let lines = vec![OrderLine {
            id: "line_a".to_string(),
            order_id: "ord_a".to_string(),
            product_id: "prod_a".to_string(),
            quantity: 3,
            points_at_sale: 2,
            price_at_sale: 25,
        }];
        let mut lines_by_order = HashMap::new();
        lines_by_order.insert("ord_a".to_string(), lines);

        let lookup = |_: &str| None;
        let rows = monthly_sales(&[delivered], &lines_by_order, &lookup, None);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].month, "2026-05");
        assert_eq!(rows[0].price, 75);
        assert_eq!(rows[0].points, 6);
    }

    #[test]
    fn monthly_series_zero_snapshot_falls_back_to_live_product_then_zero() {
        let mut delivered = order("ord_a", OrderStatus::Delivered, 0, 0);
        delivered.total_price = None;
        delivered.total_points = None;
        delivered.completed_at = Some(TimeStamp::new_with(2026, 6, 1, 0, 0, 0));

        let lines = vec![
            OrderLine {
                id: "line_a".to_string(),
                order_id: "ord_a".to_string(),
                product_id: "prod_live".to_string(),
                quantity: 2,
                points_at_sale: 0,
                price_at_sale: 0,
            },
            OrderLine {
                id: "line_b".to_string(),
                order_id: "ord_a".to_string(),
                product_id: "prod_gone".to_string(),
                quantity: 5,
                points_at_sale: 0,
                price_at_sale: 0,
            },
        ];
        let mut lines_by_order = HashMap::new();
        lines_by_order.insert("ord_a".to_string(), lines);

        let lookup = |product_id: &str| {
            if product_id == "prod_live" {
                Some((3, 40))
            } else {
                None
            }
        };
        let rows = monthly_sales(&[delivered], &lines_by_order, &lookup, None);

        assert_eq!(rows[0].price, 80);
        assert_eq!(rows[0].points, 6);
    }

    #[test]
    fn monthly_range_filter_is_inclusive_on_month_keys() {
        let mut jan = order("ord_a", OrderStatus::Delivered, 1, 10);
        jan.completed_at = Some(TimeStamp::new_with(2026, 1, 15, 0, 0, 0));
        let mut mar = order("ord_b", OrderStatus::Delivered, 2, 20);
        mar.completed_at = Some(TimeStamp::new_with(2026, 3, 15, 0, 0, 0));
        let mut jun = order("ord_c", OrderStatus::Delivered, 3, 30);
        jun.completed_at = Some(TimeStamp::new_with(2026, 6, 15, 0, 0, 0));

        let lines_by_order = HashMap::new();
        let lookup = |_: &str| None;
        let rows = monthly_sales(
            &[jan, mar, jun],
            &lines_by_order,
            &lookup,
            Some(("2026-01", "2026-03")),
        );

        let months: Vec<&str> = rows.iter().map(|r| r.month.as_str()).collect();
        assert_eq!(months, vec!["2026-01", "2026-03"]);
    }

    #[test]
    fn loan_totals_group_by_partner_using_snapshots() {
        let loan = |partner: &str, qty: u32, points: u64, price: u64| Loan {
            id: crate::utils::new_loan_id().unwrap(),
            partner_id: partner.to_string(),
            product_id: "prod_a".to_string(),
            quantity: qty,
            points_at_loan: points,
            price_at_loan: price,
            loan_date: TimeStamp::new(),
        };

        let loans = vec![
            loan("ptnr_a", 2, 3, 10),
            loan("ptnr_a", 1, 3, 10),
            loan("ptnr_b", 4, 1, 5),
        ];

        let totals = loan_totals_by_partner(&loans);
        assert_eq!(totals["ptnr_a"].points, 9);
        assert_eq!(totals["ptnr_a"].price, 30);
        assert_eq!(totals["ptnr_b"].points, 4);
        assert_eq!(totals["ptnr_b"].price, 20);
    }
}

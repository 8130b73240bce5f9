//! Service layer API for ledger operations
//!
//! Every call takes the owning account explicitly. Anything touching
//! more than one record runs inside a single sled transaction, so the
//! guarded stock decrement, order creation and cascade deletes are
//! atomic: concurrent callers serialize and the losing side fails
//! cleanly instead of driving stock negative or leaving partial rows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, Transactional, abort};

use crate::catalog::{Product, ProductAttrs};
use crate::error::LedgerError;
use crate::loan::Loan;
use crate::order::{Order, OrderDraft, OrderLine, OrderStatus};
use crate::party::{Customer, Partner, PartyAttrs};
use crate::report::{
    self, DASHBOARD_WINDOW_DAYS, InventoryRow, LoanRow, MonthlyRow, Totals,
};
use crate::store::{
    AccountId, Store, account_prefix, decode_record, encode_record, get_record, line_key,
    order_lines_prefix, put_record, record_key, require_record, scan_keys, scan_records, unabort,
};
use crate::time::TimeStamp;
use crate::utils;
use crate::view::{LineView, LoanView, OrderView, PartnerView};

/// Dashboard numbers: open commitments plus recently delivered value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardTotals {
    pub pending: Totals,
    pub delivered_recent: Totals,
}

pub struct LedgerService {
    store: Store,
}

fn tx_encode<T: minicbor::Encode<()>>(
    record: &T,
) -> Result<Vec<u8>, ConflictableTransactionError<LedgerError>> {
    encode_record(record).map_err(ConflictableTransactionError::Abort)
}

fn tx_decode<'b, T: minicbor::Decode<'b, ()>>(
    bytes: &'b [u8],
) -> Result<T, ConflictableTransactionError<LedgerError>> {
    decode_record(bytes).map_err(ConflictableTransactionError::Abort)
}

impl LedgerService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, LedgerError> {
        Ok(Self {
            store: Store::new(instance)?,
        })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, LedgerError> {
        Ok(Self {
            store: Store::open(path)?,
        })
    }

    // CATALOG

    pub fn create_product(
        &self,
        account: &AccountId,
        attrs: ProductAttrs,
    ) -> Result<Product, LedgerError> {
        attrs.validate()?;
        let product = Product::from_attrs(utils::new_product_id()?, attrs);
        put_record(
            &self.store.products,
            &record_key(account, &product.id),
            &product,
        )?;
        Ok(product)
    }

    pub fn update_product(
        &self,
        account: &AccountId,
        product_id: &str,
        attrs: ProductAttrs,
    ) -> Result<Product, LedgerError> {
        attrs.validate()?;
        let key = record_key(account, product_id);
        let mut product: Product = require_record(&self.store.products, &key, product_id)?;
        product.apply_attrs(attrs);
        put_record(&self.store.products, &key, &product)?;
        Ok(product)
    }

    pub fn get_product(
        &self,
        account: &AccountId,
        product_id: &str,
    ) -> Result<Product, LedgerError> {
        require_record(
            &self.store.products,
            &record_key(account, product_id),
            product_id,
        )
    }

    pub fn list_products(&self, account: &AccountId) -> Result<Vec<Product>, LedgerError> {
        scan_records(&self.store.products, &account_prefix(account))
    }

    /// Deletion is blocked while any order line or loan still references
    /// the product, however old the order is.
    pub fn delete_product(&self, account: &AccountId, product_id: &str) -> Result<(), LedgerError> {
        let key = record_key(account, product_id);
        require_record::<Product>(&self.store.products, &key, product_id)?;

        let lines: Vec<OrderLine> =
            scan_records(&self.store.order_lines, &account_prefix(account))?;
        if lines.iter().any(|l| l.product_id == product_id) {
            return Err(LedgerError::Referenced(format!(
                "product {product_id} is referenced by order lines"
            )));
        }
        let loans: Vec<Loan> = scan_records(&self.store.loans, &account_prefix(account))?;
        if loans.iter().any(|l| l.product_id == product_id) {
            return Err(LedgerError::Referenced(format!(
                "product {product_id} is referenced by loans"
            )));
        }

        if self.store.products.remove(key)?.is_none() {
            return Err(LedgerError::not_found(product_id));
        }
        Ok(())
    }

    /// Guarded read-modify-write in one transaction: the quantity check
    /// and the decrement cannot be interleaved with another caller's.
    pub fn decrement_stock(
        &self,
        account: &AccountId,
        product_id: &str,
        amount: u32,
    ) -> Result<Product, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::validation("decrement amount must be at least 1"));
        }
        let key = record_key(account, product_id);
        let res = self.store.products.transaction(|products| {
            let Some(bytes) = products.get(key.as_slice())? else {
                return abort(LedgerError::not_found(product_id));
            };
            let mut product: Product = tx_decode(&bytes)?;
            if product.quantity < amount {
                return abort(LedgerError::InsufficientStock {
                    requested: amount,
                    available: product.quantity,
                });
            }
            product.quantity -= amount;
            products.insert(key.as_slice(), tx_encode(&product)?)?;
            Ok(product)
        });
        unabort(res)
    }

    // REGISTRIES

    pub fn create_customer(
        &self,
        account: &AccountId,
        attrs: PartyAttrs,
    ) -> Result<Customer, LedgerError> {
        attrs.validate()?;
        let customer = Customer::from_attrs(utils::new_customer_id()?, attrs);
        put_record(
            &self.store.customers,
            &record_key(account, &customer.id),
            &customer,
        )?;
        Ok(customer)
    }

    pub fn update_customer(
        &self,
        account: &AccountId,
        customer_id: &str,
        attrs: PartyAttrs,
    ) -> Result<Customer, LedgerError> {
        attrs.validate()?;
        let key = record_key(account, customer_id);
        let mut customer: Customer = require_record(&self.store.customers, &key, customer_id)?;
        customer.apply_attrs(attrs);
        put_record(&self.store.customers, &key, &customer)?;
        Ok(customer)
    }

    pub fn list_customers(&self, account: &AccountId) -> Result<Vec<Customer>, LedgerError> {
        scan_records(&self.store.customers, &account_prefix(account))
    }

    /// Removes the customer, its orders and all their lines in one
    /// transaction. The caller confirms upstream; here the cascade is
    /// unconditional.
    pub fn delete_customer(
        &self,
        account: &AccountId,
        customer_id: &str,
    ) -> Result<(), LedgerError> {
        let customer_key = record_key(account, customer_id);
        // Dependent keys are staged up front; sled transactions cannot
        // iterate. A row created for this customer between the scan and
        // the transaction survives with a dangling parent reference.
        let orders: Vec<Order> = scan_records(&self.store.orders, &account_prefix(account))?;
        let mut order_keys = Vec::new();
        let mut line_keys = Vec::new();
        for order in orders.iter().filter(|o| o.customer_id == customer_id) {
            order_keys.push(record_key(account, &order.id));
            line_keys.extend(scan_keys(
                &self.store.order_lines,
                &order_lines_prefix(account, &order.id),
            )?);
        }

        let res = (
            &self.store.customers,
            &self.store.orders,
            &self.store.order_lines,
        )
            .transaction(|(customers, orders, lines)| {
                if customers.remove(customer_key.as_slice())?.is_none() {
                    return abort(LedgerError::not_found(customer_id));
                }
                for key in &order_keys {
                    orders.remove(key.as_slice())?;
                }
                for key in &line_keys {
                    lines.remove(key.as_slice())?;
                }
                Ok(())
            });
        unabort(res)
    }

    pub fn create_partner(
        &self,
        account: &AccountId,
        attrs: PartyAttrs,
    ) -> Result<Partner, LedgerError> {
        attrs.validate()?;
        let partner = Partner::from_attrs(utils::new_partner_id()?, attrs);
        put_record(
            &self.store.partners,
            &record_key(account, &partner.id),
            &partner,
        )?;
        Ok(partner)
    }

    pub fn update_partner(
        &self,
        account: &AccountId,
        partner_id: &str,
        attrs: PartyAttrs,
    ) -> Result<Partner, LedgerError> {
        attrs.validate()?;
        let key = record_key(account, partner_id);
        let mut partner: Partner = require_record(&self.store.partners, &key, partner_id)?;
        partner.apply_attrs(attrs);
        put_record(&self.store.partners, &key, &partner)?;
        Ok(partner)
    }

    pub fn list_partners(&self, account: &AccountId) -> Result<Vec<Partner>, LedgerError> {
        scan_records(&self.store.partners, &account_prefix(account))
    }

    /// Cascade: the partner and all of its loans go in one transaction.
    pub fn delete_partner(&self, account: &AccountId, partner_id: &str) -> Result<(), LedgerError> {
        let partner_key = record_key(account, partner_id);
        // staged keys, same concurrent-creation window as delete_customer
        let loans: Vec<Loan> = scan_records(&self.store.loans, &account_prefix(account))?;
        let loan_keys: Vec<Vec<u8>> = loans
            .iter()
            .filter(|l| l.partner_id == partner_id)
            .map(|l| record_key(account, &l.id))
            .collect();

        let res = (&self.store.partners, &self.store.loans).transaction(|(partners, loans)| {
            if partners.remove(partner_key.as_slice())?.is_none() {
                return abort(LedgerError::not_found(partner_id));
            }
            for key in &loan_keys {
                loans.remove(key.as_slice())?;
            }
            Ok(())
        });
        unabort(res)
    }

    // ORDER LEDGER

    /// Creates the order and all of its lines atomically; a failure
    /// anywhere leaves nothing behind, so partial orders are never
    /// visible. Per-unit price/points are snapshotted from the catalog
    /// inside the same transaction; a line whose product is already gone
    /// snapshots zero and stays a weak reference.
    pub fn create_order(
        &self,
        account: &AccountId,
        draft: OrderDraft,
    ) -> Result<Order, LedgerError> {
        let (customer_id, delivery_date) = draft.validate()?;
        require_record::<Customer>(
            &self.store.customers,
            &record_key(account, &customer_id),
            &customer_id,
        )?;

        let order_id = utils::new_order_id()?;
        // ids are minted before the transaction; the closure may retry
        let line_ids: Vec<String> = draft
            .lines()
            .iter()
            .map(|_| utils::new_line_id())
            .collect::<Result<_, _>>()?;
        let created_at = TimeStamp::new();

        let res = (
            &self.store.orders,
            &self.store.order_lines,
            &self.store.products,
        )
            .transaction(|(orders, lines, products)| {
                let mut total_points = 0u64;
                let mut total_price = 0u64;
                let mut snapshots = Vec::with_capacity(draft.lines().len());

                for (draft_line, line_id) in draft.lines().iter().zip(&line_ids) {
                    let product_key = record_key(account, &draft_line.product_id);
                    let (points_at_sale, price_at_sale) =
                        match products.get(product_key.as_slice())? {
                            Some(bytes) => {
                                let product: Product = tx_decode(&bytes)?;
                                (product.points_per_unit, product.price_per_unit)
                            }
                            None => (0, 0),
                        };

                    let Some(points_sum) = u64::from(draft_line.quantity)
                        .checked_mul(points_at_sale)
                        .and_then(|v| total_points.checked_add(v))
                    else {
                        return abort(LedgerError::validation("order points total overflows"));
                    };
                    let Some(price_sum) = u64::from(draft_line.quantity)
                        .checked_mul(price_at_sale)
                        .and_then(|v| total_price.checked_add(v))
                    else {
                        return abort(LedgerError::validation("order price total overflows"));
                    };
                    total_points = points_sum;
                    total_price = price_sum;
                    snapshots.push(OrderLine {
                        id: line_id.clone(),
                        order_id: order_id.clone(),
                        product_id: draft_line.product_id.clone(),
                        quantity: draft_line.quantity,
                        points_at_sale,
                        price_at_sale,
                    });
                }

                let order = Order {
                    id: order_id.clone(),
                    customer_id: customer_id.clone(),
                    delivery_date,
                    status: OrderStatus::Pending,
                    is_paid: draft.is_paid(),
                    total_points: Some(total_points),
                    total_price: Some(total_price),
                    completed_at: None,
                    created_at,
                };

                orders.insert(record_key(account, &order_id).as_slice(), tx_encode(&order)?)?;
                for line in &snapshots {
                    lines.insert(
                        line_key(account, &order_id, &line.id).as_slice(),
                        tx_encode(line)?,
                    )?;
                }
                Ok(order)
            });
        unabort(res)
    }

    /// Pure flag flip, no stock effect.
    pub fn set_paid(
        &self,
        account: &AccountId,
        order_id: &str,
        paid: bool,
    ) -> Result<Order, LedgerError> {
        let key = record_key(account, order_id);
        let mut order: Order = require_record(&self.store.orders, &key, order_id)?;
        order.is_paid = paid;
        put_record(&self.store.orders, &key, &order)?;
        Ok(order)
    }

    pub fn get_order(&self, account: &AccountId, order_id: &str) -> Result<Order, LedgerError> {
        require_record(&self.store.orders, &record_key(account, order_id), order_id)
    }

    pub fn list_orders(&self, account: &AccountId) -> Result<Vec<Order>, LedgerError> {
        scan_records(&self.store.orders, &account_prefix(account))
    }

    pub fn order_lines(
        &self,
        account: &AccountId,
        order_id: &str,
    ) -> Result<Vec<OrderLine>, LedgerError> {
        scan_records(&self.store.order_lines, &order_lines_prefix(account, order_id))
    }

    // FULFILLMENT

    /// Advances the order's status. Delivery stamps `completed_at`,
    /// forces `is_paid` (delivery settles payment by policy) and applies
    /// every line's guarded stock decrement in the same transaction as
    /// the status write. A line whose product no longer exists is
    /// skipped and logged; a line without enough stock aborts the whole
    /// transition with the order left pending and stock untouched.
    pub fn transition(
        &self,
        account: &AccountId,
        order_id: &str,
        new_status: OrderStatus,
    ) -> Result<Order, LedgerError> {
        let order_key = record_key(account, order_id);
        // lines are immutable after creation, safe to read up front
        let lines = self.order_lines(account, order_id)?;

        let res = (&self.store.orders, &self.store.products).transaction(|(orders, products)| {
            let Some(bytes) = orders.get(order_key.as_slice())? else {
                return abort(LedgerError::not_found(order_id));
            };
            let mut order: Order = tx_decode(&bytes)?;
            if !order.status.can_transition(new_status) {
                return abort(LedgerError::InvalidTransition {
                    from: order.status,
                    to: new_status,
                });
            }

            let mut skipped = Vec::new();
            if new_status == OrderStatus::Delivered {
                order.completed_at = Some(TimeStamp::new());
                order.is_paid = true;
                for line in &lines {
                    let product_key = record_key(account, &line.product_id);
                    match products.get(product_key.as_slice())? {
                        None => skipped.push(line.product_id.clone()),
                        Some(bytes) => {
                            let mut product: Product = tx_decode(&bytes)?;
                            if product.quantity < line.quantity {
                                return abort(LedgerError::InsufficientStock {
                                    requested: line.quantity,
                                    available: product.quantity,
                                });
                            }
                            product.quantity -= line.quantity;
                            products.insert(product_key.as_slice(), tx_encode(&product)?)?;
                        }
                    }
                }
            }

            order.status = new_status;
            orders.insert(order_key.as_slice(), tx_encode(&order)?)?;
            Ok((order, skipped))
        });

        let (order, skipped) = unabort(res)?;
        for product_id in skipped {
            tracing::warn!(
                order_id = %order_id,
                product_id = %product_id,
                "product missing at delivery, line skipped without stock effect"
            );
        }
        Ok(order)
    }

    // LOAN LEDGER

    /// Snapshots the product's per-unit price/points and decrements
    /// stock under the same guard as fulfillment. Unlike order lines, a
    /// loan requires its product to exist: there is nothing to snapshot
    /// otherwise.
    pub fn create_loan(
        &self,
        account: &AccountId,
        partner_id: &str,
        product_id: &str,
        quantity: u32,
        loan_date: TimeStamp<Utc>,
    ) -> Result<Loan, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::validation("loan quantity must be at least 1"));
        }
        require_record::<Partner>(
            &self.store.partners,
            &record_key(account, partner_id),
            partner_id,
        )?;

        let loan_id = utils::new_loan_id()?;
        let product_key = record_key(account, product_id);

        let res = (&self.store.products, &self.store.loans).transaction(|(products, loans)| {
            let Some(bytes) = products.get(product_key.as_slice())? else {
                return abort(LedgerError::not_found(product_id));
            };
            let mut product: Product = tx_decode(&bytes)?;
            if product.quantity < quantity {
                return abort(LedgerError::InsufficientStock {
                    requested: quantity,
                    available: product.quantity,
                });
            }
            product.quantity -= quantity;

            let loan = Loan {
                id: loan_id.clone(),
                partner_id: partner_id.to_string(),
                product_id: product_id.to_string(),
                quantity,
                points_at_loan: product.points_per_unit,
                price_at_loan: product.price_per_unit,
                loan_date,
            };

            products.insert(product_key.as_slice(), tx_encode(&product)?)?;
            loans.insert(record_key(account, &loan_id).as_slice(), tx_encode(&loan)?)?;
            Ok(loan)
        });
        unabort(res)
    }

    /// Removes the loan record only. Stock is deliberately NOT restocked;
    /// the delete is a bookkeeping correction, not a return.
    pub fn delete_loan(&self, account: &AccountId, loan_id: &str) -> Result<(), LedgerError> {
        if self
            .store
            .loans
            .remove(record_key(account, loan_id))?
            .is_none()
        {
            return Err(LedgerError::not_found(loan_id));
        }
        tracing::debug!(loan_id = %loan_id, "loan removed, stock left as issued");
        Ok(())
    }

    pub fn list_loans(&self, account: &AccountId) -> Result<Vec<Loan>, LedgerError> {
        scan_records(&self.store.loans, &account_prefix(account))
    }

    pub fn loans_for_partner(
        &self,
        account: &AccountId,
        partner_id: &str,
    ) -> Result<Vec<Loan>, LedgerError> {
        let mut loans = self.list_loans(account)?;
        loans.retain(|l| l.partner_id == partner_id);
        Ok(loans)
    }

    // VIEWS

    pub fn order_view(&self, account: &AccountId, order_id: &str) -> Result<OrderView, LedgerError> {
        let order = self.get_order(account, order_id)?;
        self.project_order(account, order)
    }

    /// All of the account's orders with associations resolved, sorted by
    /// delivery date.
    pub fn list_order_views(&self, account: &AccountId) -> Result<Vec<OrderView>, LedgerError> {
        let mut orders = self.list_orders(account)?;
        orders.sort_by_key(|o| o.delivery_date.to_datetime_utc());
        orders
            .into_iter()
            .map(|order| self.project_order(account, order))
            .collect()
    }

    fn project_order(&self, account: &AccountId, order: Order) -> Result<OrderView, LedgerError> {
        let customer = get_record(
            &self.store.customers,
            &record_key(account, &order.customer_id),
        )?;
        let lines = self
            .order_lines(account, &order.id)?
            .into_iter()
            .map(|line| {
                let product =
                    get_record(&self.store.products, &record_key(account, &line.product_id))?;
                Ok(LineView { line, product })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        Ok(OrderView {
            order,
            customer,
            lines,
        })
    }

    pub fn partner_view(
        &self,
        account: &AccountId,
        partner_id: &str,
    ) -> Result<PartnerView, LedgerError> {
        let partner: Partner = require_record(
            &self.store.partners,
            &record_key(account, partner_id),
            partner_id,
        )?;
        let loans = self
            .loans_for_partner(account, partner_id)?
            .into_iter()
            .map(|loan| {
                let product =
                    get_record(&self.store.products, &record_key(account, &loan.product_id))?;
                Ok(LoanView { loan, product })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        Ok(PartnerView { partner, loans })
    }

    pub fn list_partner_views(&self, account: &AccountId) -> Result<Vec<PartnerView>, LedgerError> {
        self.list_partners(account)?
            .into_iter()
            .map(|partner| self.partner_view(account, &partner.id))
            .collect()
    }

    // REPORTING

    /// Pending totals plus delivered value over the trailing dashboard
    /// window, half-open `[now - 60d, now)`.
    pub fn dashboard_totals(&self, account: &AccountId) -> Result<DashboardTotals, LedgerError> {
        let orders = self.list_orders(account)?;
        let now = Utc::now();
        let window_start = now - chrono::Duration::days(DASHBOARD_WINDOW_DAYS);
        Ok(DashboardTotals {
            pending: report::pending_totals(&orders),
            delivered_recent: report::delivered_totals(&orders, window_start, now),
        })
    }

    /// Monthly sales series; `range` is an inclusive pair of `"yyyy-mm"`
    /// keys, `None` for the full history.
    pub fn monthly_sales_report(
        &self,
        account: &AccountId,
        range: Option<(&str, &str)>,
    ) -> Result<Vec<MonthlyRow>, LedgerError> {
        let orders = self.list_orders(account)?;
        let all_lines: Vec<OrderLine> =
            scan_records(&self.store.order_lines, &account_prefix(account))?;
        let mut lines_by_order: HashMap<String, Vec<OrderLine>> = HashMap::new();
        for line in all_lines {
            lines_by_order.entry(line.order_id.clone()).or_default().push(line);
        }
        let units: HashMap<String, (u64, u64)> = self
            .list_products(account)?
            .into_iter()
            .map(|p| (p.id, (p.points_per_unit, p.price_per_unit)))
            .collect();
        let lookup = |product_id: &str| units.get(product_id).copied();
        Ok(report::monthly_sales(&orders, &lines_by_order, &lookup, range))
    }

    pub fn inventory_report(&self, account: &AccountId) -> Result<Vec<InventoryRow>, LedgerError> {
        Ok(report::inventory_rows(&self.list_products(account)?))
    }

    pub fn loans_report(&self, account: &AccountId) -> Result<Vec<LoanRow>, LedgerError> {
        let loans = self.list_loans(account)?;
        let partners: HashMap<String, String> = self
            .list_partners(account)?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let products: HashMap<String, String> = self
            .list_products(account)?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let partner_name = |id: &str| partners.get(id).cloned();
        let product_name = |id: &str| products.get(id).cloned();
        Ok(report::loan_rows(&loans, &partner_name, &product_name))
    }

    pub fn loan_totals(
        &self,
        account: &AccountId,
    ) -> Result<BTreeMap<String, Totals>, LedgerError> {
        Ok(report::loan_totals_by_partner(&self.list_loans(account)?))
    }
}

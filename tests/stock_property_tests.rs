//! Property-based tests for stock non-negativity
//!
//! Stock is drawn down by two paths, loan creation and order delivery,
//! both behind the same guarded decrement. For any interleaving of the
//! two against any starting quantity, on-hand stock must track a simple
//! counter model exactly and never go below zero: an operation that
//! would overdraw fails with InsufficientStock and changes nothing.

use std::sync::Arc;

use merchant_ledger::{
    catalog::ProductAttrs,
    error::LedgerError,
    order::{OrderDraft, OrderStatus},
    party::PartyAttrs,
    service::LedgerService,
    store::AccountId,
    time::TimeStamp,
    utils,
};
use proptest::prelude::*;

/// A single stock-drawing step: a partner loan or a delivered order.
#[derive(Debug, Clone)]
enum StockOp {
    Loan(u32),
    Delivery(u32),
}

fn op_strategy() -> impl Strategy<Value = StockOp> {
    prop_oneof![
        (1u32..=10).prop_map(StockOp::Loan),
        (1u32..=10).prop_map(StockOp::Delivery),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<StockOp>> {
    prop::collection::vec(op_strategy(), 1..=8)
}

fn new_service() -> (tempfile::TempDir, LedgerService, AccountId) {
    // separate database per case, on temp for simplified cleanup
    let temp_dir = tempfile::tempdir().unwrap();
    let db = sled::open(temp_dir.path().join("prop.db")).unwrap();
    let service = LedgerService::new(Arc::new(db)).unwrap();
    let account = AccountId::new(utils::new_account_id().unwrap());
    (temp_dir, service, account)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: for any sequence of loans and deliveries against any
    /// starting quantity, on-hand stock mirrors the counter model after
    /// every step; overdraws fail with InsufficientStock and leave the
    /// quantity unchanged.
    #[test]
    fn stock_never_goes_negative(initial in 0u32..=40, ops in ops_strategy()) {
        let (_tmp, service, account) = new_service();

        let product = service
            .create_product(&account, ProductAttrs {
                name: "Product".to_string(),
                quantity: initial,
                price_per_unit: 100,
                points_per_unit: 1,
            })
            .unwrap();
        let customer = service
            .create_customer(&account, PartyAttrs {
                name: "Customer".to_string(),
                phone: String::new(),
                email: String::new(),
            })
            .unwrap();
        let partner = service
            .create_partner(&account, PartyAttrs {
                name: "Partner".to_string(),
                phone: String::new(),
                email: String::new(),
            })
            .unwrap();

        let mut remaining = initial;
        for op in ops {
            match op {
                StockOp::Loan(quantity) => {
                    let result = service.create_loan(
                        &account,
                        &partner.id,
                        &product.id,
                        quantity,
                        TimeStamp::new(),
                    );
                    if quantity <= remaining {
                        prop_assert!(result.is_ok());
                        remaining -= quantity;
                    } else {
                        let overdrawn =
                            matches!(result, Err(LedgerError::InsufficientStock { .. }));
                        prop_assert!(overdrawn);
                    }
                }
                StockOp::Delivery(quantity) => {
                    let order = service
                        .create_order(
                            &account,
                            OrderDraft::new()
                                .customer(&customer.id)
                                .delivery_date(TimeStamp::new())
                                .line(&product.id, quantity),
                        )
                        .unwrap();
                    let result =
                        service.transition(&account, &order.id, OrderStatus::Delivered);
                    if quantity <= remaining {
                        prop_assert!(result.is_ok());
                        remaining -= quantity;
                    } else {
                        let overdrawn =
                            matches!(result, Err(LedgerError::InsufficientStock { .. }));
                        prop_assert!(overdrawn);
                        // the order is still pending, free to cancel
                        let pending = service.get_order(&account, &order.id).unwrap();
                        prop_assert_eq!(pending.status, OrderStatus::Pending);
                    }
                }
            }
            prop_assert_eq!(
                service.get_product(&account, &product.id).unwrap().quantity,
                remaining
            );
        }
    }
}

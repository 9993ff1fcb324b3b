//! Billing, inventory and point-of-sale integration tests.

use chrono::{NaiveDate, NaiveDateTime};
use clinic_core::db::Database;
use clinic_core::ledger::{BillingLedger, InventoryLedger, PointOfSale};
use clinic_core::lifecycle::{BookingLifecycle, LogNotifier};
use clinic_core::models::{
    Billing, BookingRequest, CartLine, ItemCategory, NewInventoryItem, PaymentMethod,
    PaymentRequest, SaleDiscount, SaleRequest, SaleType, Service, StockAdjustment, StockStatus,
    StockTransactionFilter, TransactionType,
};
use clinic_core::{ClinicError, ClinicRules};
use proptest::prelude::*;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(10, 15, 0)
        .unwrap()
}

/// Accept one booking and return its billing.
fn billed_visit(db: &Database, price: i64) -> Billing {
    let rules = ClinicRules::default();
    let service = Service::new("Consult".into(), price);
    db.insert_service(&service).unwrap();
    let lifecycle = BookingLifecycle::new(db, &rules, &LogNotifier).at(now());
    let booking = lifecycle
        .submit(&BookingRequest {
            service_id: service.service_id,
            date: "2030-01-02".into(),
            time: "09:00".into(),
            patient_name: "Jose Rizal".into(),
            patient_email: "jose@example.com".into(),
            patient_phone: "09171112222".into(),
            notes: String::new(),
        })
        .unwrap();
    lifecycle.accept(&booking.booking_id, "frontdesk").unwrap().billing
}

fn pay(billing_id: &str, amount: i64) -> PaymentRequest {
    PaymentRequest {
        billing_id: billing_id.to_string(),
        amount,
        method: PaymentMethod::Cash,
        reference_number: None,
        notes: None,
    }
}

fn stock_item(db: &Database, name: &str, quantity: i64, threshold: i64) -> String {
    InventoryLedger::new(db)
        .create_item(
            &NewInventoryItem {
                name: name.into(),
                description: String::new(),
                category: ItemCategory::Medicine,
                unit_price: 2500,
                quantity,
                reorder_threshold: threshold,
                expiry_date: None,
            },
            "pharmacist",
        )
        .unwrap()
        .item_id
}

fn cart(lines: Vec<(String, i64)>) -> SaleRequest {
    SaleRequest {
        sale_type: SaleType::WalkIn,
        patient_id: None,
        customer_name: String::new(),
        lines: lines
            .into_iter()
            .map(|(item_id, quantity)| CartLine {
                item_id,
                quantity,
                unit_price: None,
            })
            .collect(),
        discount: SaleDiscount::None,
        payment_method: PaymentMethod::Cash,
        amount_received: None,
        reference_number: None,
        notes: String::new(),
    }
}

fn transaction_count(db: &Database) -> usize {
    db.list_stock_transactions(&StockTransactionFilter::default())
        .unwrap()
        .len()
}

#[test]
fn test_full_payment_then_overpayment() {
    let db = Database::open_in_memory().unwrap();
    let billing = billed_visit(&db, 80000);
    let ledger = BillingLedger::new(&db);

    let receipt = ledger
        .record_payment(&pay(&billing.billing_id, billing.balance), "cashier")
        .unwrap();
    assert!(receipt.billing.paid);
    assert_eq!(receipt.billing.balance, 0);

    match ledger.record_payment(&pay(&billing.billing_id, 1), "cashier") {
        Err(ClinicError::OverpaymentRejected { amount, balance }) => {
            assert_eq!((amount, balance), (1, 0))
        }
        other => panic!("expected overpayment, got {:?}", other.map(|r| r.billing.balance)),
    }
    assert_eq!(ledger.payments(&billing.billing_id).unwrap().len(), 1);
    assert_eq!(db.payments_total(&billing.billing_id).unwrap(), billing.total_amount);
}

#[test]
fn test_partial_payments_sum_to_total() {
    let db = Database::open_in_memory().unwrap();
    let billing = billed_visit(&db, 90000);
    let ledger = BillingLedger::new(&db);

    for amount in [30000, 45000, 15000] {
        let receipt = ledger
            .record_payment(&pay(&billing.billing_id, amount), "cashier")
            .unwrap();
        assert!(receipt.billing.is_consistent());
    }
    let billing = ledger.get(&billing.billing_id).unwrap();
    assert!(billing.paid);
    assert_eq!(billing.amount_paid, 90000);
    assert_eq!(db.payments_total(&billing.billing_id).unwrap(), billing.amount_paid);
}

#[test]
fn test_stock_runs_down_to_zero() {
    let db = Database::open_in_memory().unwrap();
    let inventory = InventoryLedger::new(&db);
    let item_id = stock_item(&db, "Tretinoin 0.025%", 5, 10);
    assert_eq!(inventory.get_item(&item_id).unwrap().status(), StockStatus::LowStock);

    let movement = inventory
        .adjust_stock(
            &StockAdjustment {
                item_id: item_id.clone(),
                delta: -5,
                transaction_type: TransactionType::StockOut,
                note: "Expired batch".into(),
            },
            "pharmacist",
        )
        .unwrap();
    assert_eq!(movement.item.quantity, 0);
    assert_eq!(movement.item.status(), StockStatus::OutOfStock);

    let err = inventory
        .adjust_stock(
            &StockAdjustment {
                item_id: item_id.clone(),
                delta: -1,
                transaction_type: TransactionType::StockOut,
                note: String::new(),
            },
            "pharmacist",
        )
        .unwrap_err();
    assert!(matches!(err, ClinicError::InsufficientStock { available: 0, .. }));
    assert_eq!(inventory.get_item(&item_id).unwrap().quantity, 0);
}

#[test]
fn test_short_cart_line_fails_whole_sale() {
    let db = Database::open_in_memory().unwrap();
    let cream = stock_item(&db, "Hydrocortisone cream", 10, 2);
    let soap = stock_item(&db, "Sulfur soap", 1, 2);
    let transactions_before = transaction_count(&db);

    let err = PointOfSale::new(&db)
        .complete_sale(&cart(vec![(cream.clone(), 3), (soap.clone(), 2)]), "cashier")
        .unwrap_err();
    assert!(matches!(err, ClinicError::InsufficientStock { .. }));

    let inventory = InventoryLedger::new(&db);
    assert_eq!(inventory.get_item(&cream).unwrap().quantity, 10);
    assert_eq!(inventory.get_item(&soap).unwrap().quantity, 1);
    assert_eq!(transaction_count(&db), transactions_before);
    assert!(PointOfSale::new(&db).list(&Default::default()).unwrap().is_empty());
}

#[test]
fn test_repeated_item_lines_are_checked_together() {
    let db = Database::open_in_memory().unwrap();
    let soap = stock_item(&db, "Sulfur soap", 3, 1);

    let err = PointOfSale::new(&db)
        .complete_sale(&cart(vec![(soap.clone(), 2), (soap.clone(), 2)]), "cashier")
        .unwrap_err();
    assert!(matches!(
        err,
        ClinicError::InsufficientStock {
            requested: 4,
            available: 3,
            ..
        }
    ));
    assert_eq!(InventoryLedger::new(&db).get_item(&soap).unwrap().quantity, 3);
}

#[test]
fn test_cancelled_draft_returns_stock() {
    let db = Database::open_in_memory().unwrap();
    let soap = stock_item(&db, "Sulfur soap", 4, 1);
    let pos = PointOfSale::new(&db);

    let draft = pos.open_sale(&cart(vec![(soap.clone(), 3)]), "cashier").unwrap();
    assert_eq!(InventoryLedger::new(&db).get_item(&soap).unwrap().quantity, 1);

    pos.cancel_sale(&draft.sale.sale_id, "cashier").unwrap();
    assert_eq!(InventoryLedger::new(&db).get_item(&soap).unwrap().quantity, 4);

    let sold = pos.complete_sale(&cart(vec![(soap.clone(), 1)]), "cashier").unwrap();
    assert!(matches!(
        pos.cancel_sale(&sold.sale.sale_id, "cashier"),
        Err(ClinicError::SaleNotCancellable(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_billing_stays_balanced(amounts in prop::collection::vec(1i64..40000, 1..12)) {
        let db = Database::open_in_memory().unwrap();
        let billing = billed_visit(&db, 100000);
        let ledger = BillingLedger::new(&db);

        let mut paid = 0;
        for amount in amounts {
            match ledger.record_payment(&pay(&billing.billing_id, amount), "cashier") {
                Ok(_) => paid += amount,
                Err(ClinicError::OverpaymentRejected { .. }) => {
                    prop_assert!(paid + amount > 100000)
                }
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
            let current = ledger.get(&billing.billing_id).unwrap();
            prop_assert_eq!(current.amount_paid + current.balance, current.total_amount);
            prop_assert_eq!(current.paid, current.balance == 0);
            prop_assert_eq!(current.amount_paid, paid);
            prop_assert_eq!(db.payments_total(&billing.billing_id).unwrap(), current.amount_paid);
        }
    }

    #[test]
    fn prop_stock_never_negative(
        start in 0i64..20,
        threshold in 0i64..10,
        deltas in prop::collection::vec((-8i64..8).prop_filter("non-zero", |d| *d != 0), 1..20),
    ) {
        let db = Database::open_in_memory().unwrap();
        let item_id = stock_item(&db, "Clindamycin gel", start, threshold);
        let inventory = InventoryLedger::new(&db);

        let mut expected = start;
        for delta in deltas {
            let result = inventory.adjust_stock(
                &StockAdjustment {
                    item_id: item_id.clone(),
                    delta,
                    transaction_type: TransactionType::Adjustment,
                    note: String::new(),
                },
                "pharmacist",
            );
            match result {
                Ok(movement) => {
                    expected += delta;
                    prop_assert_eq!(movement.item.quantity, expected);
                }
                Err(ClinicError::InsufficientStock { .. }) => prop_assert!(expected + delta < 0),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
            let item = inventory.get_item(&item_id).unwrap();
            prop_assert!(item.quantity >= 0);
            prop_assert_eq!(item.status(), StockStatus::derive(item.quantity, threshold));
        }
    }
}

//! Billing ledger: payments and fee changes.
//!
//! `amount_paid + balance == total_amount` and `paid == (balance == 0)` hold
//! after every operation here. Each change runs under the write lock and
//! the balance update itself is guarded, so two concurrent payments can
//! never jointly overpay.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::ActivityLog;
use crate::db::{now_rfc3339, Database};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    format_cents, ActivityAction, Billing, BillingFilter, Cents, FeeUpdate, Payment, PaymentRequest,
};

/// A recorded payment and the billing it settled against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentReceipt {
    pub billing: Billing,
    pub payment: Payment,
}

/// Recompute totals and persist new fees. Must run inside a write transaction.
pub(crate) fn store_fees(db: &Database, billing: &mut Billing) -> ClinicResult<()> {
    billing.recompute()?;
    if billing.total_amount < 0 {
        return Err(ClinicError::InvalidAmount {
            amount: billing.total_amount,
            reason: "total cannot be negative".into(),
        });
    }
    if billing.total_amount < billing.amount_paid {
        return Err(ClinicError::InvalidAmount {
            amount: billing.total_amount,
            reason: format!(
                "total cannot drop below the {} already paid",
                format_cents(billing.amount_paid)
            ),
        });
    }

    if !db.update_billing_fees(billing)? {
        return Err(ClinicError::Integrity {
            operation: "update billing fees".into(),
            reason: format!("billing {} changed during the update", billing.billing_id),
        });
    }
    Ok(())
}

fn non_negative(amount: Option<Cents>, what: &str) -> ClinicResult<()> {
    match amount {
        Some(value) if value < 0 => Err(ClinicError::InvalidAmount {
            amount: value,
            reason: format!("{} cannot be negative", what),
        }),
        _ => Ok(()),
    }
}

/// Billing ledger bound to a database.
pub struct BillingLedger<'a> {
    db: &'a Database,
}

impl<'a> BillingLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record one payment against a billing.
    pub fn record_payment(&self, request: &PaymentRequest, actor: &str) -> ClinicResult<PaymentReceipt> {
        if request.amount <= 0 {
            return Err(ClinicError::InvalidAmount {
                amount: request.amount,
                reason: "payment must be greater than zero".into(),
            });
        }

        let receipt = self.db.write_transaction(|db| {
            let billing = db
                .get_billing(&request.billing_id)?
                .ok_or_else(|| ClinicError::not_found("Billing", &request.billing_id))?;

            if request.amount > billing.balance {
                return Err(ClinicError::OverpaymentRejected {
                    amount: request.amount,
                    balance: billing.balance,
                });
            }
            if !db.apply_payment(&billing.billing_id, request.amount)? {
                let balance = db
                    .get_billing(&billing.billing_id)?
                    .map(|b| b.balance)
                    .unwrap_or(0);
                return Err(ClinicError::OverpaymentRejected {
                    amount: request.amount,
                    balance,
                });
            }

            let payment = Payment {
                payment_id: uuid::Uuid::new_v4().to_string(),
                billing_id: billing.billing_id.clone(),
                amount: request.amount,
                method: request.method,
                reference_number: request.reference_number.clone(),
                notes: request.notes.clone(),
                recorded_by: actor.to_string(),
                paid_at: now_rfc3339(),
            };
            db.insert_payment(&payment)?;

            let billing = db
                .get_billing(&billing.billing_id)?
                .ok_or_else(|| ClinicError::not_found("Billing", &request.billing_id))?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Payment,
                "billing",
                &billing.billing_id,
                format!(
                    "Payment {} via {}; balance {}",
                    format_cents(payment.amount),
                    payment.method.as_str(),
                    format_cents(billing.balance)
                ),
            )?;
            Ok(PaymentReceipt { billing, payment })
        })?;

        info!(
            billing_id = %receipt.billing.billing_id,
            amount = receipt.payment.amount,
            balance = receipt.billing.balance,
            paid = receipt.billing.paid,
            "payment recorded"
        );
        Ok(receipt)
    }

    /// Change service fee, additional fee, discount or notes.
    pub fn update_fees(&self, billing_id: &str, update: &FeeUpdate, actor: &str) -> ClinicResult<Billing> {
        non_negative(update.service_fee, "service fee")?;
        non_negative(update.additional_fee, "additional fee")?;
        non_negative(update.discount, "discount")?;

        self.db.write_transaction(|db| {
            let mut billing = db
                .get_billing(billing_id)?
                .ok_or_else(|| ClinicError::not_found("Billing", billing_id))?;

            if let Some(fee) = update.service_fee {
                billing.service_fee = fee;
            }
            if let Some(fee) = update.additional_fee {
                billing.additional_fee = fee;
            }
            if let Some(discount) = update.discount {
                billing.discount = discount;
            }
            if let Some(notes) = &update.notes {
                billing.notes = notes.clone();
            }
            store_fees(db, &mut billing)?;

            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "billing",
                billing_id,
                format!("Fees updated; total {}", format_cents(billing.total_amount)),
            )?;
            Ok(billing)
        })
    }

    pub fn get(&self, billing_id: &str) -> ClinicResult<Billing> {
        self.db
            .get_billing(billing_id)?
            .ok_or_else(|| ClinicError::not_found("Billing", billing_id))
    }

    pub fn for_booking(&self, booking_id: &str) -> ClinicResult<Billing> {
        self.db
            .get_billing_for_booking(booking_id)?
            .ok_or_else(|| ClinicError::not_found("Billing for booking", booking_id))
    }

    pub fn payments(&self, billing_id: &str) -> ClinicResult<Vec<Payment>> {
        Ok(self.db.list_payments(billing_id)?)
    }

    pub fn list(&self, filter: &BillingFilter) -> ClinicResult<Vec<Billing>> {
        Ok(self.db.list_billings(filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentMethod, PaymentStatus};

    fn setup(fee: Cents) -> (Database, Billing) {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                r#"
                INSERT INTO services (service_id, name, price) VALUES ('svc', 'Consult', 50000);
                INSERT INTO bookings (booking_id, service_id, patient_name, patient_email,
                                      patient_phone, date, time, status)
                VALUES ('bk', 'svc', 'Ana', 'ana@example.com', '0917', '2030-01-02', '09:00', 'confirmed');
                "#,
            )
            .unwrap();
        let billing = Billing::new("bk".into(), fee);
        db.insert_billing(&billing).unwrap();
        (db, billing)
    }

    fn pay(billing_id: &str, amount: Cents) -> PaymentRequest {
        PaymentRequest {
            billing_id: billing_id.into(),
            amount,
            method: PaymentMethod::Cash,
            reference_number: None,
            notes: None,
        }
    }

    #[test]
    fn test_partial_payments_settle() {
        let (db, billing) = setup(50000);
        let ledger = BillingLedger::new(&db);

        let first = ledger.record_payment(&pay(&billing.billing_id, 20000), "cashier").unwrap();
        assert_eq!(first.billing.status(), PaymentStatus::PartiallyPaid);
        assert_eq!(first.billing.balance, 30000);

        let second = ledger.record_payment(&pay(&billing.billing_id, 30000), "cashier").unwrap();
        assert!(second.billing.paid);
        assert_eq!(second.billing.balance, 0);
        assert!(second.billing.is_consistent());
        assert_eq!(ledger.payments(&billing.billing_id).unwrap().len(), 2);
    }

    #[test]
    fn test_overpayment_and_invalid_amounts() {
        let (db, billing) = setup(50000);
        let ledger = BillingLedger::new(&db);

        assert!(matches!(
            ledger.record_payment(&pay(&billing.billing_id, 0), "cashier"),
            Err(ClinicError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ledger.record_payment(&pay(&billing.billing_id, -100), "cashier"),
            Err(ClinicError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ledger.record_payment(&pay(&billing.billing_id, 50001), "cashier"),
            Err(ClinicError::OverpaymentRejected { amount: 50001, balance: 50000 })
        ));
        assert!(ledger.payments(&billing.billing_id).unwrap().is_empty());
    }

    #[test]
    fn test_payment_on_missing_billing() {
        let (db, _) = setup(50000);
        let ledger = BillingLedger::new(&db);
        assert!(matches!(
            ledger.record_payment(&pay("missing", 100), "cashier"),
            Err(ClinicError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_fees_recomputes_balance() {
        let (db, billing) = setup(50000);
        let ledger = BillingLedger::new(&db);
        ledger.record_payment(&pay(&billing.billing_id, 50000), "cashier").unwrap();

        let updated = ledger
            .update_fees(
                &billing.billing_id,
                &FeeUpdate {
                    additional_fee: Some(15000),
                    ..Default::default()
                },
                "admin",
            )
            .unwrap();
        assert_eq!(updated.total_amount, 65000);
        assert_eq!(updated.balance, 15000);
        assert!(!updated.paid);
        assert!(updated.is_consistent());
    }

    #[test]
    fn test_update_fees_rejects_overflowing_total() {
        let (db, billing) = setup(50000);
        let ledger = BillingLedger::new(&db);

        let result = ledger.update_fees(
            &billing.billing_id,
            &FeeUpdate {
                additional_fee: Some(i64::MAX),
                ..Default::default()
            },
            "admin",
        );
        assert!(matches!(result, Err(ClinicError::InvalidAmount { .. })));
        let stored = ledger.get(&billing.billing_id).unwrap();
        assert_eq!(stored.additional_fee, 0);
        assert_eq!(stored.total_amount, 50000);
    }

    #[test]
    fn test_update_fees_rejects_total_below_paid() {
        let (db, billing) = setup(50000);
        let ledger = BillingLedger::new(&db);
        ledger.record_payment(&pay(&billing.billing_id, 40000), "cashier").unwrap();

        let result = ledger.update_fees(
            &billing.billing_id,
            &FeeUpdate {
                discount: Some(20000),
                ..Default::default()
            },
            "admin",
        );
        assert!(matches!(result, Err(ClinicError::InvalidAmount { .. })));
        assert_eq!(ledger.get(&billing.billing_id).unwrap().discount, 0);
    }

    #[test]
    fn test_discount_can_settle_bill() {
        let (db, billing) = setup(50000);
        let ledger = BillingLedger::new(&db);
        ledger.record_payment(&pay(&billing.billing_id, 40000), "cashier").unwrap();

        let updated = ledger
            .update_fees(
                &billing.billing_id,
                &FeeUpdate {
                    discount: Some(10000),
                    ..Default::default()
                },
                "admin",
            )
            .unwrap();
        assert!(updated.paid);
        assert_eq!(updated.status(), PaymentStatus::FullyPaid);
    }
}

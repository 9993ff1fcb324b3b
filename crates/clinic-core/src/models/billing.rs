//! Billing and payment models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Cents;
use crate::error::{ClinicError, ClinicResult};

/// How a payment was tendered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    GCash,
    BankTransfer,
    Card,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::GCash => "gcash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "gcash" => Some(PaymentMethod::GCash),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "card" => Some(PaymentMethod::Card),
            "other" => Some(PaymentMethod::Other),
            _ => None,
        }
    }
}

/// Derived payment progress of a billing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    FullyPaid,
}

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "Unpaid",
            PaymentStatus::PartiallyPaid => "Partially Paid",
            PaymentStatus::FullyPaid => "Fully Paid",
        }
    }
}

/// A financial obligation tied to one booking.
///
/// Invariants: `amount_paid + balance == total_amount`, `balance >= 0`,
/// `paid == (balance == 0)`. Every mutation goes through [`Billing::recompute`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Billing {
    /// Unique billing ID
    pub billing_id: String,
    /// Booking this billing belongs to (one-to-one)
    pub booking_id: String,
    /// Fee for the booked service
    pub service_fee: Cents,
    /// Sum of prescriptions dispensed during the visit
    pub medicine_fee: Cents,
    /// Itemized extras
    pub additional_fee: Cents,
    /// Discount granted
    pub discount: Cents,
    /// `service + medicine + additional - discount`
    pub total_amount: Cents,
    /// Sum of recorded payments
    pub amount_paid: Cents,
    /// Unpaid remainder
    pub balance: Cents,
    /// True iff balance is zero
    pub paid: bool,
    /// Billing notes
    pub notes: String,
    /// Issue timestamp
    pub issued_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Billing {
    /// Create an unpaid billing for a booking's service fee.
    pub fn new(booking_id: String, service_fee: Cents) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            billing_id: uuid::Uuid::new_v4().to_string(),
            booking_id,
            service_fee,
            medicine_fee: 0,
            additional_fee: 0,
            discount: 0,
            total_amount: service_fee,
            amount_paid: 0,
            balance: service_fee,
            paid: service_fee == 0,
            notes: String::new(),
            issued_at: now.clone(),
            updated_at: now,
        }
    }

    /// Total from the fee breakdown, or `None` if it leaves the `Cents` range.
    pub fn fee_total(&self) -> Option<Cents> {
        self.service_fee
            .checked_add(self.medicine_fee)?
            .checked_add(self.additional_fee)?
            .checked_sub(self.discount)
    }

    /// Recompute total, balance and paid flag from fees and amount paid.
    pub fn recompute(&mut self) -> ClinicResult<()> {
        let largest = [self.service_fee, self.medicine_fee, self.additional_fee, self.discount]
            .into_iter()
            .max()
            .unwrap_or(0);
        let total = self
            .fee_total()
            .ok_or_else(|| ClinicError::out_of_range(largest, "billing total"))?;
        let balance = total
            .checked_sub(self.amount_paid)
            .ok_or_else(|| ClinicError::out_of_range(self.amount_paid, "billing balance"))?;
        self.total_amount = total;
        self.balance = balance;
        self.paid = balance == 0;
        Ok(())
    }

    /// Check the ledger invariants.
    pub fn is_consistent(&self) -> bool {
        self.amount_paid.checked_add(self.balance) == Some(self.total_amount)
            && self.balance >= 0
            && self.paid == (self.balance == 0)
    }

    pub fn status(&self) -> PaymentStatus {
        if self.paid {
            PaymentStatus::FullyPaid
        } else if self.amount_paid > 0 {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::Unpaid
        }
    }
}

/// An immutable payment event against a billing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: String,
    pub billing_id: String,
    pub amount: Cents,
    pub method: PaymentMethod,
    /// Transaction reference for electronic payments
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    /// Staff member who recorded the payment
    pub recorded_by: String,
    pub paid_at: String,
}

/// Input for recording a payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PaymentRequest {
    pub billing_id: String,
    pub amount: Cents,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Staff fee adjustment. `None` leaves a fee unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FeeUpdate {
    pub service_fee: Option<Cents>,
    pub additional_fee: Option<Cents>,
    pub discount: Option<Cents>,
    pub notes: Option<String>,
}

/// Filter for bulk billing queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingFilter {
    /// Earliest issue date (inclusive)
    pub from: Option<NaiveDate>,
    /// Latest issue date (inclusive)
    pub to: Option<NaiveDate>,
    pub paid: Option<bool>,
}

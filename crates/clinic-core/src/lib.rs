//! Clinic Core Library
//!
//! Business rules for a clinic's bookings, clinical records, billing,
//! inventory and point of sale, backed by SQLite.
//!
//! # Architecture
//!
//! ```text
//!  Public intake ──▶ Slot Allocator ──▶ Booking (Pending)
//!                                            │ accept
//!                                            ▼
//!                          ┌──────── Booking (Confirmed) ────────┐
//!                          │   one transaction, all or nothing   │
//!                          ▼                 ▼                   ▼
//!                       Patient       Medical Record          Billing ◀── Payments
//!                                            │
//!                                      Prescriptions ──┐
//!                                                      ▼
//!                      Point of Sale ──────────▶ Inventory Ledger
//!
//!                 every change ──▶ hash-chained Activity Log
//! ```
//!
//! # Core Principle
//!
//! **Every check that guards shared state is repeated at commit.** Writes run
//! under `BEGIN IMMEDIATE`, slot uniqueness is a unique index, and balance
//! and stock updates are guarded so a concurrent request can never overpay,
//! oversell or double-book.
//!
//! # Modules
//!
//! - [`config`]: Clinic operating rules
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Booking, Patient, Billing, InventoryItem, etc.)
//! - [`scheduling`]: Intake validation, slot allocation, service catalogue
//! - [`lifecycle`]: Booking state machine, acceptance side effects, notifications
//! - [`ledger`]: Billing, inventory and point-of-sale ledgers
//! - [`audit`]: Hash-chained activity log
//! - [`export`]: Reports and dashboard statistics

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod scheduling;

// Re-export commonly used types
pub use config::ClinicRules;
pub use db::Database;
pub use error::{ClinicError, ClinicResult, ErrorKind};
pub use ledger::{BillingLedger, InventoryLedger, PointOfSale};
pub use lifecycle::{BookingLifecycle, LogNotifier, MedicalRecords, Notifier};
pub use scheduling::{ServiceCatalog, SlotAllocator};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDate;

use crate::audit::ActivityLog;
use crate::export::{AuditExport, DashboardStats, ReportExporter};
use crate::ledger::{StockMovement, Tender};
use crate::lifecycle::{AcceptanceOutcome, ImageUpload, PatientRegistry};
use crate::models::{
    Billing, BillingFilter, Booking, BookingFilter, BookingRequest, BookingStatus, CartLine,
    FeeUpdate, InventoryFilter, InventoryItem, ItemCategory, MedicalRecord, NewInventoryItem,
    Patient, PatientMatchFlag, Payment, PaymentMethod, PaymentRequest, PosSale, PrescriptionInput,
    SaleDiscount, SaleFilter, SaleReceipt, SaleRequest, SaleStatus, SaleType, Service,
    ServiceInput, StockAdjustment, StockStatus, StockTransactionFilter, TransactionType,
};
use crate::scheduling::parse_request_date;

// =========================================================================
// FFI Error Type
// =========================================================================

/// Errors crossing the FFI boundary. The variant is the error kind; `code`
/// names the precondition that failed.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicFfiError {
    #[error("{detail}")]
    Validation { code: String, detail: String },

    #[error("{detail}")]
    Conflict { code: String, detail: String },

    #[error("{detail}")]
    Integrity { code: String, detail: String },

    #[error("{detail}")]
    NotFound { code: String, detail: String },

    #[error("{detail}")]
    Internal { code: String, detail: String },
}

fn error_code(e: &ClinicError) -> &'static str {
    match e {
        ClinicError::InvalidDate { .. } => "invalid_date",
        ClinicError::ClinicClosed { .. } => "clinic_closed",
        ClinicError::OutsideHours { .. } => "outside_hours",
        ClinicError::InvalidSlotAlignment { .. } => "invalid_slot_alignment",
        ClinicError::InvalidAmount { .. } => "invalid_amount",
        ClinicError::InvalidInput { .. } => "invalid_input",
        ClinicError::ServiceUnavailable(_) => "service_unavailable",
        ClinicError::SlotTaken { .. } => "slot_taken",
        ClinicError::StaleBookingState { .. } => "stale_booking_state",
        ClinicError::OverpaymentRejected { .. } => "overpayment_rejected",
        ClinicError::InsufficientStock { .. } => "insufficient_stock",
        ClinicError::SaleNotCancellable(_) => "sale_not_cancellable",
        ClinicError::SaleNotPending { .. } => "sale_not_pending",
        ClinicError::NotFound { .. } => "not_found",
        ClinicError::Integrity { .. } => "integrity",
        ClinicError::Database(_) => "database",
    }
}

impl From<ClinicError> for ClinicFfiError {
    fn from(e: ClinicError) -> Self {
        let code = error_code(&e).to_string();
        let detail = e.to_string();
        match e.kind() {
            ErrorKind::Validation => ClinicFfiError::Validation { code, detail },
            ErrorKind::Conflict => ClinicFfiError::Conflict { code, detail },
            ErrorKind::Integrity => ClinicFfiError::Integrity { code, detail },
            ErrorKind::NotFound => ClinicFfiError::NotFound { code, detail },
            ErrorKind::Internal => ClinicFfiError::Internal { code, detail },
        }
    }
}

impl From<db::DbError> for ClinicFfiError {
    fn from(e: db::DbError) -> Self {
        ClinicError::from(e).into()
    }
}

impl From<config::ConfigError> for ClinicFfiError {
    fn from(e: config::ConfigError) -> Self {
        ClinicFfiError::Validation {
            code: "invalid_config".to_string(),
            detail: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClinicFfiError {
    fn from(e: serde_json::Error) -> Self {
        ClinicFfiError::Validation {
            code: "invalid_json".to_string(),
            detail: e.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicFfiError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicFfiError::Internal {
            code: "lock_poisoned".to_string(),
            detail: format!("Lock poisoned: {}", e),
        }
    }
}

fn invalid(field: &str, value: &str) -> ClinicFfiError {
    ClinicError::InvalidInput {
        field: field.to_string(),
        reason: format!("unknown value '{}'", value),
    }
    .into()
}

fn parse_date_arg(value: Option<String>) -> Result<Option<NaiveDate>, ClinicFfiError> {
    Ok(value.as_deref().map(parse_request_date).transpose()?)
}

fn parse_method(value: &str) -> Result<PaymentMethod, ClinicFfiError> {
    PaymentMethod::parse(value).ok_or_else(|| invalid("payment_method", value))
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// `rules_json`, when given, replaces the stored operating rules.
#[uniffi::export]
pub fn open_database(path: String, rules_json: Option<String>) -> Result<Arc<ClinicCore>, ClinicFfiError> {
    let db = Database::open(&path)?;
    ClinicCore::start(db, rules_json)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicCore>, ClinicFfiError> {
    let db = Database::open_in_memory()?;
    ClinicCore::start(db, None)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    rules: RwLock<ClinicRules>,
    notifier: LogNotifier,
}

impl ClinicCore {
    fn start(db: Database, rules_json: Option<String>) -> Result<Arc<Self>, ClinicFfiError> {
        let rules = match rules_json {
            Some(json) => {
                let rules = ClinicRules::from_json_str(&json)?;
                db.save_rules(&rules)?;
                rules
            }
            None => db.load_rules()?.unwrap_or_default(),
        };
        tracing::info!(clinic = %rules.clinic_name, "clinic core opened");

        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            rules: RwLock::new(rules),
            notifier: LogNotifier,
        }))
    }
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Settings
    // =========================================================================

    /// Current operating rules as JSON.
    pub fn get_rules_json(&self) -> Result<String, ClinicFfiError> {
        Ok(self.rules.read()?.to_json()?)
    }

    /// Validate, persist and apply new operating rules.
    pub fn set_rules_json(&self, rules_json: String) -> Result<(), ClinicFfiError> {
        let rules = ClinicRules::from_json_str(&rules_json)?;
        let db = self.db.lock()?;
        db.save_rules(&rules)?;
        *self.rules.write()? = rules;
        Ok(())
    }

    /// Close the clinic on a specific date.
    pub fn block_date(&self, date: String, reason: String, actor: String) -> Result<bool, ClinicFfiError> {
        let date = parse_request_date(&date)?;
        let db = self.db.lock()?;
        Ok(db.write_transaction(|db| {
            let added = db.add_blocked_date(&date, &reason, Some(&actor))?;
            if added {
                ActivityLog::new(db).append(
                    &actor,
                    models::ActivityAction::Create,
                    "blocked_date",
                    &date.format("%Y-%m-%d").to_string(),
                    format!("Clinic closed: {}", reason),
                )?;
            }
            Ok::<_, ClinicError>(added)
        })?)
    }

    pub fn unblock_date(&self, date: String, actor: String) -> Result<bool, ClinicFfiError> {
        let date = parse_request_date(&date)?;
        let db = self.db.lock()?;
        Ok(db.write_transaction(|db| {
            let removed = db.remove_blocked_date(&date)?;
            if removed {
                ActivityLog::new(db).append(
                    &actor,
                    models::ActivityAction::Delete,
                    "blocked_date",
                    &date.format("%Y-%m-%d").to_string(),
                    "Clinic reopened",
                )?;
            }
            Ok::<_, ClinicError>(removed)
        })?)
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub fn create_service(
        &self,
        name: String,
        description: String,
        price: i64,
        actor: String,
    ) -> Result<FfiService, ClinicFfiError> {
        let db = self.db.lock()?;
        let input = ServiceInput { name, description, price };
        Ok(ServiceCatalog::new(&db).create(&input, &actor)?.into())
    }

    pub fn update_service(
        &self,
        service_id: String,
        name: String,
        description: String,
        price: i64,
        actor: String,
    ) -> Result<FfiService, ClinicFfiError> {
        let db = self.db.lock()?;
        let input = ServiceInput { name, description, price };
        Ok(ServiceCatalog::new(&db).update(&service_id, &input, &actor)?.into())
    }

    pub fn set_service_active(
        &self,
        service_id: String,
        active: bool,
        actor: String,
    ) -> Result<FfiService, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(ServiceCatalog::new(&db).set_active(&service_id, active, &actor)?.into())
    }

    pub fn list_services(&self, active_only: bool) -> Result<Vec<FfiService>, ClinicFfiError> {
        let db = self.db.lock()?;
        let services = ServiceCatalog::new(&db).list(active_only)?;
        Ok(services.into_iter().map(|s| s.into()).collect())
    }

    // =========================================================================
    // Bookings
    // =========================================================================

    /// Public intake. Creates a Pending booking.
    pub fn submit_booking(&self, request: FfiBookingRequest) -> Result<FfiBooking, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let booking = BookingLifecycle::new(&db, &rules, &self.notifier).submit(&request.into())?;
        Ok(booking.into())
    }

    /// Staff entry. Creates a Confirmed booking with its records.
    pub fn create_staff_booking(
        &self,
        request: FfiBookingRequest,
        actor: String,
    ) -> Result<FfiAcceptance, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let outcome = BookingLifecycle::new(&db, &rules, &self.notifier)
            .create_staff_booking(&request.into(), &actor)?;
        Ok(outcome.into())
    }

    pub fn accept_booking(&self, booking_id: String, actor: String) -> Result<FfiAcceptance, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let outcome = BookingLifecycle::new(&db, &rules, &self.notifier).accept(&booking_id, &actor)?;
        Ok(outcome.into())
    }

    pub fn decline_booking(&self, booking_id: String, actor: String) -> Result<FfiBooking, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let booking = BookingLifecycle::new(&db, &rules, &self.notifier).decline(&booking_id, &actor)?;
        Ok(booking.into())
    }

    pub fn cancel_booking(&self, booking_id: String, actor: String) -> Result<FfiBooking, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let booking = BookingLifecycle::new(&db, &rules, &self.notifier).cancel(&booking_id, &actor)?;
        Ok(booking.into())
    }

    pub fn start_consultation(&self, booking_id: String, actor: String) -> Result<FfiBooking, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let booking =
            BookingLifecycle::new(&db, &rules, &self.notifier).start_consultation(&booking_id, &actor)?;
        Ok(booking.into())
    }

    pub fn finish_consultation(&self, booking_id: String, actor: String) -> Result<FfiBooking, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let booking =
            BookingLifecycle::new(&db, &rules, &self.notifier).finish_consultation(&booking_id, &actor)?;
        Ok(booking.into())
    }

    pub fn complete_booking(&self, booking_id: String, actor: String) -> Result<FfiBooking, ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let booking = BookingLifecycle::new(&db, &rules, &self.notifier).complete(&booking_id, &actor)?;
        Ok(booking.into())
    }

    pub fn delete_pending_booking(&self, booking_id: String, actor: String) -> Result<(), ClinicFfiError> {
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        BookingLifecycle::new(&db, &rules, &self.notifier).delete_pending(&booking_id, &actor)?;
        Ok(())
    }

    pub fn get_booking(&self, booking_id: String) -> Result<Option<FfiBooking>, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(db.get_booking(&booking_id)?.map(|b| b.into()))
    }

    /// List bookings by appointment date range (`YYYY-MM-DD`) and status.
    pub fn list_bookings(
        &self,
        from: Option<String>,
        to: Option<String>,
        status: Option<String>,
    ) -> Result<Vec<FfiBooking>, ClinicFfiError> {
        let filter = booking_filter(from, to, status)?;
        let db = self.db.lock()?;
        Ok(db.list_bookings(&filter)?.into_iter().map(|b| b.into()).collect())
    }

    /// Open `HH:MM` times for a service on a date.
    pub fn available_times(&self, service_id: String, date: String) -> Result<Vec<String>, ClinicFfiError> {
        let date = parse_request_date(&date)?;
        let db = self.db.lock()?;
        let rules = self.rules.read()?;
        let times = BookingLifecycle::new(&db, &rules, &self.notifier).available_times(&service_id, &date)?;
        Ok(times.iter().map(|t| t.format("%H:%M").to_string()).collect())
    }

    // =========================================================================
    // Patients & Records
    // =========================================================================

    pub fn get_patient(&self, patient_id: String) -> Result<Option<FfiPatient>, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(&patient_id)?.map(|p| p.into()))
    }

    pub fn search_patients(&self, query: String, limit: u32) -> Result<Vec<FfiPatient>, ClinicFfiError> {
        let db = self.db.lock()?;
        let patients = PatientRegistry::new(&db).search(&query, limit as usize)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    pub fn list_match_flags(&self, unresolved_only: bool) -> Result<Vec<FfiMatchFlag>, ClinicFfiError> {
        let db = self.db.lock()?;
        let flags = PatientRegistry::new(&db).match_flags(unresolved_only)?;
        Ok(flags.into_iter().map(|f| f.into()).collect())
    }

    pub fn resolve_match_flag(&self, flag_id: String, actor: String) -> Result<(), ClinicFfiError> {
        let db = self.db.lock()?;
        PatientRegistry::new(&db).resolve_flag(&flag_id, &actor)?;
        Ok(())
    }

    pub fn get_medical_record(&self, record_id: String) -> Result<FfiMedicalRecord, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(MedicalRecords::new(&db).get(&record_id)?.into())
    }

    pub fn list_patient_records(&self, patient_id: String) -> Result<Vec<FfiMedicalRecord>, ClinicFfiError> {
        let db = self.db.lock()?;
        let records = MedicalRecords::new(&db).for_patient(&patient_id)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// Amend a record. `amendment_json` holds only the fields to change.
    pub fn amend_medical_record(
        &self,
        record_id: String,
        amendment_json: String,
        actor: String,
    ) -> Result<FfiMedicalRecord, ClinicFfiError> {
        let amendment = serde_json::from_str(&amendment_json)?;
        let db = self.db.lock()?;
        Ok(MedicalRecords::new(&db).amend(&record_id, &amendment, &actor)?.into())
    }

    pub fn add_prescription(
        &self,
        record_id: String,
        prescription: FfiPrescriptionInput,
        actor: String,
    ) -> Result<FfiPrescription, ClinicFfiError> {
        let input = PrescriptionInput {
            item_id: prescription.item_id,
            custom_medicine_name: prescription.custom_medicine_name,
            quantity: prescription.quantity,
            dosage: prescription.dosage,
            duration: prescription.duration,
            instructions: prescription.instructions,
            unit_price: prescription.unit_price,
        };
        let db = self.db.lock()?;
        let added = MedicalRecords::new(&db).add_prescription(&record_id, &input, &actor)?;
        Ok(FfiPrescription {
            prescription_id: added.prescription_id,
            medicine_name: added.medicine_name,
            quantity: added.quantity,
            dosage: added.dosage,
            unit_price: added.unit_price,
            total_price: added.total_price,
        })
    }

    pub fn attach_image(
        &self,
        record_id: String,
        path: String,
        title: String,
        description: String,
        image_type: String,
        actor: String,
    ) -> Result<String, ClinicFfiError> {
        let image_type = models::ImageType::parse(&image_type).ok_or_else(|| invalid("image_type", &image_type))?;
        let upload = ImageUpload {
            path,
            title,
            description,
            image_type,
        };
        let db = self.db.lock()?;
        Ok(MedicalRecords::new(&db).attach_image(&record_id, &upload, &actor)?.image_id)
    }

    // =========================================================================
    // Billing
    // =========================================================================

    pub fn get_billing(&self, billing_id: String) -> Result<FfiBilling, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(BillingLedger::new(&db).get(&billing_id)?.into())
    }

    pub fn get_billing_for_booking(&self, booking_id: String) -> Result<FfiBilling, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(BillingLedger::new(&db).for_booking(&booking_id)?.into())
    }

    pub fn record_payment(
        &self,
        billing_id: String,
        amount: i64,
        method: String,
        reference_number: Option<String>,
        notes: Option<String>,
        actor: String,
    ) -> Result<FfiBilling, ClinicFfiError> {
        let request = PaymentRequest {
            billing_id,
            amount,
            method: parse_method(&method)?,
            reference_number,
            notes,
        };
        let db = self.db.lock()?;
        Ok(BillingLedger::new(&db).record_payment(&request, &actor)?.billing.into())
    }

    pub fn update_billing_fees(
        &self,
        billing_id: String,
        service_fee: Option<i64>,
        additional_fee: Option<i64>,
        discount: Option<i64>,
        notes: Option<String>,
        actor: String,
    ) -> Result<FfiBilling, ClinicFfiError> {
        let update = FeeUpdate {
            service_fee,
            additional_fee,
            discount,
            notes,
        };
        let db = self.db.lock()?;
        Ok(BillingLedger::new(&db).update_fees(&billing_id, &update, &actor)?.into())
    }

    pub fn list_payments(&self, billing_id: String) -> Result<Vec<FfiPayment>, ClinicFfiError> {
        let db = self.db.lock()?;
        let payments = BillingLedger::new(&db).payments(&billing_id)?;
        Ok(payments.into_iter().map(|p| p.into()).collect())
    }

    pub fn list_billings(
        &self,
        from: Option<String>,
        to: Option<String>,
        paid: Option<bool>,
    ) -> Result<Vec<FfiBilling>, ClinicFfiError> {
        let filter = BillingFilter {
            from: parse_date_arg(from)?,
            to: parse_date_arg(to)?,
            paid,
        };
        let db = self.db.lock()?;
        Ok(BillingLedger::new(&db).list(&filter)?.into_iter().map(|b| b.into()).collect())
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    pub fn create_inventory_item(
        &self,
        item: FfiNewInventoryItem,
        actor: String,
    ) -> Result<FfiInventoryItem, ClinicFfiError> {
        let new_item = NewInventoryItem {
            name: item.name,
            description: item.description,
            category: ItemCategory::parse(&item.category).ok_or_else(|| invalid("category", &item.category))?,
            unit_price: item.unit_price,
            quantity: item.quantity,
            reorder_threshold: item.reorder_threshold,
            expiry_date: parse_date_arg(item.expiry_date)?,
        };
        let db = self.db.lock()?;
        Ok(InventoryLedger::new(&db).create_item(&new_item, &actor)?.into())
    }

    /// Change stock on hand. `transaction_type` is `stock_in`, `stock_out`
    /// or `adjustment`.
    pub fn adjust_stock(
        &self,
        item_id: String,
        delta: i64,
        transaction_type: String,
        note: String,
        actor: String,
    ) -> Result<FfiInventoryItem, ClinicFfiError> {
        let adjustment = StockAdjustment {
            item_id,
            delta,
            transaction_type: TransactionType::parse(&transaction_type)
                .ok_or_else(|| invalid("transaction_type", &transaction_type))?,
            note,
        };
        let db = self.db.lock()?;
        let StockMovement { item, .. } = InventoryLedger::new(&db).adjust_stock(&adjustment, &actor)?;
        Ok(item.into())
    }

    pub fn get_inventory_item(&self, item_id: String) -> Result<FfiInventoryItem, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(InventoryLedger::new(&db).get_item(&item_id)?.into())
    }

    /// List items. `status` is `in_stock`, `low_stock` or `out_of_stock`.
    pub fn list_inventory(
        &self,
        category: Option<String>,
        status: Option<String>,
    ) -> Result<Vec<FfiInventoryItem>, ClinicFfiError> {
        let category = match category {
            Some(c) => Some(ItemCategory::parse(&c).ok_or_else(|| invalid("category", &c))?),
            None => None,
        };
        let status = match status.as_deref() {
            None => None,
            Some("in_stock") => Some(StockStatus::InStock),
            Some("low_stock") => Some(StockStatus::LowStock),
            Some("out_of_stock") => Some(StockStatus::OutOfStock),
            Some(other) => return Err(invalid("status", other)),
        };
        let db = self.db.lock()?;
        let items = InventoryLedger::new(&db).list_items(&InventoryFilter { category, status })?;
        Ok(items.into_iter().map(|i| i.into()).collect())
    }

    // =========================================================================
    // Point of Sale
    // =========================================================================

    /// Sell immediately: reserve stock, take payment, issue the receipt.
    pub fn complete_sale(&self, sale: FfiSaleRequest, actor: String) -> Result<FfiSale, ClinicFfiError> {
        let request = sale.try_into()?;
        let db = self.db.lock()?;
        Ok(PointOfSale::new(&db).complete_sale(&request, &actor)?.into())
    }

    /// Open a draft sale holding its stock.
    pub fn open_sale(&self, sale: FfiSaleRequest, actor: String) -> Result<FfiSale, ClinicFfiError> {
        let request = sale.try_into()?;
        let db = self.db.lock()?;
        Ok(PointOfSale::new(&db).open_sale(&request, &actor)?.into())
    }

    pub fn finalize_sale(
        &self,
        sale_id: String,
        payment_method: String,
        amount_received: Option<i64>,
        reference_number: Option<String>,
        actor: String,
    ) -> Result<FfiSale, ClinicFfiError> {
        let tender = Tender {
            payment_method: parse_method(&payment_method)?,
            amount_received,
            reference_number,
        };
        let db = self.db.lock()?;
        Ok(PointOfSale::new(&db).finalize_sale(&sale_id, &tender, &actor)?.into())
    }

    pub fn cancel_sale(&self, sale_id: String, actor: String) -> Result<FfiSale, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(PointOfSale::new(&db).cancel_sale(&sale_id, &actor)?.into())
    }

    pub fn list_sales(
        &self,
        from: Option<String>,
        to: Option<String>,
        status: Option<String>,
    ) -> Result<Vec<FfiSaleSummary>, ClinicFfiError> {
        let status = match status {
            Some(s) => Some(SaleStatus::parse(&s).ok_or_else(|| invalid("status", &s))?),
            None => None,
        };
        let filter = SaleFilter {
            from: parse_date_arg(from)?,
            to: parse_date_arg(to)?,
            status,
        };
        let db = self.db.lock()?;
        let sales = PointOfSale::new(&db).list(&filter)?;
        Ok(sales.into_iter().map(|s| s.into()).collect())
    }

    // =========================================================================
    // Reports & Audit
    // =========================================================================

    /// Dashboard statistics with `today` (`YYYY-MM-DD`) as the reference day.
    pub fn dashboard(&self, today: String) -> Result<FfiDashboard, ClinicFfiError> {
        let today = parse_request_date(&today)?;
        let db = self.db.lock()?;
        Ok(DashboardStats::compute(&db, &today)?.into())
    }

    pub fn export_bookings_csv(
        &self,
        from: Option<String>,
        to: Option<String>,
        status: Option<String>,
    ) -> Result<String, ClinicFfiError> {
        let filter = booking_filter(from, to, status)?;
        let db = self.db.lock()?;
        Ok(ReportExporter::new(&db).bookings(&filter)?.to_csv())
    }

    pub fn export_bookings_json(
        &self,
        from: Option<String>,
        to: Option<String>,
        status: Option<String>,
    ) -> Result<String, ClinicFfiError> {
        let filter = booking_filter(from, to, status)?;
        let db = self.db.lock()?;
        Ok(ReportExporter::new(&db).bookings(&filter)?.to_json()?)
    }

    pub fn export_billings_csv(
        &self,
        from: Option<String>,
        to: Option<String>,
        paid: Option<bool>,
    ) -> Result<String, ClinicFfiError> {
        let filter = BillingFilter {
            from: parse_date_arg(from)?,
            to: parse_date_arg(to)?,
            paid,
        };
        let db = self.db.lock()?;
        Ok(ReportExporter::new(&db).billings(&filter)?.to_csv())
    }

    pub fn export_stock_transactions_csv(
        &self,
        from: Option<String>,
        to: Option<String>,
        item_id: Option<String>,
    ) -> Result<String, ClinicFfiError> {
        let filter = StockTransactionFilter {
            from: parse_date_arg(from)?,
            to: parse_date_arg(to)?,
            item_id,
            transaction_type: None,
        };
        let db = self.db.lock()?;
        Ok(ReportExporter::new(&db).stock_transactions(&filter)?.to_csv())
    }

    /// Full activity log with chain verification, as JSON.
    pub fn export_audit_json(&self) -> Result<String, ClinicFfiError> {
        let db = self.db.lock()?;
        Ok(AuditExport::build(&db)?.to_json()?)
    }

    /// Verify the activity chain.
    pub fn verify_audit_chain(&self) -> Result<FfiChainStatus, ClinicFfiError> {
        let db = self.db.lock()?;
        let verification = ActivityLog::new(&db).verify()?;
        Ok(FfiChainStatus {
            entries_checked: verification.entries_checked as u32,
            intact: verification.is_intact(),
            first_broken: verification.first_broken,
        })
    }
}

fn booking_filter(
    from: Option<String>,
    to: Option<String>,
    status: Option<String>,
) -> Result<BookingFilter, ClinicFfiError> {
    let status = match status {
        Some(s) => Some(BookingStatus::parse(&s).ok_or_else(|| invalid("status", &s))?),
        None => None,
    };
    Ok(BookingFilter {
        from: parse_date_arg(from)?,
        to: parse_date_arg(to)?,
        status,
        service_id: None,
    })
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe service.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiService {
    pub service_id: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub active: bool,
}

impl From<Service> for FfiService {
    fn from(service: Service) -> Self {
        Self {
            service_id: service.service_id,
            name: service.name,
            description: service.description,
            price: service.price,
            active: service.active,
        }
    }
}

/// FFI-safe booking request. Dates are `YYYY-MM-DD`, times `HH:MM`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBookingRequest {
    pub service_id: String,
    pub date: String,
    pub time: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub notes: String,
}

impl From<FfiBookingRequest> for BookingRequest {
    fn from(request: FfiBookingRequest) -> Self {
        BookingRequest {
            service_id: request.service_id,
            date: request.date,
            time: request.time,
            patient_name: request.patient_name,
            patient_email: request.patient_email,
            patient_phone: request.patient_phone,
            notes: request.notes,
        }
    }
}

/// FFI-safe booking.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBooking {
    pub booking_id: String,
    pub service_id: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub date: String,
    pub time: String,
    pub status: String,
    pub consultation_status: String,
    pub notes: String,
    pub created_at: String,
}

impl From<Booking> for FfiBooking {
    fn from(booking: Booking) -> Self {
        Self {
            booking_id: booking.booking_id,
            service_id: booking.service_id,
            patient_name: booking.patient_name,
            patient_email: booking.patient_email,
            patient_phone: booking.patient_phone,
            date: booking.date.format("%Y-%m-%d").to_string(),
            time: booking.time.format("%H:%M").to_string(),
            status: booking.status.as_str().to_string(),
            consultation_status: booking.consultation_status.as_str().to_string(),
            notes: booking.notes,
            created_at: booking.created_at,
        }
    }
}

/// FFI-safe acceptance result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAcceptance {
    pub booking: FfiBooking,
    pub patient: FfiPatient,
    pub patient_created: bool,
    pub record_id: String,
    pub billing: FfiBilling,
    /// Reason text when the patient match needs review
    pub match_flag_reason: Option<String>,
}

impl From<AcceptanceOutcome> for FfiAcceptance {
    fn from(outcome: AcceptanceOutcome) -> Self {
        Self {
            booking: outcome.booking.into(),
            patient: outcome.patient.into(),
            patient_created: outcome.patient_created,
            record_id: outcome.record.record_id,
            billing: outcome.billing.into(),
            match_flag_reason: outcome.match_flag.map(|f| f.reason),
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub patient_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub blood_type: String,
    pub allergies: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            patient_id: patient.patient_id,
            full_name: patient.full_name,
            email: patient.email,
            phone: patient.phone,
            blood_type: patient.blood_type.as_str().to_string(),
            allergies: patient.allergies,
        }
    }
}

/// FFI-safe patient match flag.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMatchFlag {
    pub flag_id: String,
    pub booking_id: String,
    pub patient_id: String,
    pub candidate_ids: Vec<String>,
    pub reason: String,
    pub resolved: bool,
}

impl From<PatientMatchFlag> for FfiMatchFlag {
    fn from(flag: PatientMatchFlag) -> Self {
        Self {
            flag_id: flag.flag_id,
            booking_id: flag.booking_id,
            patient_id: flag.patient_id,
            candidate_ids: flag.candidate_ids,
            reason: flag.reason,
            resolved: flag.resolved,
        }
    }
}

/// FFI-safe medical record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicalRecord {
    pub record_id: String,
    pub patient_id: String,
    pub booking_id: Option<String>,
    pub visit_date: String,
    pub chief_complaint: String,
    pub symptoms: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub follow_up_date: Option<String>,
    pub notes: String,
}

impl From<MedicalRecord> for FfiMedicalRecord {
    fn from(record: MedicalRecord) -> Self {
        Self {
            record_id: record.record_id,
            patient_id: record.patient_id,
            booking_id: record.booking_id,
            visit_date: record.visit_date,
            chief_complaint: record.chief_complaint,
            symptoms: record.symptoms,
            diagnosis: record.diagnosis,
            treatment_plan: record.treatment_plan,
            follow_up_date: record.follow_up_date.map(|d| d.format("%Y-%m-%d").to_string()),
            notes: record.notes,
        }
    }
}

/// FFI-safe prescription input. Give `item_id` or `custom_medicine_name`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionInput {
    pub item_id: Option<String>,
    pub custom_medicine_name: Option<String>,
    pub quantity: i64,
    pub dosage: String,
    pub duration: String,
    pub instructions: String,
    pub unit_price: Option<i64>,
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub prescription_id: String,
    pub medicine_name: String,
    pub quantity: i64,
    pub dosage: String,
    pub unit_price: i64,
    pub total_price: i64,
}

/// FFI-safe billing. Amounts are centavos.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBilling {
    pub billing_id: String,
    pub booking_id: String,
    pub service_fee: i64,
    pub medicine_fee: i64,
    pub additional_fee: i64,
    pub discount: i64,
    pub total_amount: i64,
    pub amount_paid: i64,
    pub balance: i64,
    pub paid: bool,
    pub status: String,
}

impl From<Billing> for FfiBilling {
    fn from(billing: Billing) -> Self {
        Self {
            status: billing.status().label().to_string(),
            billing_id: billing.billing_id,
            booking_id: billing.booking_id,
            service_fee: billing.service_fee,
            medicine_fee: billing.medicine_fee,
            additional_fee: billing.additional_fee,
            discount: billing.discount,
            total_amount: billing.total_amount,
            amount_paid: billing.amount_paid,
            balance: billing.balance,
            paid: billing.paid,
        }
    }
}

/// FFI-safe payment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPayment {
    pub payment_id: String,
    pub amount: i64,
    pub method: String,
    pub reference_number: Option<String>,
    pub recorded_by: String,
    pub paid_at: String,
}

impl From<Payment> for FfiPayment {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.payment_id,
            amount: payment.amount,
            method: payment.method.as_str().to_string(),
            reference_number: payment.reference_number,
            recorded_by: payment.recorded_by,
            paid_at: payment.paid_at,
        }
    }
}

/// FFI-safe new inventory item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewInventoryItem {
    pub name: String,
    pub description: String,
    /// `medicine`, `equipment` or `miscellaneous`
    pub category: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub reorder_threshold: i64,
    pub expiry_date: Option<String>,
}

/// FFI-safe inventory item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInventoryItem {
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub reorder_threshold: i64,
    pub status: String,
    pub expiry_date: Option<String>,
}

impl From<InventoryItem> for FfiInventoryItem {
    fn from(item: InventoryItem) -> Self {
        Self {
            status: item.status().label().to_string(),
            item_id: item.item_id,
            name: item.name,
            category: item.category.as_str().to_string(),
            unit_price: item.unit_price,
            quantity: item.quantity,
            reorder_threshold: item.reorder_threshold,
            expiry_date: item.expiry_date.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// FFI-safe cart line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCartLine {
    pub item_id: String,
    pub quantity: i64,
    pub unit_price: Option<i64>,
}

/// FFI-safe sale request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaleRequest {
    /// `walk_in` or `patient`
    pub sale_type: String,
    pub patient_id: Option<String>,
    pub customer_name: String,
    pub lines: Vec<FfiCartLine>,
    /// Whole percent; ignored when `discount_amount` is set
    pub discount_percent: Option<u8>,
    pub discount_amount: Option<i64>,
    pub payment_method: String,
    pub amount_received: Option<i64>,
    pub reference_number: Option<String>,
    pub notes: String,
}

impl TryFrom<FfiSaleRequest> for SaleRequest {
    type Error = ClinicFfiError;

    fn try_from(sale: FfiSaleRequest) -> Result<Self, Self::Error> {
        let discount = match (sale.discount_amount, sale.discount_percent) {
            (Some(amount), _) => SaleDiscount::Amount(amount),
            (None, Some(percent)) => SaleDiscount::Percent(percent),
            (None, None) => SaleDiscount::None,
        };
        Ok(SaleRequest {
            sale_type: SaleType::parse(&sale.sale_type).ok_or_else(|| invalid("sale_type", &sale.sale_type))?,
            patient_id: sale.patient_id,
            customer_name: sale.customer_name,
            lines: sale
                .lines
                .into_iter()
                .map(|l| CartLine {
                    item_id: l.item_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
            discount,
            payment_method: parse_method(&sale.payment_method)?,
            amount_received: sale.amount_received,
            reference_number: sale.reference_number,
            notes: sale.notes,
        })
    }
}

/// FFI-safe sale line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaleLine {
    pub item_id: String,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
}

/// FFI-safe sale summary (no lines).
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSaleSummary {
    pub sale_id: String,
    pub receipt_number: String,
    pub customer_name: String,
    pub total_amount: i64,
    pub status: String,
    pub sale_date: String,
}

impl From<PosSale> for FfiSaleSummary {
    fn from(sale: PosSale) -> Self {
        Self {
            sale_id: sale.sale_id,
            receipt_number: sale.receipt_number,
            customer_name: sale.customer_name,
            total_amount: sale.total_amount,
            status: sale.status.as_str().to_string(),
            sale_date: sale.sale_date,
        }
    }
}

/// FFI-safe sale with lines.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSale {
    pub sale_id: String,
    pub receipt_number: String,
    pub status: String,
    pub customer_name: String,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub payment_method: String,
    pub amount_received: i64,
    pub change_amount: i64,
    pub lines: Vec<FfiSaleLine>,
}

impl From<SaleReceipt> for FfiSale {
    fn from(receipt: SaleReceipt) -> Self {
        let sale = receipt.sale;
        Self {
            sale_id: sale.sale_id,
            receipt_number: sale.receipt_number,
            status: sale.status.as_str().to_string(),
            customer_name: sale.customer_name,
            subtotal: sale.subtotal,
            discount_amount: sale.discount_amount,
            total_amount: sale.total_amount,
            payment_method: sale.payment_method.as_str().to_string(),
            amount_received: sale.amount_received,
            change_amount: sale.change_amount,
            lines: receipt
                .items
                .into_iter()
                .map(|i| FfiSaleLine {
                    item_id: i.item_id,
                    item_name: i.item_name,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    line_total: i.line_total,
                })
                .collect(),
        }
    }
}

/// FFI-safe dashboard statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDashboard {
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
    pub cancelled_bookings: i64,
    pub completed_bookings: i64,
    pub todays_bookings: i64,
    pub patients: i64,
    pub medical_records: i64,
    pub open_match_flags: i64,
    pub inventory_items: i64,
    pub low_stock_items: i64,
    pub out_of_stock_items: i64,
    pub paid_billings: i64,
    pub partially_paid_billings: i64,
    pub unpaid_billings: i64,
    pub total_billed: i64,
    pub total_collected: i64,
    pub total_outstanding: i64,
    pub pos_revenue: i64,
}

impl From<DashboardStats> for FfiDashboard {
    fn from(stats: DashboardStats) -> Self {
        Self {
            pending_bookings: stats.bookings.pending,
            confirmed_bookings: stats.bookings.confirmed,
            cancelled_bookings: stats.bookings.cancelled,
            completed_bookings: stats.bookings.completed,
            todays_bookings: stats.todays_bookings,
            patients: stats.patients,
            medical_records: stats.medical_records,
            open_match_flags: stats.open_match_flags,
            inventory_items: stats.inventory_items,
            low_stock_items: stats.low_stock_items,
            out_of_stock_items: stats.out_of_stock_items,
            paid_billings: stats.paid_billings,
            partially_paid_billings: stats.partially_paid_billings,
            unpaid_billings: stats.unpaid_billings,
            total_billed: stats.total_billed,
            total_collected: stats.total_collected,
            total_outstanding: stats.total_outstanding,
            pos_revenue: stats.pos_revenue,
        }
    }
}

/// FFI-safe audit chain status.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChainStatus {
    pub entries_checked: u32,
    pub intact: bool,
    pub first_broken: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_with_service() -> (Arc<ClinicCore>, FfiService) {
        let core = open_database_in_memory().unwrap();
        let service = core
            .create_service("Consultation".into(), String::new(), 50000, "admin".into())
            .unwrap();
        (core, service)
    }

    #[test]
    fn test_error_kind_survives_ffi() {
        let (core, service) = core_with_service();
        let request = FfiBookingRequest {
            service_id: service.service_id,
            date: "2000-01-03".into(),
            time: "09:00".into(),
            patient_name: "Ana Reyes".into(),
            patient_email: "ana@example.com".into(),
            patient_phone: "09171234567".into(),
            notes: String::new(),
        };
        match core.submit_booking(request) {
            Err(ClinicFfiError::Validation { code, .. }) => assert_eq!(code, "invalid_date"),
            other => panic!("expected validation error, got {:?}", other.map(|b| b.status)),
        }
    }

    #[test]
    fn test_rules_round_trip() {
        let core = open_database_in_memory().unwrap();
        core.set_rules_json(r#"{"clinic_name": "Derma Clinic", "slot_minutes": 60}"#.into())
            .unwrap();
        let json = core.get_rules_json().unwrap();
        let rules = ClinicRules::from_json_str(&json).unwrap();
        assert_eq!(rules.clinic_name, "Derma Clinic");
        assert_eq!(rules.slot_minutes, 60);

        assert!(matches!(
            core.set_rules_json(r#"{"slot_minutes": 0}"#.into()),
            Err(ClinicFfiError::Validation { .. })
        ));
    }

    #[test]
    fn test_sale_through_ffi() {
        let core = open_database_in_memory().unwrap();
        let item = core
            .create_inventory_item(
                FfiNewInventoryItem {
                    name: "Sunscreen SPF50".into(),
                    description: String::new(),
                    category: "miscellaneous".into(),
                    unit_price: 45000,
                    quantity: 3,
                    reorder_threshold: 1,
                    expiry_date: Some("2031-06-30".into()),
                },
                "admin".into(),
            )
            .unwrap();

        let sale = core
            .complete_sale(
                FfiSaleRequest {
                    sale_type: "walk_in".into(),
                    patient_id: None,
                    customer_name: "Ben".into(),
                    lines: vec![FfiCartLine {
                        item_id: item.item_id.clone(),
                        quantity: 2,
                        unit_price: None,
                    }],
                    discount_percent: None,
                    discount_amount: Some(10000),
                    payment_method: "cash".into(),
                    amount_received: Some(100000),
                    reference_number: None,
                    notes: String::new(),
                },
                "cashier".into(),
            )
            .unwrap();
        assert_eq!(sale.total_amount, 80000);
        assert_eq!(sale.change_amount, 20000);
        assert_eq!(core.get_inventory_item(item.item_id).unwrap().quantity, 1);
        assert_eq!(core.dashboard("2030-01-02".into()).unwrap().pos_revenue, 80000);
        assert!(core.verify_audit_chain().unwrap().intact);
    }
}

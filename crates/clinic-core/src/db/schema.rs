//! SQLite schema definition.

/// Complete database schema for the clinic core.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Clinic Settings (single row)
-- ============================================================================

CREATE TABLE IF NOT EXISTS clinic_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    rules TEXT NOT NULL,                          -- JSON ClinicRules
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS blocked_dates (
    date TEXT PRIMARY KEY,                        -- YYYY-MM-DD
    reason TEXT NOT NULL DEFAULT '',
    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Services
-- ============================================================================

CREATE TABLE IF NOT EXISTS services (
    service_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price INTEGER NOT NULL CHECK (price >= 0),    -- centavos
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Bookings
-- ============================================================================

CREATE TABLE IF NOT EXISTS bookings (
    booking_id TEXT PRIMARY KEY,
    service_id TEXT NOT NULL REFERENCES services(service_id),
    patient_name TEXT NOT NULL,
    patient_email TEXT NOT NULL,
    patient_phone TEXT NOT NULL,
    date TEXT NOT NULL,                           -- YYYY-MM-DD
    time TEXT NOT NULL,                           -- HH:MM
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'cancelled', 'completed')),
    consultation_status TEXT NOT NULL DEFAULT 'not_yet'
        CHECK (consultation_status IN ('not_yet', 'ongoing', 'done')),
    notes TEXT NOT NULL DEFAULT '',
    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- A slot holds at most one non-cancelled booking
CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_active_slot
    ON bookings(service_id, date, time) WHERE status <> 'cancelled';
CREATE INDEX IF NOT EXISTS idx_bookings_date ON bookings(date);
CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status);

-- Only pending bookings may be hard-deleted
CREATE TRIGGER IF NOT EXISTS bookings_delete_pending_only BEFORE DELETE ON bookings
WHEN old.status <> 'pending'
BEGIN
    SELECT RAISE(ABORT, 'Only pending bookings can be deleted');
END;

-- ============================================================================
-- Patients & Clinical Records
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id TEXT PRIMARY KEY,
    user_account TEXT,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    phone_digits TEXT NOT NULL,                   -- digits only, for matching
    date_of_birth TEXT,
    address TEXT NOT NULL DEFAULT '',
    blood_type TEXT NOT NULL DEFAULT 'UK',
    allergies TEXT NOT NULL DEFAULT '',
    current_medications TEXT NOT NULL DEFAULT '',
    medical_history TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_email ON patients(lower(email));
CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone_digits);
CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(full_name);

CREATE TABLE IF NOT EXISTS patient_match_flags (
    flag_id TEXT PRIMARY KEY,
    booking_id TEXT NOT NULL REFERENCES bookings(booking_id),
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    candidate_ids TEXT NOT NULL DEFAULT '[]',     -- JSON array of patient IDs
    reason TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS medical_records (
    record_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    booking_id TEXT UNIQUE REFERENCES bookings(booking_id),
    visit_date TEXT NOT NULL,
    chief_complaint TEXT NOT NULL,
    symptoms TEXT NOT NULL DEFAULT '',
    diagnosis TEXT NOT NULL DEFAULT '',
    treatment_plan TEXT NOT NULL DEFAULT '',
    vitals TEXT NOT NULL DEFAULT '{}',            -- JSON Vitals
    follow_up_date TEXT,
    notes TEXT NOT NULL DEFAULT '',
    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_records_patient ON medical_records(patient_id);

CREATE TABLE IF NOT EXISTS prescriptions (
    prescription_id TEXT PRIMARY KEY,
    record_id TEXT NOT NULL REFERENCES medical_records(record_id),
    item_id TEXT REFERENCES inventory_items(item_id),
    medicine_name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    dosage TEXT NOT NULL,
    duration TEXT NOT NULL DEFAULT '',
    instructions TEXT NOT NULL DEFAULT '',
    unit_price INTEGER NOT NULL CHECK (unit_price >= 0),
    total_price INTEGER NOT NULL,
    prescribed_by TEXT NOT NULL,
    prescribed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_record ON prescriptions(record_id);

CREATE TABLE IF NOT EXISTS medical_images (
    image_id TEXT PRIMARY KEY,
    record_id TEXT NOT NULL REFERENCES medical_records(record_id),
    path TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    image_type TEXT NOT NULL DEFAULT 'clinical',
    uploaded_by TEXT NOT NULL,
    uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Billing
-- ============================================================================

CREATE TABLE IF NOT EXISTS billings (
    billing_id TEXT PRIMARY KEY,
    booking_id TEXT NOT NULL UNIQUE REFERENCES bookings(booking_id),
    service_fee INTEGER NOT NULL DEFAULT 0,
    medicine_fee INTEGER NOT NULL DEFAULT 0,
    additional_fee INTEGER NOT NULL DEFAULT 0,
    discount INTEGER NOT NULL DEFAULT 0,
    total_amount INTEGER NOT NULL,
    amount_paid INTEGER NOT NULL DEFAULT 0 CHECK (amount_paid >= 0),
    balance INTEGER NOT NULL CHECK (balance >= 0),
    paid INTEGER NOT NULL DEFAULT 0,
    notes TEXT NOT NULL DEFAULT '',
    issued_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (amount_paid + balance = total_amount),
    CHECK (paid = (balance = 0))
);

CREATE INDEX IF NOT EXISTS idx_billings_paid ON billings(paid);

CREATE TABLE IF NOT EXISTS payments (
    payment_id TEXT PRIMARY KEY,
    billing_id TEXT NOT NULL REFERENCES billings(billing_id),
    amount INTEGER NOT NULL CHECK (amount > 0),
    method TEXT NOT NULL,
    reference_number TEXT,
    notes TEXT,
    recorded_by TEXT NOT NULL,
    paid_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_payments_billing ON payments(billing_id);

-- Payments are immutable once recorded
CREATE TRIGGER IF NOT EXISTS payments_no_update BEFORE UPDATE ON payments
BEGIN
    SELECT RAISE(ABORT, 'Payments are immutable');
END;

CREATE TRIGGER IF NOT EXISTS payments_no_delete BEFORE DELETE ON payments
BEGIN
    SELECT RAISE(ABORT, 'Payments are immutable');
END;

-- ============================================================================
-- Inventory
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_items (
    item_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL CHECK (category IN ('medicine', 'equipment', 'miscellaneous')),
    unit_price INTEGER NOT NULL CHECK (unit_price >= 0),
    quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
    reorder_threshold INTEGER NOT NULL DEFAULT 0 CHECK (reorder_threshold >= 0),
    expiry_date TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_inventory_category ON inventory_items(category);

CREATE TABLE IF NOT EXISTS stock_transactions (
    transaction_id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL REFERENCES inventory_items(item_id),
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('stock_in', 'stock_out', 'adjustment')),
    delta INTEGER NOT NULL CHECK (delta <> 0),
    quantity_before INTEGER NOT NULL,
    quantity_after INTEGER NOT NULL CHECK (quantity_after >= 0),
    note TEXT NOT NULL DEFAULT '',
    performed_by TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (quantity_before + delta = quantity_after)
);

CREATE INDEX IF NOT EXISTS idx_stock_tx_item ON stock_transactions(item_id);
CREATE INDEX IF NOT EXISTS idx_stock_tx_created ON stock_transactions(created_at);

CREATE TRIGGER IF NOT EXISTS stock_transactions_no_update BEFORE UPDATE ON stock_transactions
BEGIN
    SELECT RAISE(ABORT, 'Stock transactions are immutable');
END;

CREATE TRIGGER IF NOT EXISTS stock_transactions_no_delete BEFORE DELETE ON stock_transactions
BEGIN
    SELECT RAISE(ABORT, 'Stock transactions are immutable');
END;

-- ============================================================================
-- Point of Sale
-- ============================================================================

CREATE TABLE IF NOT EXISTS pos_sales (
    sale_id TEXT PRIMARY KEY,
    receipt_number TEXT NOT NULL UNIQUE,
    sale_type TEXT NOT NULL CHECK (sale_type IN ('walk_in', 'patient')),
    patient_id TEXT REFERENCES patients(patient_id),
    customer_name TEXT NOT NULL,
    subtotal INTEGER NOT NULL,
    discount_amount INTEGER NOT NULL DEFAULT 0,
    total_amount INTEGER NOT NULL CHECK (total_amount >= 0),
    payment_method TEXT NOT NULL,
    amount_received INTEGER NOT NULL DEFAULT 0,
    change_amount INTEGER NOT NULL DEFAULT 0,
    reference_number TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'completed', 'cancelled')),
    notes TEXT NOT NULL DEFAULT '',
    created_by TEXT NOT NULL,
    sale_date TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_pos_sales_status ON pos_sales(status);

CREATE TABLE IF NOT EXISTS pos_sale_items (
    sale_item_id TEXT PRIMARY KEY,
    sale_id TEXT NOT NULL REFERENCES pos_sales(sale_id),
    item_id TEXT NOT NULL REFERENCES inventory_items(item_id),
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    unit_price INTEGER NOT NULL CHECK (unit_price >= 0),
    line_total INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pos_items_sale ON pos_sale_items(sale_id);

-- ============================================================================
-- Activity Log (Append-Only, hash-chained)
-- ============================================================================

CREATE TABLE IF NOT EXISTS activity_log (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    entity TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    description TEXT NOT NULL,
    prev_hash TEXT NOT NULL,
    hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_entity ON activity_log(entity, entity_id);

CREATE TRIGGER IF NOT EXISTS activity_log_no_update BEFORE UPDATE ON activity_log
BEGIN
    SELECT RAISE(ABORT, 'Activity log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS activity_log_no_delete BEFORE DELETE ON activity_log
BEGIN
    SELECT RAISE(ABORT, 'Activity log is append-only');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO services (service_id, name, price) VALUES ('svc', 'Consult', 50000)",
            [],
        )
        .unwrap();
        conn
    }

    fn insert_booking(conn: &Connection, id: &str, status: &str) -> rusqlite::Result<usize> {
        conn.execute(
            r#"
            INSERT INTO bookings (booking_id, service_id, patient_name, patient_email,
                                  patient_phone, date, time, status)
            VALUES (?1, 'svc', 'Ana', 'ana@example.com', '09171234567', '2030-01-02', '09:00', ?2)
            "#,
            [id, status],
        )
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
        // Re-running is idempotent
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_active_slot_unique() {
        let conn = setup();
        insert_booking(&conn, "b1", "pending").unwrap();

        // Same slot, still active
        assert!(insert_booking(&conn, "b2", "confirmed").is_err());

        // Cancelled bookings do not hold the slot
        insert_booking(&conn, "b3", "cancelled").unwrap();
        conn.execute("UPDATE bookings SET status = 'cancelled' WHERE booking_id = 'b1'", [])
            .unwrap();
        assert!(insert_booking(&conn, "b4", "pending").is_ok());
    }

    #[test]
    fn test_only_pending_bookings_deletable() {
        let conn = setup();
        insert_booking(&conn, "b1", "confirmed").unwrap();
        assert!(conn.execute("DELETE FROM bookings WHERE booking_id = 'b1'", []).is_err());

        conn.execute("UPDATE bookings SET status = 'cancelled' WHERE booking_id = 'b1'", [])
            .unwrap();
        insert_booking(&conn, "b2", "pending").unwrap();
        assert!(conn.execute("DELETE FROM bookings WHERE booking_id = 'b2'", []).is_ok());
    }

    #[test]
    fn test_billing_invariant_checks() {
        let conn = setup();
        insert_booking(&conn, "b1", "confirmed").unwrap();

        // balance does not agree with total
        let result = conn.execute(
            r#"
            INSERT INTO billings (billing_id, booking_id, total_amount, amount_paid, balance, paid)
            VALUES ('bill', 'b1', 50000, 0, 40000, 0)
            "#,
            [],
        );
        assert!(result.is_err());

        // paid flag disagrees with balance
        let result = conn.execute(
            r#"
            INSERT INTO billings (billing_id, booking_id, total_amount, amount_paid, balance, paid)
            VALUES ('bill', 'b1', 50000, 50000, 0, 0)
            "#,
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            r#"
            INSERT INTO billings (billing_id, booking_id, total_amount, amount_paid, balance, paid)
            VALUES ('bill', 'b1', 50000, 50000, 0, 1)
            "#,
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_inventory_quantity_never_negative() {
        let conn = setup();
        conn.execute(
            r#"
            INSERT INTO inventory_items (item_id, name, category, unit_price, quantity)
            VALUES ('item', 'Sunscreen', 'miscellaneous', 45000, 1)
            "#,
            [],
        )
        .unwrap();
        let result = conn.execute(
            "UPDATE inventory_items SET quantity = quantity - 2 WHERE item_id = 'item'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_activity_log_append_only() {
        let conn = setup();
        conn.execute(
            r#"
            INSERT INTO activity_log (actor, action, entity, entity_id, description, prev_hash, hash, created_at)
            VALUES ('staff', 'create', 'booking', 'b1', 'created', '', 'h1', '2030-01-01T00:00:00Z')
            "#,
            [],
        )
        .unwrap();
        assert!(conn.execute("UPDATE activity_log SET actor = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM activity_log", []).is_err());
    }
}

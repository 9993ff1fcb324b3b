//! Money helpers.
//!
//! All amounts are integer minor units (centavos) so ledger arithmetic is exact.

/// Amount in minor currency units (1 peso = 100 centavos).
pub type Cents = i64;

/// Format cents as a fixed two-decimal string, e.g. `150050` → `"1500.50"`.
pub fn format_cents(amount: Cents) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Percentage of an amount, rounded half-up to the nearest centavo.
pub fn percent_of(amount: Cents, percent: u8) -> Cents {
    let scaled = (i128::from(amount) * i128::from(percent) + 50) / 100;
    Cents::try_from(scaled).unwrap_or(amount)
}

//! Activity log models.

use serde::{Deserialize, Serialize};

/// Audited action kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Accept,
    Decline,
    Cancel,
    Complete,
    Payment,
    StockAdjust,
    Sale,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Create => "create",
            ActivityAction::Update => "update",
            ActivityAction::Delete => "delete",
            ActivityAction::Accept => "accept",
            ActivityAction::Decline => "decline",
            ActivityAction::Cancel => "cancel",
            ActivityAction::Complete => "complete",
            ActivityAction::Payment => "payment",
            ActivityAction::StockAdjust => "stock_adjust",
            ActivityAction::Sale => "sale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ActivityAction::Create),
            "update" => Some(ActivityAction::Update),
            "delete" => Some(ActivityAction::Delete),
            "accept" => Some(ActivityAction::Accept),
            "decline" => Some(ActivityAction::Decline),
            "cancel" => Some(ActivityAction::Cancel),
            "complete" => Some(ActivityAction::Complete),
            "payment" => Some(ActivityAction::Payment),
            "stock_adjust" => Some(ActivityAction::StockAdjust),
            "sale" => Some(ActivityAction::Sale),
            _ => None,
        }
    }
}

/// One hash-chained audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    /// Position in the chain, starting at 1
    pub sequence: i64,
    pub actor: String,
    pub action: ActivityAction,
    /// Entity kind (e.g. "booking", "billing")
    pub entity: String,
    pub entity_id: String,
    pub description: String,
    /// Hash of the previous entry (empty for the first)
    pub prev_hash: String,
    /// SHA-256 over `prev_hash` and this entry's canonical content
    pub hash: String,
    pub created_at: String,
}

// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four logical datasets every billing workbook must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetRole {
    Charges,
    Payment,
    Adjustment,
    PendingAr,
}

impl SheetRole {
    /// Declaration order; also the join order after the driving table.
    pub const ALL: [SheetRole; 4] = [
        SheetRole::Charges,
        SheetRole::Payment,
        SheetRole::Adjustment,
        SheetRole::PendingAr,
    ];

    /// Case-insensitive substring that identifies this role's sheet.
    pub fn keyword(&self) -> &'static str {
        match self {
            SheetRole::Charges => "charges",
            SheetRole::Payment => "payment",
            SheetRole::Adjustment => "adjustment",
            SheetRole::PendingAr => "pending ar",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SheetRole::Charges => "Charges",
            SheetRole::Payment => "Payment",
            SheetRole::Adjustment => "Adjustment",
            SheetRole::PendingAr => "Pending AR",
        }
    }
}

impl fmt::Display for SheetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vendor header and the canonical name it maps to.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct FieldMapping {
    pub vendor: String,
    pub canonical: String,
}

/// A (role, canonical name) pair from the registry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct CanonicalField {
    pub role: SheetRole,
    pub name: String,
}

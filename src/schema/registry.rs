use std::collections::BTreeMap;

use crate::error::EtlError;
use crate::schema::types::{CanonicalField, FieldMapping, SheetRole};

/// Canonical name of the claim identifier every role joins on.
pub const CLAIM_KEY: &str = "Claim No";

/// Immutable role → ordered (vendor, canonical) table used as the matching target.
///
/// Order matters: when two vendor names score equally against a header, the
/// one declared first wins.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistry {
    mappings: BTreeMap<SheetRole, Vec<FieldMapping>>,
}

impl SchemaRegistry {
    /// Build from explicit per-role mappings. Every role must be present and
    /// must map some vendor header onto the claim key.
    pub fn new(mappings: BTreeMap<SheetRole, Vec<FieldMapping>>) -> Result<Self, EtlError> {
        for role in SheetRole::ALL {
            let fields = mappings
                .get(&role)
                .ok_or_else(|| EtlError::Config(format!("no sheet mapping for role '{role}'")))?;
            if !fields.iter().any(|f| f.canonical == CLAIM_KEY) {
                return Err(EtlError::Config(format!(
                    "role '{role}' does not map any column to '{CLAIM_KEY}'"
                )));
            }
        }
        Ok(Self { mappings })
    }

    /// Mappings for one role, in declaration order.
    pub fn fields(&self, role: SheetRole) -> &[FieldMapping] {
        self.mappings.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every distinct canonical field, role by role.
    pub fn canonical_fields(&self) -> Vec<CanonicalField> {
        let mut out = Vec::new();
        for (role, fields) in &self.mappings {
            for f in fields {
                let field = CanonicalField {
                    role: *role,
                    name: f.canonical.clone(),
                };
                if !out.contains(&field) {
                    out.push(field);
                }
            }
        }
        out
    }
}

fn pairs(list: &[(&str, &str)]) -> Vec<FieldMapping> {
    list.iter()
        .map(|(vendor, canonical)| FieldMapping {
            vendor: vendor.to_string(),
            canonical: canonical.to_string(),
        })
        .collect()
}

impl Default for SchemaRegistry {
    /// Production billing-export headers.
    fn default() -> Self {
        let mut m = BTreeMap::new();
        m.insert(
            SheetRole::Charges,
            pairs(&[
                ("Account Num", "Claim No"),
                ("Svc Date", "DOS"),
                ("Batch Date", "Charge Entry Date"),
                ("Amount", "Billed Amount"),
                ("Responsible Provider", "Provider Name"),
                ("Insurance", "Payer/Insurance"),
                ("Group", "Facility Name"),
                ("FC", "Financial Class"),
            ]),
        );
        m.insert(
            SheetRole::Payment,
            pairs(&[
                ("Account Num", "Claim No"),
                ("Svc Date", "DOS"),
                ("Amount", "Paid Amount"),
                ("Insurance", "Payer/Insurance"),
                ("Responsible Provider", "Provider Name"),
                ("Batch Date", "Payment Entry Date"),
                ("Group", "Facility Name"),
                ("FC", "Financial Class"),
            ]),
        );
        m.insert(
            SheetRole::Adjustment,
            pairs(&[
                ("Account Num", "Claim No"),
                ("Svc Date", "DOS"),
                ("Amount", "Adjustment Amount"),
                ("Description", "Adjustment Description"),
                ("Insurance", "Payer/Insurance"),
                ("Responsible Provider", "Provider Name"),
                ("Batch Date", "Adjustment Entry Date"),
                ("Group", "Facility Name"),
                ("FC", "Financial Class"),
            ]),
        );
        m.insert(
            SheetRole::PendingAr,
            pairs(&[
                ("Account Num", "Claim No"),
                ("Reg Date", "Charge Entry Date"),
                ("Amount", "AR Balance"),
                ("Aging Bucket", "Aging Range"),
                ("Rcvbl Status", "Financial Status"),
                ("Insurance", "Payer/Insurance"),
                ("Responsible Provider", "Provider Name"),
                ("Group", "Facility Name"),
                ("FC", "Financial Class"),
            ]),
        );
        Self { mappings: m }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid() {
        let reg = SchemaRegistry::default();
        let rebuilt = SchemaRegistry::new(reg.mappings.clone()).unwrap();
        assert_eq!(rebuilt, reg);
        let amount = reg
            .fields(SheetRole::Payment)
            .iter()
            .find(|f| f.vendor == "Amount")
            .unwrap();
        assert_eq!(amount.canonical, "Paid Amount");
        assert_eq!(reg.fields(SheetRole::PendingAr)[0].canonical, CLAIM_KEY);
    }

    #[test]
    fn test_missing_role_rejected() {
        let mut m = SchemaRegistry::default().mappings;
        m.remove(&SheetRole::Adjustment);
        let err = SchemaRegistry::new(m).unwrap_err();
        assert!(err.to_string().contains("Adjustment"));
    }

    #[test]
    fn test_role_without_claim_key_rejected() {
        let mut m = SchemaRegistry::default().mappings;
        m.insert(SheetRole::Charges, pairs(&[("Amount", "Billed Amount")]));
        let err = SchemaRegistry::new(m).unwrap_err();
        assert!(err.to_string().contains("Claim No"));
    }

    #[test]
    fn test_canonical_fields_deduplicated_per_role() {
        let reg = SchemaRegistry::default();
        let fields = reg.canonical_fields();
        let charges: Vec<_> = fields
            .iter()
            .filter(|f| f.role == SheetRole::Charges)
            .collect();
        assert_eq!(charges.len(), 8);
    }
}

//! Excluded field constants
//!
//! Column name literals that must never participate in generated
//! relationships, rules, joins, or projections. Membership is case-exact:
//! `Product_Line` is excluded while `product_Line` is not.

use once_cell::sync::Lazy;
use std::collections::HashSet;

pub const EXCLUDED_FIELDS: &[&str] = &[
    "Product_Line",
    "product_line",
    "PRODUCT_LINE",
    "Product Line",
    "Business_Unit",
    "business_unit",
    "BUSINESS_UNIT",
    "Business Unit",
    "[Business Unit]",
    "BUSINESS_UNIT_CODE",
    "[Product Type]",
    "Product Type",
    "product_type",
    "PRODUCT_TYPE",
    "business unit",
];

static EXCLUDED_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| EXCLUDED_FIELDS.iter().copied().collect());

/// True iff `field` equals one of the excluded literals exactly.
pub fn is_excluded(field: &str) -> bool {
    EXCLUDED_SET.contains(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_membership_is_case_exact() {
        assert!(is_excluded("Product_Line"));
        assert!(is_excluded("business unit"));
        assert!(is_excluded("[Business Unit]"));
        assert!(!is_excluded("product_Line"));
        assert!(!is_excluded("Business_unit"));
        assert!(!is_excluded("Material"));
    }

    #[test]
    fn all_literals_present() {
        assert_eq!(EXCLUDED_FIELDS.len(), 15);
        for f in EXCLUDED_FIELDS {
            assert!(is_excluded(f));
        }
    }
}

//! Field-name to column-name derivation.
//!
//! # Invariants
//! - The transform is pure and locale-independent.
//! - Every uppercase ASCII or Unicode letter becomes `_` plus its lowercase form.

/// Converts a camelCase field name into its snake_case column name.
///
/// `mainDesignId` becomes `main_design_id`. Names that are already
/// snake_case pass through unchanged.
pub fn to_column_name(identifier: &str) -> String {
    let mut column = String::with_capacity(identifier.len() + 4);
    for ch in identifier.chars() {
        if ch.is_uppercase() {
            column.push('_');
            column.extend(ch.to_lowercase());
        } else {
            column.push(ch);
        }
    }
    column
}

#[cfg(test)]
mod tests {
    use super::to_column_name;

    #[test]
    fn camel_case_becomes_snake_case() {
        assert_eq!(to_column_name("mainDesignId"), "main_design_id");
        assert_eq!(to_column_name("dateCreated"), "date_created");
    }

    #[test]
    fn snake_case_is_unchanged() {
        assert_eq!(to_column_name("partner_id"), "partner_id");
        assert_eq!(to_column_name("id"), "id");
    }

    #[test]
    fn every_uppercase_letter_gets_an_underscore() {
        assert_eq!(to_column_name("d2cURL"), "d2c_u_r_l");
        assert_eq!(to_column_name("Id"), "_id");
    }
}

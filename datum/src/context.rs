//! Identifies where an encrypted field lives.

use std::fmt;

/// Table and column of an encrypted field.
///
/// When field binding is enabled the context string is authenticated as
/// associated data, so a ciphertext copied into another column or table no
/// longer decrypts.
///
/// # Example
///
/// ```
/// use datum::context::FieldContext;
///
/// let ctx = FieldContext::new("transactions", "amount");
/// assert_eq!(ctx.to_string(), "transactions|amount");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldContext {
    table_name: &'static str,
    column_name: &'static str,
}

impl FieldContext {
    /// Creates a new field context.
    #[must_use]
    pub const fn new(table_name: &'static str, column_name: &'static str) -> Self {
        Self { table_name, column_name }
    }

    /// Returns the table name.
    #[must_use]
    pub const fn table_name(&self) -> &'static str {
        self.table_name
    }

    /// Returns the logical column name.
    #[must_use]
    pub const fn column_name(&self) -> &'static str {
        self.column_name
    }
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.table_name, self.column_name)
    }
}

//! Table-scoped query descriptions.
//!
//! A [`Select`] is plain data; each [`super::Backend`] implementation renders
//! it in its own dialect (PostgREST query strings for [`super::RestBackend`],
//! row matching for the in-memory backend).

use std::fmt;

/// Tables of the fixed storefront schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    CartItems,
    Orders,
    OrderItems,
}

impl Table {
    /// Table name as exposed by the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::CartItems => "cart_items",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub value: String,
}

impl Filter {
    /// `column = value`.
    pub fn eq(column: &'static str, value: impl fmt::Display) -> Self {
        Self {
            column,
            value: value.to_string(),
        }
    }

    /// Operator form used in query strings and realtime filters (`eq.<value>`).
    #[must_use]
    pub fn operand(&self) -> String {
        format!("eq.{}", self.value)
    }

    /// Realtime filter expression (`column=eq.value`).
    #[must_use]
    pub fn expression(&self) -> String {
        format!("{}={}", self.column, self.operand())
    }
}

/// A related row embedded into each selected row.
///
/// `alias` is the key the related row appears under; `foreign_key` is the
/// column of the selected table referencing `table.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub alias: &'static str,
    pub table: Table,
    pub foreign_key: &'static str,
}

/// Sort order for a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub ascending: bool,
}

/// A select over one table with equality filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub table: Table,
    pub embeds: Vec<Embed>,
    pub filters: Vec<Filter>,
    pub order: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl Select {
    /// Select every column of `table`.
    #[must_use]
    pub const fn from(table: Table) -> Self {
        Self {
            table,
            embeds: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Embed the row of `table` referenced by `foreign_key` under `alias`.
    #[must_use]
    pub fn embed(mut self, alias: &'static str, table: Table, foreign_key: &'static str) -> Self {
        self.embeds.push(Embed {
            alias,
            table,
            foreign_key,
        });
        self
    }

    /// Add an equality filter.
    #[must_use]
    pub fn eq(mut self, column: &'static str, value: impl fmt::Display) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    /// Sort by `column`.
    #[must_use]
    pub fn order_by(mut self, column: &'static str, ascending: bool) -> Self {
        self.order = Some(SortOrder { column, ascending });
        self
    }

    /// Return at most `limit` rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST `select` parameter, e.g. `*,product:products(*)`.
    #[must_use]
    pub fn columns(&self) -> String {
        let mut columns = String::from("*");
        for embed in &self.embeds {
            columns.push_str(&format!(",{}:{}(*)", embed.alias, embed.table));
        }
        columns
    }
}

//! Composable row predicates.
//!
//! # Responsibility
//! - Describe query/delete conditions as data (column, operator, value).
//! - Render conditions to SQLite `WHERE` fragments with bound parameters.
//!
//! # Invariants
//! - Values are always bound, never interpolated into SQL text.
//! - Column and table names are compile-time constants.
//! - An empty `And` matches every row; an empty `Or` or `In` matches none.

use rusqlite::types::Value;

/// Comparison operator for [`Filter::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// Boolean condition over the columns of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row.
    All,
    Compare {
        column: &'static str,
        op: CompareOp,
        value: Value,
    },
    IsNull { column: &'static str },
    In {
        column: &'static str,
        values: Vec<Value>,
    },
    /// Follows a foreign key: `column` must reference an `id` of `table`
    /// whose row matches `filter`.
    Related {
        column: &'static str,
        table: &'static str,
        filter: Box<Filter>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(column: &'static str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn is_null(column: &'static str) -> Self {
        Self::IsNull { column }
    }

    pub fn one_of<V: Into<Value>>(
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn related(column: &'static str, table: &'static str, filter: Filter) -> Self {
        Self::Related {
            column,
            table,
            filter: Box::new(filter),
        }
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            Self::All => other,
            current => Self::And(vec![current, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            current => Self::Or(vec![current, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Appends this condition to `sql`, pushing bound values in order.
    pub(crate) fn write_sql(&self, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Self::All => sql.push_str("1 = 1"),
            Self::Compare { column, op, value } => {
                sql.push_str(column);
                sql.push(' ');
                sql.push_str(op.as_sql());
                sql.push_str(" ?");
                binds.push(value.clone());
            }
            Self::IsNull { column } => {
                sql.push_str(column);
                sql.push_str(" IS NULL");
            }
            Self::In { values, .. } if values.is_empty() => sql.push_str("1 = 0"),
            Self::In { column, values } => {
                sql.push_str(column);
                sql.push_str(" IN (");
                sql.push_str(&vec!["?"; values.len()].join(", "));
                sql.push(')');
                binds.extend(values.iter().cloned());
            }
            Self::Related {
                column,
                table,
                filter,
            } => {
                sql.push_str(column);
                sql.push_str(" IN (SELECT id FROM ");
                sql.push_str(table);
                sql.push_str(" WHERE ");
                filter.write_sql(sql, binds);
                sql.push(')');
            }
            Self::And(filters) => write_joined(filters, " AND ", "1 = 1", sql, binds),
            Self::Or(filters) => write_joined(filters, " OR ", "1 = 0", sql, binds),
            Self::Not(filter) => {
                sql.push_str("NOT (");
                filter.write_sql(sql, binds);
                sql.push(')');
            }
        }
    }

    /// Renders this condition as a standalone fragment.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut binds = Vec::new();
        self.write_sql(&mut sql, &mut binds);
        (sql, binds)
    }
}

fn write_joined(
    filters: &[Filter],
    separator: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<Value>,
) {
    if filters.is_empty() {
        sql.push_str(empty);
        return;
    }
    for (position, filter) in filters.iter().enumerate() {
        if position > 0 {
            sql.push_str(separator);
        }
        sql.push('(');
        filter.write_sql(sql, binds);
        sql.push(')');
    }
}

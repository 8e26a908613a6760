//! SQL text for metric tables and the cross-metric aggregate query.
//!
//! A query over metrics `A` and `B` grouped by `x` becomes
//!
//! ```text
//! SELECT "x", MAX("A") AS "A", MAX("B") AS "B" FROM (
//!     SELECT "x", SUM("sum") AS "A", NULL AS "B" FROM "A" GROUP BY "x"
//!     UNION ALL
//!     SELECT "x", NULL AS "A", AVG("avg") AS "B" FROM "B" GROUP BY "x"
//! ) GROUP BY "x" ORDER BY "x"
//! ```
//!
//! Each branch fills its own metric column and pads the others with NULL;
//! the outer `MAX` folds the branches back into one row per dimension tuple.

use crate::error::StorageError;
use crate::schema::ValueType;
use std::str::FromStr;

/// Aggregate columns present in every metric table, in table order.
pub const AGGREGATE_COLUMNS: [&str; 4] = ["sum", "avg", "min", "max"];

/// Reducer applied to a stored aggregate column at query time.
///
/// `Avg` averages the per-row averages; rows are not weighted by how many
/// samples produced them.
///
/// # Examples
///
/// ```
/// use perfmon_storage::Aggregation;
///
/// let agg: Aggregation = "AVG".parse().unwrap();
/// assert_eq!(agg, Aggregation::Avg);
/// assert!("median".parse::<Aggregation>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregation {
    pub fn sql_function(self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
        }
    }

    /// The stored column this aggregation reads.
    pub fn column(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Aggregation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            _ => Err(StorageError::UnknownAggregation(s.to_string())),
        }
    }
}

/// Quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().map(quote_ident).collect::<Vec<_>>().join(", ")
}

pub fn create_table_sql(table: &str, dimensions: &[&str], value_type: ValueType) -> String {
    let mut columns: Vec<String> = dimensions
        .iter()
        .map(|d| format!("{} TEXT", quote_ident(d)))
        .collect();
    columns.extend(
        AGGREGATE_COLUMNS
            .iter()
            .map(|c| format!("{} {}", quote_ident(c), value_type.sql_type())),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        columns.join(", ")
    )
}

pub fn insert_sql(table: &str, dimensions: &[&str]) -> String {
    let columns = quoted_list(dimensions.iter().copied().chain(AGGREGATE_COLUMNS));
    let placeholders = (1..=dimensions.len() + AGGREGATE_COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_ident(table)
    )
}

/// Branch of the union for `metrics[index]`, read from its table.
///
/// Requested dimensions that the table does not have are selected as NULL
/// and left out of the GROUP BY.
pub fn metric_subquery(
    index: usize,
    metrics: &[&str],
    aggregation: Aggregation,
    dimensions: &[&str],
    table_columns: &[String],
) -> String {
    let present: Vec<&str> = dimensions
        .iter()
        .copied()
        .filter(|d| table_columns.iter().any(|c| c == d))
        .collect();

    let mut select: Vec<String> = dimensions
        .iter()
        .map(|d| {
            if present.contains(d) {
                quote_ident(d)
            } else {
                format!("NULL AS {}", quote_ident(d))
            }
        })
        .collect();
    for (i, metric) in metrics.iter().enumerate() {
        if i == index {
            select.push(format!(
                "{}({}) AS {}",
                aggregation.sql_function(),
                quote_ident(aggregation.column()),
                quote_ident(metric)
            ));
        } else {
            select.push(format!("NULL AS {}", quote_ident(metric)));
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        select.join(", "),
        quote_ident(metrics[index])
    );
    if !present.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", quoted_list(present)));
    }
    sql
}

/// Branch standing in for a metric with no table: one all-NULL row.
pub fn null_subquery(metrics: &[&str], dimensions: &[&str]) -> String {
    let select: Vec<String> = dimensions
        .iter()
        .chain(metrics.iter())
        .map(|c| format!("NULL AS {}", quote_ident(c)))
        .collect();
    format!("SELECT {}", select.join(", "))
}

/// Outer query folding the union of `subqueries` into one row per
/// dimension tuple.
pub fn union_query(subqueries: &[String], metrics: &[&str], dimensions: &[&str]) -> String {
    let mut select: Vec<String> = dimensions.iter().map(|d| quote_ident(d)).collect();
    select.extend(
        metrics
            .iter()
            .map(|m| format!("MAX({0}) AS {0}", quote_ident(m))),
    );

    let mut sql = format!(
        "SELECT {} FROM ({})",
        select.join(", "),
        subqueries.join(" UNION ALL ")
    );
    if !dimensions.is_empty() {
        let group = quoted_list(dimensions.iter().copied());
        sql.push_str(&format!(" GROUP BY {group} ORDER BY {group}"));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_lists_dimensions_then_aggregates() {
        let sql = create_table_sql("core_utilization", &["core"], ValueType::Double);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"core_utilization\" (\"core\" TEXT, \"sum\" DOUBLE, \
             \"avg\" DOUBLE, \"min\" DOUBLE, \"max\" DOUBLE)"
        );
    }

    #[test]
    fn insert_numbers_every_placeholder() {
        let sql = insert_sql("m", &["a", "b"]);
        assert_eq!(
            sql,
            "INSERT INTO \"m\" (\"a\", \"b\", \"sum\", \"avg\", \"min\", \"max\") \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        );
    }

    #[test]
    fn subquery_pads_other_metrics_with_null() {
        let cols = vec!["x".to_string(), "sum".to_string()];
        let sql = metric_subquery(1, &["A", "B"], Aggregation::Max, &["x"], &cols);
        assert_eq!(
            sql,
            "SELECT \"x\", NULL AS \"A\", MAX(\"max\") AS \"B\" FROM \"B\" GROUP BY \"x\""
        );
    }

    #[test]
    fn subquery_nulls_missing_dimension() {
        let cols = vec!["sum".to_string()];
        let sql = metric_subquery(0, &["A"], Aggregation::Sum, &["x"], &cols);
        assert_eq!(sql, "SELECT NULL AS \"x\", SUM(\"sum\") AS \"A\" FROM \"A\"");
    }

    #[test]
    fn union_without_dimensions_has_no_group_by() {
        let sql = union_query(&["SELECT 1 AS \"A\"".to_string()], &["A"], &[]);
        assert_eq!(sql, "SELECT MAX(\"A\") AS \"A\" FROM (SELECT 1 AS \"A\")");
    }

    #[test]
    fn identifiers_with_quotes_are_escaped() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

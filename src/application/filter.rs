//! Compiles client filter descriptions into parameterized SQL.
//!
//! A [`FilterSpec`] is a closed list of [`Criterion`] values. [`compile`]
//! resolves every field through the column allow-list and emits a
//! [`QueryPlan`] whose text only ever contains `?` placeholders; all client
//! values travel separately as [`BindValue`]s in placeholder order.

use icelog_api_types::{Region, TimestampInput};
use thiserror::Error;

use crate::domain::{
    columns::{Column, ColumnKind},
    error::DomainError,
    timestamp::Timestamp,
};

use super::pagination::{OrderClause, PageWindow};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("unknown filter field `{0}`")]
    UnknownField(String),
    #[error("unknown sort key `{0}`")]
    UnknownSortKey(String),
    #[error("unknown sort order `{0}` (expected asc or desc)")]
    UnknownSortOrder(String),
    #[error("unknown time range `{0}` (expected today, week or month)")]
    UnknownTimeRange(String),
    #[error("invalid value `{value}` for field `{field}`")]
    InvalidValue { field: String, value: String },
    #[error(transparent)]
    Timestamp(#[from] DomainError),
}

/// A value bound to one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contains {
    pub field: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// `field = value`, with the value coerced to the column's type.
    Equals { field: String, value: String },
    /// Lower bound on the reading timestamp.
    Since(TimestampInput),
    /// Case-insensitive substring match on any of the listed fields.
    AnyContains(Vec<Contains>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    criteria: Vec<Criterion>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.criteria.push(Criterion::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn since(mut self, input: impl Into<TimestampInput>) -> Self {
        self.criteria.push(Criterion::Since(input.into()));
        self
    }

    pub fn any_contains<I, F, P>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, P)>,
        F: Into<String>,
        P: Into<String>,
    {
        let group = pairs
            .into_iter()
            .map(|(field, pattern)| Contains {
                field: field.into(),
                pattern: pattern.into(),
            })
            .collect();
        self.criteria.push(Criterion::AnyContains(group));
        self
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gte,
    Like,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Compare { column: Column, op: Operator },
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    fn write_sql(&self, out: &mut String) {
        match self {
            Predicate::Compare { column, op } => {
                out.push_str(column.as_sql());
                out.push_str(match op {
                    Operator::Eq => " = ?",
                    Operator::Gte => " >= ?",
                    Operator::Like => " LIKE ? ESCAPE '\\'",
                });
            }
            Predicate::AnyOf(group) => {
                out.push('(');
                for (index, predicate) in group.iter().enumerate() {
                    if index > 0 {
                        out.push_str(" OR ");
                    }
                    predicate.write_sql(out);
                }
                out.push(')');
            }
        }
    }
}

/// Statement text plus its bound values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl CompiledQuery {
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    predicates: Vec<Predicate>,
    params: Vec<BindValue>,
    order: OrderClause,
    window: Option<PageWindow>,
}

impl QueryPlan {
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    pub fn order(&self) -> OrderClause {
        self.order
    }

    pub fn window(&self) -> Option<PageWindow> {
        self.window
    }

    pub fn with_order(mut self, order: OrderClause) -> Self {
        self.order = order;
        self
    }

    pub fn with_window(mut self, window: PageWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// `""` when unfiltered, otherwise ` WHERE ...` with a leading space.
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return String::new();
        }
        let mut out = String::from(" WHERE ");
        for (index, predicate) in self.predicates.iter().enumerate() {
            if index > 0 {
                out.push_str(" AND ");
            }
            predicate.write_sql(&mut out);
        }
        out
    }

    pub fn select(&self, table: &str, columns: &str) -> CompiledQuery {
        let mut sql = format!(
            "SELECT {columns} FROM {table}{} {}",
            self.where_clause(),
            self.order.to_sql()
        );
        let mut binds = self.params.clone();
        if let Some(window) = self.window {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(BindValue::Integer(clamp_i64(window.limit)));
            binds.push(BindValue::Integer(clamp_i64(window.offset)));
        }
        CompiledQuery { sql, binds }
    }

    /// Count matching rows; ordering and window are irrelevant here.
    pub fn count(&self, table: &str) -> CompiledQuery {
        self.aggregate(table, "COUNT(*)")
    }

    /// One row of aggregate expressions over the matching rows.
    pub fn aggregate(&self, table: &str, expressions: &str) -> CompiledQuery {
        CompiledQuery {
            sql: format!("SELECT {expressions} FROM {table}{}", self.where_clause()),
            binds: self.params.clone(),
        }
    }
}

/// Compile a filter description. Rules apply in a fixed order (equality,
/// then the timestamp bound, then substring groups) regardless of the order
/// criteria were added, so equal specs always produce identical plans.
pub fn compile(spec: &FilterSpec) -> Result<QueryPlan, FilterError> {
    let mut predicates = Vec::new();
    let mut params = Vec::new();

    for criterion in spec.criteria() {
        if let Criterion::Equals { field, value } = criterion {
            let column = resolve(field)?;
            params.push(coerce(column, value)?);
            predicates.push(Predicate::Compare {
                column,
                op: Operator::Eq,
            });
        }
    }

    for criterion in spec.criteria() {
        if let Criterion::Since(input) = criterion {
            let bound = Timestamp::parse_input(input)?;
            params.push(BindValue::Text(bound.to_string()));
            predicates.push(Predicate::Compare {
                column: Column::Timestamp,
                op: Operator::Gte,
            });
        }
    }

    for criterion in spec.criteria() {
        if let Criterion::AnyContains(group) = criterion {
            let mut alternatives = Vec::with_capacity(group.len());
            for Contains { field, pattern } in group {
                let column = resolve(field)?;
                let literal = strip_case_markers(pattern);
                if literal.is_empty() {
                    continue;
                }
                params.push(BindValue::Text(format!("%{}%", escape_like(literal))));
                alternatives.push(Predicate::Compare {
                    column,
                    op: Operator::Like,
                });
            }
            if !alternatives.is_empty() {
                predicates.push(Predicate::AnyOf(alternatives));
            }
        }
    }

    Ok(QueryPlan {
        predicates,
        params,
        order: OrderClause::default(),
        window: None,
    })
}

fn resolve(field: &str) -> Result<Column, FilterError> {
    Column::from_field(field).ok_or_else(|| FilterError::UnknownField(field.to_string()))
}

fn coerce(column: Column, raw: &str) -> Result<BindValue, FilterError> {
    let invalid = || FilterError::InvalidValue {
        field: column.as_sql().to_string(),
        value: raw.to_string(),
    };
    let value = raw.trim();
    match column.kind() {
        ColumnKind::Integer => value.parse().map(BindValue::Integer).map_err(|_| invalid()),
        ColumnKind::Real => value
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(BindValue::Real)
            .ok_or_else(invalid),
        ColumnKind::Timestamp => Ok(BindValue::Text(Timestamp::parse_text(value)?.to_string())),
        ColumnKind::Text if column == Column::Region => value
            .parse::<Region>()
            .map(|region| BindValue::Text(region.as_str().to_string()))
            .map_err(|_| invalid()),
        ColumnKind::Text => Ok(BindValue::Text(value.to_string())),
    }
}

/// Reduce `/text/i` and `(?i)text` to the literal substring.
fn strip_case_markers(pattern: &str) -> &str {
    let trimmed = pattern.trim();
    if let Some(rest) = trimmed.strip_prefix("(?i)") {
        return rest;
    }
    if let Some(inner) = trimmed
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix("/i"))
    {
        return inner;
    }
    trimmed
}

fn escape_like(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pagination::SortDirection;

    fn full_spec() -> FilterSpec {
        FilterSpec::new()
            .any_contains([("region", "bo"), ("collector", "bo")])
            .since("2024-01-01T00:00:00.500Z")
            .equals("region", "A")
    }

    #[test]
    fn empty_spec_has_no_where_clause() {
        let plan = compile(&FilterSpec::new()).unwrap();
        assert_eq!(plan.where_clause(), "");
        let count = plan.count("ice_readings");
        assert_eq!(count.sql, "SELECT COUNT(*) FROM ice_readings");
        assert!(count.binds.is_empty());
    }

    #[test]
    fn rules_apply_in_fixed_order() {
        let plan = compile(&full_spec()).unwrap();
        assert_eq!(
            plan.where_clause(),
            " WHERE region = ? AND timestamp >= ? AND (region LIKE ? ESCAPE '\\' OR collector LIKE ? ESCAPE '\\')"
        );
        assert_eq!(
            plan.params(),
            &[
                BindValue::Text("A".into()),
                BindValue::Text("2024-01-01 00:00:00".into()),
                BindValue::Text("%bo%".into()),
                BindValue::Text("%bo%".into()),
            ]
        );
    }

    #[test]
    fn placeholders_match_binds_for_every_shape() {
        let specs = [
            FilterSpec::new(),
            FilterSpec::new().equals("region", "B"),
            FilterSpec::new().since("2024-02-02"),
            FilterSpec::new().any_contains([("collector", "?what?")]),
            FilterSpec::new().equals("density", "1.5").equals("id", "7"),
            full_spec(),
        ];
        for spec in &specs {
            let plan = compile(spec).unwrap();
            let count = plan.count("ice_readings");
            assert_eq!(count.placeholder_count(), count.binds.len(), "{spec:?}");

            let paged = plan.with_window(PageWindow { limit: 10, offset: 20 });
            let select = paged.select("ice_readings", "*");
            assert_eq!(select.placeholder_count(), select.binds.len(), "{spec:?}");
        }
    }

    #[test]
    fn select_appends_order_and_window() {
        let plan = compile(&FilterSpec::new().equals("region", "C"))
            .unwrap()
            .with_order(OrderClause {
                column: Column::Thickness,
                direction: SortDirection::Asc,
            })
            .with_window(PageWindow { limit: 5, offset: 10 });
        let query = plan.select("ice_readings", "id");
        assert_eq!(
            query.sql,
            "SELECT id FROM ice_readings WHERE region = ? ORDER BY thickness ASC, id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            query.binds,
            vec![
                BindValue::Text("C".into()),
                BindValue::Integer(5),
                BindValue::Integer(10),
            ]
        );
    }

    #[test]
    fn aggregate_ignores_order_and_window() {
        let plan = compile(&FilterSpec::new().equals("region", "B"))
            .unwrap()
            .with_window(PageWindow { limit: 5, offset: 10 });
        let query = plan.aggregate("ice_readings", "COUNT(*), AVG(density)");
        assert_eq!(
            query.sql,
            "SELECT COUNT(*), AVG(density) FROM ice_readings WHERE region = ?"
        );
        assert_eq!(query.binds, vec![BindValue::Text("B".into())]);
    }

    #[test]
    fn unknown_fields_are_rejected_everywhere() {
        let cases = [
            FilterSpec::new().equals("password", "x"),
            FilterSpec::new().any_contains([("collector", "x"), ("1=1 OR owner", "x")]),
        ];
        for spec in &cases {
            assert!(matches!(compile(spec), Err(FilterError::UnknownField(_))));
        }
    }

    #[test]
    fn values_never_reach_statement_text() {
        let hostile = "x' OR '1'='1";
        let plan = compile(&FilterSpec::new().equals("collector", hostile).any_contains([
            ("collector", hostile),
        ]))
        .unwrap();
        let query = plan.select("ice_readings", "*");
        assert!(!query.sql.contains(hostile));
        assert!(!query.sql.contains("'1'"));
    }

    #[test]
    fn like_patterns_are_escaped_and_unmarked() {
        let plan = compile(&FilterSpec::new().any_contains([
            ("collector", "/Bo_b/i"),
            ("region", "(?i)50%"),
        ]))
        .unwrap();
        assert_eq!(
            plan.params(),
            &[
                BindValue::Text("%Bo\\_b%".into()),
                BindValue::Text("%50\\%%".into()),
            ]
        );
    }

    #[test]
    fn blank_search_adds_no_group() {
        let plan = compile(&FilterSpec::new().any_contains([("collector", "  ")])).unwrap();
        assert!(plan.predicates().is_empty());
    }

    #[test]
    fn equality_values_are_typed_per_column() {
        let plan = compile(
            &FilterSpec::new()
                .equals("id", "42")
                .equals("density", "1.25")
                .equals("createdAt", "2024-01-01T10:00:00+01:00"),
        )
        .unwrap();
        assert_eq!(
            plan.params(),
            &[
                BindValue::Integer(42),
                BindValue::Real(1.25),
                BindValue::Text("2024-01-01 09:00:00".into()),
            ]
        );
        assert!(matches!(
            compile(&FilterSpec::new().equals("density", "thick")),
            Err(FilterError::InvalidValue { .. })
        ));
        assert!(matches!(
            compile(&FilterSpec::new().equals("region", "Q")),
            Err(FilterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bad_timestamp_bound_is_rejected() {
        assert!(matches!(
            compile(&FilterSpec::new().since("last tuesday")),
            Err(FilterError::Timestamp(_))
        ));
    }
}

//! Page/limit/sort normalization for list queries.

use crate::domain::columns::Column;

use super::filter::FilterError;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const DEFAULT_SORT_COLUMN: Column = Column::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascend" | "ascending" | "1" => Ok(SortDirection::Asc),
            "desc" | "descend" | "descending" | "-1" => Ok(SortDirection::Desc),
            _ => Err(FilterError::UnknownSortOrder(raw.to_string())),
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderClause {
    pub column: Column,
    pub direction: SortDirection,
}

impl OrderClause {
    /// Render `ORDER BY`, breaking ties on `id` so page boundaries are stable.
    pub fn to_sql(&self) -> String {
        let direction = self.direction.as_sql();
        match self.column {
            Column::Id => format!("ORDER BY id {direction}"),
            column => format!("ORDER BY {} {direction}, id {direction}", column.as_sql()),
        }
    }
}

impl Default for OrderClause {
    fn default() -> Self {
        Self {
            column: DEFAULT_SORT_COLUMN,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u64,
    pub offset: u64,
}

/// Result of [`normalize`]: the requested page plus the clauses derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedPage {
    pub page: u64,
    pub window: PageWindow,
    pub order: OrderClause,
}

/// Coerce raw page/limit/sort inputs into a well-formed window and order clause.
///
/// Absent or unparsable page and limit fall back to their defaults, values
/// below 1 are raised to 1. Sort keys outside the column allow-list and
/// unknown sort orders are rejected.
pub fn normalize(
    page: Option<&str>,
    limit: Option<&str>,
    sort_field: Option<&str>,
    sort_order: Option<&str>,
) -> Result<NormalizedPage, FilterError> {
    let page = positive_or(page, DEFAULT_PAGE);
    let limit = positive_or(limit, DEFAULT_LIMIT);

    let column = match non_blank(sort_field) {
        Some(field) => Column::from_field(field)
            .ok_or_else(|| FilterError::UnknownSortKey(field.to_string()))?,
        None => DEFAULT_SORT_COLUMN,
    };
    let direction = match non_blank(sort_order) {
        Some(order) => SortDirection::parse(order)?,
        None => SortDirection::Desc,
    };

    Ok(NormalizedPage {
        page,
        window: PageWindow {
            limit,
            offset: (page - 1).saturating_mul(limit),
        },
        order: OrderClause { column, direction },
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    match non_blank(raw).map(str::parse::<i64>) {
        Some(Ok(value)) if value < 1 => 1,
        Some(Ok(value)) => value.unsigned_abs(),
        _ => default,
    }
}

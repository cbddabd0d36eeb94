//! Allow-list of reading columns that clients may filter or sort on.

use std::fmt;

/// Storage type of a column, used to coerce client-supplied filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Timestamp,
    Region,
    Density,
    Temperature,
    Thickness,
    Collector,
    CreatedAt,
    UpdatedAt,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Id,
        Column::Timestamp,
        Column::Region,
        Column::Density,
        Column::Temperature,
        Column::Thickness,
        Column::Collector,
        Column::CreatedAt,
        Column::UpdatedAt,
    ];

    /// Resolve a client-facing field name. Both the JSON spelling (`createdAt`)
    /// and the column spelling (`created_at`) are accepted.
    pub fn from_field(name: &str) -> Option<Self> {
        match name {
            "id" | "_id" => Some(Column::Id),
            "timestamp" => Some(Column::Timestamp),
            "region" => Some(Column::Region),
            "density" => Some(Column::Density),
            "temperature" => Some(Column::Temperature),
            "thickness" => Some(Column::Thickness),
            "collector" => Some(Column::Collector),
            "createdAt" | "created_at" => Some(Column::CreatedAt),
            "updatedAt" | "updated_at" => Some(Column::UpdatedAt),
            _ => None,
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Timestamp => "timestamp",
            Column::Region => "region",
            Column::Density => "density",
            Column::Temperature => "temperature",
            Column::Thickness => "thickness",
            Column::Collector => "collector",
            Column::CreatedAt => "created_at",
            Column::UpdatedAt => "updated_at",
        }
    }

    pub const fn kind(self) -> ColumnKind {
        match self {
            Column::Id => ColumnKind::Integer,
            Column::Density | Column::Temperature | Column::Thickness => ColumnKind::Real,
            Column::Region | Column::Collector => ColumnKind::Text,
            Column::Timestamp | Column::CreatedAt | Column::UpdatedAt => ColumnKind::Timestamp,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

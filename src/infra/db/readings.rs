use async_trait::async_trait;
use icelog_api_types::{NewReadingPayload, ReadingPatchPayload};
use sqlx::{
    Arguments, FromRow, QueryBuilder, Sqlite, SqliteConnection, sqlite::SqliteArguments,
};

use crate::application::{
    filter::{BindValue, QueryPlan},
    repos::{ReadingsRepo, RepoError},
};
use crate::domain::{
    readings::{NewReading, Reading, ReadingChanges, ReadingId, ReadingStats},
    timestamp::Timestamp,
};

use super::{SqliteRepositories, map_sqlx_error};

const TABLE: &str = "ice_readings";
const COLUMNS: &str =
    "id, timestamp, region, density, temperature, thickness, collector, created_at, updated_at";
const STATS: &str = "COUNT(*) AS total_records, AVG(temperature) AS avg_temperature, \
     AVG(thickness) AS avg_thickness, AVG(density) AS avg_density, \
     MIN(timestamp) AS earliest_record, MAX(timestamp) AS latest_record";

#[derive(Debug, FromRow)]
struct ReadingRow {
    id: i64,
    timestamp: String,
    region: String,
    density: f64,
    temperature: Option<f64>,
    thickness: f64,
    collector: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = RepoError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            RepoError::from_persistence(format!(
                "row {} has unreadable {field} `{value}`",
                row.id
            ))
        };
        let parse_time = |field: &str, value: &str| {
            Timestamp::parse_text(value).map_err(|_| corrupt(field, value))
        };

        Ok(Reading {
            id: row.id,
            timestamp: parse_time("timestamp", &row.timestamp)?,
            region: row
                .region
                .parse()
                .map_err(|_| corrupt("region", &row.region))?,
            density: row.density,
            temperature: row.temperature,
            thickness: row.thickness,
            collector: row.collector,
            created_at: parse_time("created_at", &row.created_at)?,
            updated_at: parse_time("updated_at", &row.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatsRow {
    total_records: i64,
    avg_temperature: Option<f64>,
    avg_thickness: Option<f64>,
    avg_density: Option<f64>,
    earliest_record: Option<String>,
    latest_record: Option<String>,
}

impl TryFrom<StatsRow> for ReadingStats {
    type Error = RepoError;

    fn try_from(row: StatsRow) -> Result<Self, Self::Error> {
        let parse_time = |value: Option<String>| {
            value
                .map(|text| {
                    Timestamp::parse_text(&text).map_err(|_| {
                        RepoError::from_persistence(format!("unreadable timestamp bound `{text}`"))
                    })
                })
                .transpose()
        };

        Ok(ReadingStats {
            total_records: SqliteRepositories::convert_count(row.total_records)?,
            avg_temperature: row.avg_temperature,
            avg_thickness: row.avg_thickness,
            avg_density: row.avg_density,
            earliest_record: parse_time(row.earliest_record)?,
            latest_record: parse_time(row.latest_record)?,
        })
    }
}

fn arguments<'q>(binds: Vec<BindValue>) -> Result<SqliteArguments<'q>, RepoError> {
    let mut args = SqliteArguments::default();
    for bind in binds {
        match bind {
            BindValue::Integer(value) => args.add(value),
            BindValue::Real(value) => args.add(value),
            BindValue::Text(value) => args.add(value),
        }
        .map_err(RepoError::from_persistence)?;
    }
    Ok(args)
}

async fn insert_row(
    conn: &mut SqliteConnection,
    reading: NewReading,
    now: Timestamp,
) -> Result<Reading, RepoError> {
    let sql = format!(
        "INSERT INTO {TABLE} (timestamp, region, density, temperature, thickness, collector, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(reading.timestamp.to_string())
        .bind(reading.region.as_str())
        .bind(reading.density)
        .bind(reading.temperature)
        .bind(reading.thickness)
        .bind(reading.collector)
        .bind(now.to_string())
        .bind(now.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    Reading::try_from(row)
}

#[async_trait]
impl ReadingsRepo for SqliteRepositories {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Reading>, RepoError> {
        let query = plan.select(TABLE, COLUMNS);
        let rows = sqlx::query_as_with::<_, ReadingRow, _>(&query.sql, arguments(query.binds)?)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Reading::try_from).collect()
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64, RepoError> {
        let query = plan.count(TABLE);
        let total = sqlx::query_scalar_with::<_, i64, _>(&query.sql, arguments(query.binds)?)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(total)
    }

    async fn stats(&self, plan: &QueryPlan) -> Result<ReadingStats, RepoError> {
        let query = plan.aggregate(TABLE, STATS);
        let row = sqlx::query_as_with::<_, StatsRow, _>(&query.sql, arguments(query.binds)?)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        ReadingStats::try_from(row)
    }

    async fn find_by_id(&self, id: ReadingId) -> Result<Option<Reading>, RepoError> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?");
        sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(Reading::try_from)
            .transpose()
    }

    async fn insert(&self, payload: NewReadingPayload) -> Result<Reading, RepoError> {
        let now = Timestamp::now();
        let reading =
            NewReading::from_payload(payload, now).map_err(|err| RepoError::validation(&err))?;

        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        insert_row(&mut conn, reading, now).await
    }

    async fn update(
        &self,
        id: ReadingId,
        patch: ReadingPatchPayload,
    ) -> Result<Option<Reading>, RepoError> {
        let changes =
            ReadingChanges::from_payload(patch).map_err(|err| RepoError::validation(&err))?;
        if changes.is_empty() {
            return Err(RepoError::EmptyUpdate);
        }

        let ReadingChanges {
            timestamp,
            region,
            density,
            temperature,
            thickness,
            collector,
        } = changes;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {TABLE} SET "));
        let mut set = qb.separated(", ");
        if let Some(timestamp) = timestamp {
            set.push("timestamp = ").push_bind_unseparated(timestamp.to_string());
        }
        if let Some(region) = region {
            set.push("region = ").push_bind_unseparated(region.as_str());
        }
        if let Some(density) = density {
            set.push("density = ").push_bind_unseparated(density);
        }
        if let Some(temperature) = temperature {
            set.push("temperature = ").push_bind_unseparated(temperature);
        }
        if let Some(thickness) = thickness {
            set.push("thickness = ").push_bind_unseparated(thickness);
        }
        if let Some(collector) = collector {
            set.push("collector = ").push_bind_unseparated(collector);
        }
        set.push("updated_at = ")
            .push_bind_unseparated(Timestamp::now().to_string());

        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(COLUMNS);

        qb.build_query_as::<ReadingRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(Reading::try_from)
            .transpose()
    }

    async fn remove(&self, id: ReadingId) -> Result<Option<Reading>, RepoError> {
        let sql = format!("DELETE FROM {TABLE} WHERE id = ? RETURNING {COLUMNS}");
        sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(Reading::try_from)
            .transpose()
    }

    async fn insert_many(
        &self,
        payloads: Vec<NewReadingPayload>,
    ) -> Result<Vec<Reading>, RepoError> {
        let now = Timestamp::now();
        let readings = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| {
                NewReading::from_payload(payload, now)
                    .map_err(|err| RepoError::row_validation(index + 1, &err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if readings.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut inserted = Vec::with_capacity(readings.len());
        for reading in readings {
            inserted.push(insert_row(&mut tx, reading, now).await?);
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(inserted)
    }
}

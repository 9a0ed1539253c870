//! SQLite 模板与读数存储实现

use crate::error::StorageError;
use crate::traits::{ReadingStore, ScaleStore, TemplateStore};
use domain::{ProtocolTemplate, WeightReading};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SCHEMA: &[&str] = &[
    "create table if not exists weight_readings ( \
        id integer primary key autoincrement, \
        device_id text not null, \
        weight real, \
        unit text, \
        stable integer, \
        raw_data text, \
        timestamp text not null, \
        created_at text default current_timestamp)",
    "create table if not exists protocol_templates ( \
        id integer primary key autoincrement, \
        template_id text unique not null, \
        name text not null, \
        description text, \
        template_data text not null, \
        confidence_score real, \
        discovery_date text not null, \
        created_at text default current_timestamp)",
    "create index if not exists idx_weight_readings_timestamp on weight_readings(timestamp)",
    "create index if not exists idx_weight_readings_device on weight_readings(device_id)",
];

pub struct SqliteScaleStore {
    pub pool: SqlitePool,
}

impl SqliteScaleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 连接并建表
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_sqlite_pool(database_url).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TemplateStore for SqliteScaleStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn save_template(&self, template: &ProtocolTemplate) -> Result<(), StorageError> {
        let data = serde_json::to_string(template)?;
        let discovery_date = template.discovery_date.unwrap_or_else(domain::now_utc);
        sqlx::query(
            "insert into protocol_templates \
             (template_id, name, description, template_data, confidence_score, discovery_date) \
             values (?1, ?2, ?3, ?4, ?5, ?6) \
             on conflict (template_id) do update set \
               name = excluded.name, \
               description = excluded.description, \
               template_data = excluded.template_data, \
               confidence_score = excluded.confidence_score, \
               discovery_date = excluded.discovery_date",
        )
        .bind(&template.template_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(data)
        .bind(template.confidence_score)
        .bind(discovery_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_template(
        &self,
        template_id: &str,
    ) -> Result<Option<ProtocolTemplate>, StorageError> {
        let row = sqlx::query("select template_data from protocol_templates where template_id = ?1")
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.try_get("template_data")?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl ReadingStore for SqliteScaleStore {
    async fn save_reading(&self, reading: &WeightReading) -> Result<(), StorageError> {
        sqlx::query(
            "insert into weight_readings (device_id, weight, unit, stable, raw_data, timestamp) \
             values (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&reading.device_id)
        .bind(reading.weight)
        .bind(&reading.unit)
        .bind(reading.stable)
        .bind(&reading.raw_data)
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_readings(&self, limit: usize) -> Result<Vec<WeightReading>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "select device_id, weight, unit, stable, raw_data, timestamp from weight_readings \
             order by id desc limit ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reading_from_row).collect()
    }
}

fn reading_from_row(row: &SqliteRow) -> Result<WeightReading, StorageError> {
    Ok(WeightReading {
        device_id: row.try_get("device_id")?,
        weight: row.try_get("weight")?,
        unit: row.try_get("unit")?,
        stable: row.try_get("stable")?,
        raw_data: row.try_get::<Option<String>, _>("raw_data")?.unwrap_or_default(),
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait::async_trait]
impl ScaleStore for SqliteScaleStore {
    async fn close(&self) {
        self.pool.close().await;
    }
}

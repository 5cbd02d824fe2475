//! Aggregation audit trail
//!
//! One row per aggregation invocation. Rows are never updated.

use super::{parse_timestamp, parse_uuid};
use crate::models::AggregationRunRecord;
use pva_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn insert_run(pool: &SqlitePool, run: &AggregationRunRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO aggregation_runs (
            id, company_id, vehicle_count, requests_count, finders_count,
            violations_found, requestor, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.id.to_string())
    .bind(run.company_id.map(|id| id.to_string()))
    .bind(run.vehicle_count as i64)
    .bind(run.requests_count as i64)
    .bind(run.finders_count as i64)
    .bind(run.violations_found as i64)
    .bind(&run.requestor)
    .bind(run.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent runs for a company
pub async fn list_runs(
    pool: &SqlitePool,
    company_id: Uuid,
    limit: u32,
) -> Result<Vec<AggregationRunRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, company_id, vehicle_count, requests_count, finders_count,
               violations_found, requestor, created_at
        FROM aggregation_runs
        WHERE company_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(company_id.to_string())
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            let company: Option<String> = row.try_get("company_id")?;
            let created_at: String = row.try_get("created_at")?;
            let count = |column: &str| -> Result<usize> {
                let value: i64 = row.try_get(column)?;
                Ok(value.max(0) as usize)
            };

            Ok(AggregationRunRecord {
                id: parse_uuid(&id, "aggregation_runs.id")?,
                company_id: company
                    .map(|c| parse_uuid(&c, "aggregation_runs.company_id"))
                    .transpose()?,
                vehicle_count: count("vehicle_count")?,
                requests_count: count("requests_count")?,
                finders_count: count("finders_count")?,
                violations_found: count("violations_found")?,
                requestor: row.try_get("requestor")?,
                created_at: parse_timestamp(&created_at, "aggregation_runs.created_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use chrono::{Duration, Utc};

    fn run(company_id: Option<Uuid>, minutes_ago: i64, found: usize) -> AggregationRunRecord {
        AggregationRunRecord {
            id: Uuid::new_v4(),
            company_id,
            vehicle_count: 2,
            requests_count: 6,
            finders_count: 3,
            violations_found: found,
            requestor: "ops@example.com".to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_runs_listed_newest_first_per_company() {
        let pool = memory_pool().await;
        let company = Uuid::new_v4();

        insert_run(&pool, &run(Some(company), 10, 1)).await.unwrap();
        insert_run(&pool, &run(Some(company), 1, 2)).await.unwrap();
        insert_run(&pool, &run(None, 0, 3)).await.unwrap();
        insert_run(&pool, &run(Some(Uuid::new_v4()), 0, 4)).await.unwrap();

        let runs = list_runs(&pool, company, 50).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].violations_found, 2);
        assert_eq!(runs[1].violations_found, 1);
        assert_eq!(runs[0].requests_count, 6);
        assert_eq!(runs[0].company_id, Some(company));
    }
}

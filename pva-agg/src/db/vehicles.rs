//! Company vehicles (read side)
//!
//! The fleet is maintained by the admin backend. Aggregation reads it when a
//! company-scoped request does not list cars explicitly.

use crate::models::CarInput;
use chrono::Utc;
use pva_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn list_company_vehicles(pool: &SqlitePool, company_id: Uuid) -> Result<Vec<CarInput>> {
    let rows = sqlx::query(
        r#"
        SELECT license_plate, state
        FROM vehicles
        WHERE company_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(company_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let plate: String = row.try_get("license_plate")?;
            let state: Option<String> = row.try_get("state")?;
            Ok(CarInput::new(plate, state.as_deref()))
        })
        .collect()
}

/// Register a vehicle; used to seed fleets outside the admin backend
pub async fn insert_vehicle(
    pool: &SqlitePool,
    company_id: Uuid,
    license_plate: &str,
    state: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO vehicles (id, company_id, license_plate, state, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(company_id.to_string())
    .bind(license_plate)
    .bind(state)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn test_fleet_is_scoped_to_company() {
        let pool = memory_pool().await;
        let company = Uuid::new_v4();

        insert_vehicle(&pool, company, "ABC123", Some("NY")).await.unwrap();
        insert_vehicle(&pool, company, "XYZ9", None).await.unwrap();
        insert_vehicle(&pool, Uuid::new_v4(), "OTHER1", Some("CA")).await.unwrap();

        let cars = list_company_vehicles(&pool, company).await.unwrap();
        assert_eq!(cars.len(), 2);
        assert!(cars.contains(&CarInput::new("ABC123", Some("NY"))));
        assert!(cars.contains(&CarInput::new("XYZ9", None)));
    }
}

//! Repositorio de coordenadas
//!
//! Upsert de la posición vigente: la fila anterior pasa a
//! is_current = false y se inserta una nueva, en la misma transacción.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::models::coordinate::Coordinate;
use crate::utils::errors::AppError;

#[derive(Clone)]
pub struct CoordinateRepository {
    db: Database,
}

impl CoordinateRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Marcar la coordenada vigente anterior como histórica e insertar
    /// la nueva. Devuelve el id de la fila insertada.
    pub async fn create_or_update(
        &self,
        conn: &mut PgConnection,
        entity_id: Uuid,
        entity_type: &str,
        lat: f64,
        lng: f64,
        address: Option<&str>,
    ) -> Result<Uuid, AppError> {
        sqlx::query(
            r#"
            UPDATE coordinates
            SET is_current = false, updated_at = NOW()
            WHERE entity_id = $1 AND entity_type = $2 AND is_current = true
            "#,
        )
        .bind(entity_id)
        .bind(entity_type)
        .execute(&mut *conn)
        .await?;

        self.insert(conn, entity_id, entity_type, lat, lng, address).await
    }

    /// Insertar una coordenada nueva como vigente
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        entity_id: Uuid,
        entity_type: &str,
        lat: f64,
        lng: f64,
        address: Option<&str>,
    ) -> Result<Uuid, AppError> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO coordinates (entity_id, entity_type, latitude, longitude, address, is_current)
            VALUES ($1, $2, $3, $4, $5, true)
            RETURNING id
            "#,
        )
        .bind(entity_id)
        .bind(entity_type)
        .bind(lat)
        .bind(lng)
        .bind(address)
        .fetch_one(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn get_current(
        &self,
        entity_id: Uuid,
        entity_type: &str,
    ) -> Result<Option<Coordinate>, AppError> {
        let pool = self.db.pool().await?;
        let coordinate = sqlx::query_as::<_, Coordinate>(
            r#"
            SELECT * FROM coordinates
            WHERE entity_id = $1 AND entity_type = $2 AND is_current = true
            "#,
        )
        .bind(entity_id)
        .bind(entity_type)
        .fetch_optional(&pool)
        .await?;

        Ok(coordinate)
    }
}

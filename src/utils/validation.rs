//! Utilidades de validación
//!
//! Funciones helper para validación de coordenadas e identificadores.

use uuid::Uuid;

use crate::utils::errors::AppError;

/// Validar rango de latitud/longitud. Los bordes ±90/±180 son válidos.
pub fn validate_lat_lng(lat: f64, lng: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::BadRequest(
            "latitude must be between -90 and 90".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(AppError::BadRequest(
            "longitude must be between -180 and 180".to_string(),
        ));
    }
    Ok(())
}

/// Validar y convertir string a UUID
pub fn validate_uuid(value: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|_| AppError::BadRequest(format!("{} must be a valid UUID", field)))
}

/// Validar que un string no esté vacío
pub fn validate_not_empty(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} cannot be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_boundaries_accepted() {
        assert!(validate_lat_lng(90.0, 180.0).is_ok());
        assert!(validate_lat_lng(-90.0, -180.0).is_ok());
        assert!(validate_lat_lng(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_lat_lng_out_of_range_rejected() {
        assert!(validate_lat_lng(90.0001, 0.0).is_err());
        assert!(validate_lat_lng(-91.0, 0.0).is_err());
        assert!(validate_lat_lng(0.0, 180.0001).is_err());
        assert!(validate_lat_lng(0.0, -181.0).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("not-a-uuid", "driver_id").is_err());
        assert!(validate_uuid("7b7c2a1e-93e0-4a95-8437-5bfe1c7d0f49", "driver_id").is_ok());
    }

    #[test]
    fn test_validate_not_empty() {
        assert!(validate_not_empty("  ", "reason").is_err());
        assert!(validate_not_empty("changed my mind", "reason").is_ok());
    }
}

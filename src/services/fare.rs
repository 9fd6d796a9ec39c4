//! Cálculo de tarifas y distancias
//!
//! Tarifa lineal por clase de vehículo: base + por_km·distancia +
//! por_min·duración. La distancia es el gran círculo (Haversine) entre
//! pickup y destino; la duración asume 30 km/h promedio urbano.

use crate::models::ride::{pricing_for, VehicleType};

const EARTH_RADIUS_KM: f64 = 6371.0;
const AVG_SPEED_KMH: f64 = 30.0;
/// Comisión de la plataforma: el conductor se lleva el 80%
const DRIVER_SHARE: f64 = 0.80;

/// Distancia Haversine en kilómetros
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Duración estimada en minutos (truncada) a 30 km/h
pub fn estimate_duration_minutes(distance_km: f64) -> i32 {
    (distance_km / AVG_SPEED_KMH * 60.0) as i32
}

/// Redondeo a 2 decimales para montos
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Pago al conductor: 80% de la tarifa final
pub fn driver_earnings(final_fare: f64) -> f64 {
    round2(final_fare * DRIVER_SHARE)
}

/// Calculadora de tarifa para una clase de vehículo
#[derive(Debug, Clone, Copy)]
pub struct FareCalculator {
    pub base_fare: f64,
    pub rate_per_km: f64,
    pub rate_per_min: f64,
    pub min_fare: f64,
}

impl FareCalculator {
    pub fn for_vehicle(vehicle_type: VehicleType) -> Self {
        let pricing = pricing_for(vehicle_type);
        Self {
            base_fare: pricing.base_fare,
            rate_per_km: pricing.rate_per_km,
            rate_per_min: pricing.rate_per_min,
            min_fare: pricing.base_fare,
        }
    }

    pub fn calculate(&self, distance_km: f64, duration_min: f64) -> f64 {
        let total = self.base_fare + distance_km * self.rate_per_km + duration_min * self.rate_per_min;
        if total < self.min_fare {
            self.min_fare
        } else {
            total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Almaty Central Park -> Kok-Tobe Hill
    const PICKUP: (f64, f64) = (43.238949, 76.889709);
    const DEST: (f64, f64) = (43.222015, 76.851511);

    #[test]
    fn test_haversine_known_distance() {
        let d = haversine_km(PICKUP.0, PICKUP.1, DEST.0, DEST.1);
        // ~3.6-3.8 km en línea recta
        assert!(d > 3.4 && d < 3.9, "distance was {}", d);
    }

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let d1 = haversine_km(PICKUP.0, PICKUP.1, DEST.0, DEST.1);
        let d2 = haversine_km(DEST.0, DEST.1, PICKUP.0, PICKUP.1);
        assert!((d1 - d2).abs() < 1e-9);

        assert_eq!(haversine_km(43.0, 76.0, 43.0, 76.0), 0.0);
    }

    #[test]
    fn test_duration_truncates() {
        // 3.73 km a 30 km/h = 7.46 min -> 7
        assert_eq!(estimate_duration_minutes(3.73), 7);
        assert_eq!(estimate_duration_minutes(0.0), 0);
    }

    #[test]
    fn test_economy_fare_for_almaty_ride() {
        let d = haversine_km(PICKUP.0, PICKUP.1, DEST.0, DEST.1);
        let minutes = estimate_duration_minutes(d);
        let fare = FareCalculator::for_vehicle(crate::models::ride::VehicleType::Economy)
            .calculate(d, minutes as f64);
        // 500 + 100·d + 50·min ≈ 1200..1250
        assert!(fare > 1150.0 && fare < 1300.0, "fare was {}", fare);
    }

    #[test]
    fn test_min_fare_floor() {
        let calc = FareCalculator::for_vehicle(crate::models::ride::VehicleType::Economy);
        assert_eq!(calc.calculate(0.0, 0.0), 500.0);
    }

    #[test]
    fn test_driver_earnings_rounding() {
        assert_eq!(driver_earnings(1222.96), 978.37);
        assert_eq!(driver_earnings(100.0), 80.0);
        assert_eq!(driver_earnings(0.0), 0.0);
        // round(·, 2) a mitad de camino
        assert_eq!(driver_earnings(0.01), 0.01);
    }
}

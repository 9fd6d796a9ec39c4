//! Rate limiter de updates de ubicación
//!
//! Mínimo un segundo entre updates aceptados por conductor; el exceso se
//! descarta silenciosamente en el borde del servicio. Las entradas viejas
//! se barren cada tanto para que el mapa no crezca sin límite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

const SWEEP_AGE: Duration = Duration::from_secs(60 * 60);
const SWEEP_PERIOD: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_accepted: Arc<Mutex<HashMap<Uuid, Instant>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// true si el update se acepta; registra el instante del aceptado
    pub fn allow(&self, driver_id: Uuid) -> bool {
        let now = Instant::now();
        let mut map = match self.last_accepted.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };

        match map.get(&driver_id) {
            Some(last) if now.duration_since(*last) < self.min_interval => false,
            _ => {
                map.insert(driver_id, now);
                true
            }
        }
    }

    /// Quitar entradas sin actividad en la última hora
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut map = match self.last_accepted.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.retain(|_, last| now.duration_since(*last) < SWEEP_AGE);
    }

    /// Tarea periódica de limpieza
    pub fn spawn_sweeper(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_PERIOD);
            loop {
                tokio::select! {
                    _ = interval.tick() => limiter.sweep(),
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_allowed_second_dropped() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let driver = Uuid::new_v4();

        assert!(limiter.allow(driver));
        assert!(!limiter.allow(driver));
    }

    #[test]
    fn test_allowed_again_after_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        let driver = Uuid::new_v4();

        assert!(limiter.allow(driver));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.allow(driver));
    }

    #[test]
    fn test_independent_per_driver() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let d1 = Uuid::new_v4();
        let d2 = Uuid::new_v4();

        assert!(limiter.allow(d1));
        assert!(limiter.allow(d2));
    }

    #[test]
    fn test_sweep_keeps_recent_entries() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let driver = Uuid::new_v4();
        assert!(limiter.allow(driver));
        limiter.sweep();
        // La entrada reciente sobrevive al sweep: sigue limitada
        assert!(!limiter.allow(driver));
    }
}

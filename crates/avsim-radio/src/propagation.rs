//! Free-space propagation formulas for CC1000-class radios.
//!
//! All functions are pure; distances are in meters, powers in watts,
//! frequencies in hertz.

use serde::{Deserialize, Serialize};

/// `(c / 4π)²`, the wavelength term of the Friis equation.
const LIGHT_CONST: f64 = {
    let t = 299_792_458.0 / (4.0 * std::f64::consts::PI);
    t * t
};

/// Received power below which a transmission is not delivered at all.
pub const NOISE_CUTOFF: f64 = 0.000_009;

/// Distance used for co-located radios.
pub const MIN_DISTANCE: f64 = 0.000_001;

/// Default carrier frequency (433 MHz band).
pub const DEFAULT_FREQUENCY_HZ: f64 = 433_000_000.0;

/// A point in space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    /// Euclidean distance to `other`, never less than [`MIN_DISTANCE`].
    pub fn distance(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        let d = (dx * dx + dy * dy + dz * dz).sqrt();
        if d == 0.0 {
            MIN_DISTANCE
        } else {
            d
        }
    }
}

/// Transmit power in watts for a CC1000 power register setting.
pub fn transmit_power(setting: u8) -> f64 {
    let s = setting as f64;
    if setting < 16 {
        10f64.powf(0.12 * s - 1.8)
    } else {
        10f64.powf(0.00431 * s - 0.06459)
    }
}

/// Power received at `distance` from a transmitter of `tx_power` watts.
pub fn received_power(tx_power: f64, frequency_hz: f64, distance: f64) -> f64 {
    tx_power * LIGHT_CONST / (frequency_hz * frequency_hz) / (distance * distance)
}

/// True if a signal of `power` watts rises above the noise floor.
pub fn audible(power: f64) -> bool {
    power > NOISE_CUTOFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.distance(&a), MIN_DISTANCE);
    }

    #[test]
    fn test_transmit_power_curve() {
        // low range: 10^(0.12*s - 1.8)
        assert!((transmit_power(0) - 10f64.powf(-1.8)).abs() < 1e-12);
        assert!((transmit_power(15) - 10f64.powf(0.0)).abs() < 1e-12);
        // high range is flatter
        assert!((transmit_power(255) - 10f64.powf(0.00431 * 255.0 - 0.06459)).abs() < 1e-12);
        assert!(transmit_power(255) > transmit_power(16));
    }

    #[test]
    fn test_received_power_falls_with_square_of_distance() {
        let p1 = received_power(1.0, DEFAULT_FREQUENCY_HZ, 10.0);
        let p2 = received_power(1.0, DEFAULT_FREQUENCY_HZ, 20.0);
        assert!((p1 / p2 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_cutoff() {
        let tx = transmit_power(15);
        assert!(audible(received_power(tx, DEFAULT_FREQUENCY_HZ, 1.0)));
        assert!(!audible(received_power(tx, DEFAULT_FREQUENCY_HZ, 10_000.0)));
    }
}

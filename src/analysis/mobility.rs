//! Reduced ion mobility (K0) from peak drift positions.
//!
//! ```text
//! drift_time = (index + position_offset) * resolution / 1e6        [s]
//! k          = length² / (drift_time * voltage)
//! K0         = k * (T0 / (temperature_c + 273.15)) * (pressure / P0)
//! ```

use serde::{Deserialize, Serialize};

use super::peaks::Peak;
use crate::data::model::{DriftConditions, Polarity};
use crate::error::{ImsError, Result};

/// Standard temperature used for normalisation, in kelvin.
pub const NOMINAL_T_KELVIN: f64 = 273.15;
/// Standard pressure used for normalisation.
pub const NOMINAL_P_KPA: f64 = 1013.25;
/// Offset between degrees Celsius and kelvin.
pub const CELSIUS_TO_KELVIN: f64 = 273.15;
/// Index bias before the physical drift region begins.
pub const DEFAULT_POSITION_OFFSET: i64 = 32;

/// Normalisation constants for K0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobilityConstants {
    pub nominal_temperature_k: f64,
    pub nominal_pressure_kpa: f64,
    pub position_offset: i64,
}

impl Default for MobilityConstants {
    fn default() -> Self {
        Self {
            nominal_temperature_k: NOMINAL_T_KELVIN,
            nominal_pressure_kpa: NOMINAL_P_KPA,
            position_offset: DEFAULT_POSITION_OFFSET,
        }
    }
}

/// Drift-tube state for one polarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub temperature_c: f64,
    pub pressure_kpa: f64,
    pub voltage: f64,
    pub drift_length: f64,
}

impl Environment {
    pub fn for_polarity(conditions: &DriftConditions, polarity: Polarity) -> Self {
        Self {
            temperature_c: conditions.temperature_c,
            pressure_kpa: conditions.pressure_kpa,
            voltage: conditions.voltage(polarity),
            drift_length: conditions.tube_length,
        }
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("temperature", self.temperature_c),
            ("pressure", self.pressure_kpa),
            ("voltage", self.voltage),
            ("drift length", self.drift_length),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ImsError::invalid_parameter(format!("{name} is not finite ({value})")));
            }
        }
        if self.voltage <= 0.0 {
            return Err(ImsError::invalid_parameter(format!(
                "voltage must be positive, got {}",
                self.voltage
            )));
        }
        if self.temperature_c + CELSIUS_TO_KELVIN <= 0.0 {
            return Err(ImsError::invalid_parameter(format!(
                "temperature {} °C is at or below absolute zero",
                self.temperature_c
            )));
        }
        Ok(())
    }
}

/// Converts peak positions into K0 values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MobilityCalculator {
    resolution: f64,
    constants: MobilityConstants,
}

impl MobilityCalculator {
    /// `resolution` is the drift-time scale in microseconds per index.
    pub fn new(resolution: f64, constants: MobilityConstants) -> Result<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(ImsError::invalid_parameter(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        Ok(Self {
            resolution,
            constants,
        })
    }

    /// One K0 per peak, in peak order.
    pub fn compute(&self, peaks: &[Peak], env: &Environment) -> Result<Vec<f64>> {
        env.validate()?;
        peaks.iter().map(|p| self.k0_unchecked(p.index, env)).collect()
    }

    /// K0 of a single drift position.
    pub fn k0_at(&self, index: usize, env: &Environment) -> Result<f64> {
        env.validate()?;
        self.k0_unchecked(index, env)
    }

    /// Drift time in seconds of a trace index.
    pub fn drift_time(&self, index: usize) -> Result<f64> {
        let position = index as i64 + self.constants.position_offset;
        if position <= 0 {
            return Err(ImsError::invalid_parameter(format!(
                "index {index} with offset {} gives a non-positive drift time",
                self.constants.position_offset
            )));
        }
        Ok(position as f64 * (self.resolution / 1_000_000.0))
    }

    fn k0_unchecked(&self, index: usize, env: &Environment) -> Result<f64> {
        let drift_time = self.drift_time(index)?;
        let k = env.drift_length.powi(2) / (drift_time * env.voltage);
        let temperature_k = env.temperature_c + CELSIUS_TO_KELVIN;
        let k0 = k
            * (self.constants.nominal_temperature_k / temperature_k)
            * (env.pressure_kpa / self.constants.nominal_pressure_kpa);

        if !k0.is_finite() {
            return Err(ImsError::invalid_parameter(format!(
                "K0 at index {index} is not finite"
            )));
        }
        Ok(k0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment {
            temperature_c: 40.0,
            pressure_kpa: 1000.0,
            voltage: 3000.0,
            drift_length: 7.0,
        }
    }

    fn calculator() -> MobilityCalculator {
        MobilityCalculator::new(32.392, MobilityConstants::default()).unwrap()
    }

    fn peak(index: usize) -> Peak {
        Peak {
            index,
            height: 1.0,
            prominence: 1.0,
        }
    }

    #[test]
    fn formula() {
        let k0 = calculator().k0_at(250, &env()).unwrap();
        let drift_time = (250.0 + 32.0) * 32.392e-6;
        let expected = 49.0 / (drift_time * 3000.0) * (273.15 / 313.15) * (1000.0 / 1013.25);
        assert!((k0 - expected).abs() < 1e-12);
    }

    #[test]
    fn one_value_per_peak_in_order() {
        let peaks = [peak(300), peak(100), peak(200)];
        let k0s = calculator().compute(&peaks, &env()).unwrap();
        assert_eq!(k0s.len(), 3);
        // later drift means lower mobility
        assert!(k0s[1] > k0s[2] && k0s[2] > k0s[0]);
    }

    #[test]
    fn no_peaks_no_values() {
        assert!(calculator().compute(&[], &env()).unwrap().is_empty());
    }

    #[test]
    fn zero_voltage_is_invalid() {
        let env = Environment { voltage: 0.0, ..env() };
        let err = calculator().compute(&[peak(10)], &env).unwrap_err();
        assert!(matches!(err, ImsError::InvalidParameter(_)));
    }

    #[test]
    fn zero_drift_time_is_invalid() {
        let constants = MobilityConstants {
            position_offset: 0,
            ..MobilityConstants::default()
        };
        let calc = MobilityCalculator::new(32.392, constants).unwrap();
        assert!(matches!(
            calc.compute(&[peak(5), peak(0)], &env()),
            Err(ImsError::InvalidParameter(_))
        ));
        assert!(calc.k0_at(5, &env()).is_ok());
    }

    #[test]
    fn absolute_zero_is_invalid() {
        let env = Environment {
            temperature_c: -273.15,
            ..env()
        };
        assert!(calculator().k0_at(10, &env).is_err());
    }

    #[test]
    fn non_positive_resolution_is_invalid() {
        assert!(MobilityCalculator::new(0.0, MobilityConstants::default()).is_err());
        assert!(MobilityCalculator::new(f64::NAN, MobilityConstants::default()).is_err());
    }
}

//! Synthetic bearing-fault signal generator
//!
//! Produces acceleration batches for a motor running at 2880 RPM with an
//! outer-race defect: a shaft-rate running component, a BPFO tone whose
//! amplitude is modulated at shaft rate, and white noise.
//!
//! Used by the `fault-generator` binary and by `--simulate` mode.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Machine Constants
// ============================================================================

/// Sampling rate of the simulated accelerometer (Hz)
pub const SAMPLING_RATE_HZ: f64 = 25_600.0;
/// Samples per published batch
pub const BATCH_SIZE: usize = 2048;
pub const SHAFT_RPM: f64 = 2880.0;
/// Simplified outer-race defect frequency as a multiple of shaft rate
pub const BPFO_ORDER: f64 = 4.9;

const RUNNING_AMPLITUDE_G: f64 = 0.3;
const MODULATION_DEPTH: f64 = 0.2;
const NOISE_STD_G: f64 = 0.05;

// ============================================================================
// Severity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSeverity {
    /// No defect tone, running component and noise only
    Healthy,
    Low,
    Medium,
    High,
}

impl FaultSeverity {
    /// Peak amplitude of the defect tone in g.
    pub const fn impact_amplitude(self) -> f64 {
        match self {
            Self::Healthy => 0.0,
            Self::Low => 0.8,
            Self::Medium => 1.5,
            Self::High => 3.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for FaultSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" | "normal" => Ok(Self::Healthy),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown fault severity '{other}'")),
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Ordered list of `(severity, batch count)` phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultSchedule {
    phases: Vec<(FaultSeverity, u32)>,
}

impl FaultSchedule {
    pub const fn new(phases: Vec<(FaultSeverity, u32)>) -> Self {
        Self { phases }
    }

    /// LOW, MEDIUM, HIGH for five batches each.
    pub fn escalating() -> Self {
        Self::new(vec![
            (FaultSeverity::Low, 5),
            (FaultSeverity::Medium, 5),
            (FaultSeverity::High, 5),
        ])
    }

    pub fn total_batches(&self) -> u64 {
        self.phases.iter().map(|&(_, n)| u64::from(n)).sum()
    }

    /// One severity per batch, in schedule order.
    pub fn iter(&self) -> impl Iterator<Item = FaultSeverity> + '_ {
        self.phases
            .iter()
            .flat_map(|&(sev, n)| std::iter::repeat(sev).take(n as usize))
    }

    /// Owned per-batch iterator, for sources that outlive the schedule.
    pub fn into_batches(self) -> std::vec::IntoIter<FaultSeverity> {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}

impl Default for FaultSchedule {
    fn default() -> Self {
        Self::escalating()
    }
}

impl FromStr for FaultSchedule {
    type Err = String;

    /// `healthy:120,low:5,medium:5,high:5`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut phases = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (sev, count) = part
                .split_once(':')
                .ok_or_else(|| format!("expected <severity>:<batches>, got '{part}'"))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|e| format!("bad batch count in '{part}': {e}"))?;
            phases.push((sev.parse()?, count));
        }
        if phases.is_empty() {
            return Err("empty fault schedule".to_string());
        }
        Ok(Self::new(phases))
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Stateful generator. Phase carries across batches so consecutive batches
/// stitch into a continuous signal.
pub struct BearingFaultGenerator {
    sampling_rate: f64,
    batch_size: usize,
    shaft_hz: f64,
    bpfo_hz: f64,
    rng: StdRng,
    sample_index: u64,
}

impl BearingFaultGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let shaft_hz = SHAFT_RPM / 60.0;
        Self {
            sampling_rate: SAMPLING_RATE_HZ,
            batch_size: BATCH_SIZE,
            shaft_hz,
            bpfo_hz: BPFO_ORDER * shaft_hz,
            rng,
            sample_index: 0,
        }
    }

    pub const fn shaft_hz(&self) -> f64 {
        self.shaft_hz
    }

    pub const fn bpfo_hz(&self) -> f64 {
        self.bpfo_hz
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn next_batch(&mut self, severity: FaultSeverity) -> Vec<f64> {
        let amp = severity.impact_amplitude();
        let mut out = Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            let t = self.sample_index as f64 / self.sampling_rate;
            let shaft = (2.0 * PI * self.shaft_hz * t).sin();

            let mut x = RUNNING_AMPLITUDE_G * shaft;
            x += amp * (2.0 * PI * self.bpfo_hz * t).sin() * (1.0 + MODULATION_DEPTH * shaft);
            let noise: f64 = self.rng.sample(StandardNormal);
            x += NOISE_STD_G * noise;

            out.push(x);
            self.sample_index += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_batch_shape_and_frequencies() {
        let mut gen = BearingFaultGenerator::new(Some(1));
        assert_eq!(gen.next_batch(FaultSeverity::Low).len(), BATCH_SIZE);
        assert!((gen.shaft_hz() - 48.0).abs() < 1e-9);
        assert!((gen.bpfo_hz() - 235.2).abs() < 1e-9);
    }

    #[test]
    fn test_severity_increases_energy() {
        let mut gen = BearingFaultGenerator::new(Some(7));
        let healthy = rms(&gen.next_batch(FaultSeverity::Healthy));
        let low = rms(&gen.next_batch(FaultSeverity::Low));
        let high = rms(&gen.next_batch(FaultSeverity::High));
        assert!(healthy < low && low < high, "{healthy} {low} {high}");
    }

    #[test]
    fn test_seeded_generators_agree() {
        let a = BearingFaultGenerator::new(Some(42)).next_batch(FaultSeverity::Medium);
        let b = BearingFaultGenerator::new(Some(42)).next_batch(FaultSeverity::Medium);
        assert_eq!(a, b);
    }

    #[test]
    fn test_schedule_parse_and_expand() {
        let schedule: FaultSchedule = "healthy:2, high:1".parse().unwrap();
        assert_eq!(schedule.total_batches(), 3);
        let expanded: Vec<_> = schedule.iter().collect();
        assert_eq!(
            expanded,
            vec![FaultSeverity::Healthy, FaultSeverity::Healthy, FaultSeverity::High]
        );
        assert!("bogus:1".parse::<FaultSchedule>().is_err());
        assert!("low".parse::<FaultSchedule>().is_err());
        assert!("".parse::<FaultSchedule>().is_err());
    }

    #[test]
    fn test_default_schedule_escalates() {
        let s = FaultSchedule::default();
        assert_eq!(s.total_batches(), 15);
        assert_eq!(s.iter().last(), Some(FaultSeverity::High));
    }
}

//! Repeated sampling and summary statistics.

use std::time::Duration;

use log::{debug, warn};

use crate::{Error, Link, Measurement, Sds011};

/// Number of readings averaged per cycle.
pub const DEFAULT_SAMPLES: usize = 20;

/// Pause between two consecutive readings.
pub const DEFAULT_PACING: Duration = Duration::from_millis(100);

/// Arithmetic mean, `0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divisor `N`), `0` for fewer than two values.
pub fn population_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Mean and population standard deviation of one pollutant over a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStatistic {
    pub mean: f64,
    pub stddev: f64,
}

impl SummaryStatistic {
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            stddev: population_stddev(values),
        }
    }
}

/// Outcome of one complete sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub pm10: SummaryStatistic,
    pub pm2_5: SummaryStatistic,
    /// Number of readings the statistics were computed from.
    pub samples: usize,
}

/// Readings collected during one cycle, as two parallel sequences.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    pm10: Vec<f64>,
    pm2_5: Vec<f64>,
}

impl SampleSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pm10: Vec::with_capacity(capacity),
            pm2_5: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.pm10.push(measurement.pm10);
        self.pm2_5.push(measurement.pm2_5);
    }

    pub fn clear(&mut self) {
        self.pm10.clear();
        self.pm2_5.clear();
    }

    pub fn len(&self) -> usize {
        self.pm10.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pm10.is_empty()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            pm10: SummaryStatistic::from_values(&self.pm10),
            pm2_5: SummaryStatistic::from_values(&self.pm2_5),
            samples: self.len(),
        }
    }
}

/// Takes a fixed number of paced readings and summarizes them.
#[derive(Debug, Clone)]
pub struct Sampler {
    samples: usize,
    pacing: Duration,
    set: SampleSet,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLES, DEFAULT_PACING)
    }
}

impl Sampler {
    pub fn new(samples: usize, pacing: Duration) -> Self {
        Self {
            samples,
            pacing,
            set: SampleSet::with_capacity(samples),
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Reads `samples` measurements from `sensor`, sleeping `pacing` after each.
    ///
    /// The first failing read aborts the cycle: readings collected so far are
    /// discarded and the error is returned. Partial cycles are never summarized.
    pub async fn collect<L: Link>(&mut self, sensor: &mut Sds011<L>) -> Result<Summary, Error> {
        self.set.clear();
        for i in 0..self.samples {
            let measurement = match sensor.read_measurement().await {
                Ok(measurement) => measurement,
                Err(e) => {
                    warn!(
                        "Sample {}/{} failed, aborting cycle: {}",
                        i + 1,
                        self.samples,
                        e
                    );
                    self.set.clear();
                    return Err(e);
                }
            };
            debug!("Sample {}/{}: {:?}", i + 1, self.samples, measurement);
            self.set.push(measurement);
            tokio::time::sleep(self.pacing).await;
        }
        let summary = self.set.summary();
        self.set.clear();
        Ok(summary)
    }
}

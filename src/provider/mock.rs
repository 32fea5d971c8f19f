//! Random data provider for exercising the dashboard without a live source

use async_trait::async_trait;
use rand::Rng;

use super::Provider;
use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::models::{Sample, Series};

/// Environment variable that switches every command to mock data
pub const MOCK_ENV_VAR: &str = "MOCK_METRICS_DATA";

const FACTORS: [f64; 7] = [1.2323, 1.56443213, 1.923491, 2.31231, 1.223132, 3.21321, 1.213213];

/// Whether mock data was requested through the environment
pub fn enabled() -> bool {
    std::env::var(MOCK_ENV_VAR).is_ok_and(|v| v == "true")
}

/// Provider producing up to nine random series, failing about one call in ten
pub struct MockDataProvider {
    clock: SharedClock,
}

impl MockDataProvider {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    fn generate(&self) -> Result<Vec<Series>> {
        let mut rng = rand::thread_rng();
        let now = self.clock.now();
        let count = rng.gen_range(0..10);

        let batch = (0..count)
            .map(|i| {
                let samples = FACTORS
                    .iter()
                    .enumerate()
                    .map(|(offset, factor)| {
                        let value = factor * f64::from(rng.gen_range(0..10u32));
                        Sample::new(value, now + chrono::Duration::seconds(offset as i64))
                    })
                    .collect();
                Series::new(format!("Metric {}", i))
                    .with_description(format!("Metric {} description", i))
                    .with_samples(samples)
            })
            .collect();

        if rng.gen_range(0..10) < 1 {
            return Err(Error::Source("can't get metrics".to_string()));
        }
        Ok(batch)
    }
}

#[async_trait]
impl Provider for MockDataProvider {
    async fn get(&mut self) -> Result<Vec<Series>> {
        self.generate()
    }

    fn describe(&self) -> String {
        "mock data".to_string()
    }
}

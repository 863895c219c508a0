use crate::error::StatsError;

/// Однопроходный накопитель среднего и дисперсии (Уэлфорд).
///
/// Устойчив к большим смещениям, где наивная формула `Σx² - (Σx)²/n`
/// теряет точность.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn mean(&self) -> Result<f64, StatsError> {
        if self.count == 0 {
            return Err(StatsError::EmptyInput);
        }
        Ok(self.mean)
    }

    /// Несмещённая выборочная дисперсия.
    pub fn sample_variance(&self) -> Result<f64, StatsError> {
        if self.count < 2 {
            return Err(StatsError::InsufficientData {
                required: 2,
                actual: self.count,
            });
        }
        Ok(self.m2 / (self.count - 1) as f64)
    }

    pub fn sample_stddev(&self) -> Result<f64, StatsError> {
        self.sample_variance().map(f64::sqrt)
    }
}

impl Extend<f64> for RunningStats {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Self::new();
        stats.extend(iter);
        stats
    }
}

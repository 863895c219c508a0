//! Пакетная статистика для KPI-обработчиков.
//!
//! Чистые функции над срезами `f64`. Недостаточные входные данные
//! возвращаются как [`StatsError`], а не как `NaN`.

mod error;
mod running;

pub use error::StatsError;
pub use running::RunningStats;

/// 2^52: начиная с этой величины у `f64` нет дробной части.
const FRACTION_LIMIT: f64 = 4_503_599_627_370_496.0;

/// Среднее арифметическое.
///
/// Если сумма переполняется, среднее считается по Уэлфорду: оно всегда
/// остаётся в диапазоне входных значений.
pub fn mean(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    let sum: f64 = values.iter().sum();
    if sum.is_finite() {
        return Ok(sum / values.len() as f64);
    }
    values.iter().copied().collect::<RunningStats>().mean()
}

/// Медиана; для чётного количества это среднее двух центральных значений.
pub fn median(values: &[f64]) -> Result<f64, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Ok(sorted[mid]);
    }
    let (lo, hi) = (sorted[mid - 1], sorted[mid]);
    let middle = (lo + hi) / 2.0;
    if middle.is_finite() {
        Ok(middle)
    } else {
        Ok(lo / 2.0 + hi / 2.0)
    }
}

/// Выборочное стандартное отклонение (поправка Бесселя, знаменатель `n - 1`).
///
/// При переполнении промежуточных сумм пересчитывается в масштабе `max |x|`.
pub fn sample_stddev(values: &[f64]) -> Result<f64, StatsError> {
    let stddev = values.iter().copied().collect::<RunningStats>().sample_stddev()?;
    if stddev.is_finite() {
        return Ok(stddev);
    }

    let scale = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Ok(stddev);
    }
    let scaled: RunningStats = values.iter().map(|v| v / scale).collect();
    Ok(scaled.sample_stddev()? * scale)
}

/// Средняя мощность пакета: `Σ current[i] * voltage[i] / sample_count`,
/// округлённая до двух знаков через [`round_half_away`].
///
/// `sample_count` используется как делитель буквально и не обязан совпадать
/// с длиной пакета. Пакеты разной длины отклоняются с
/// [`StatsError::LengthMismatch`].
pub fn weighted_batch_mean(
    currents: &[f64],
    voltages: &[f64],
    sample_count: u64,
) -> Result<f64, StatsError> {
    if currents.len() != voltages.len() {
        return Err(StatsError::LengthMismatch {
            currents: currents.len(),
            voltages: voltages.len(),
        });
    }
    if sample_count == 0 {
        return Err(StatsError::DivisionByZero);
    }

    let power_sum: f64 = currents
        .iter()
        .zip(voltages)
        .map(|(current, voltage)| current * voltage)
        .sum();

    Ok(round_half_away(power_sum / sample_count as f64, 2))
}

/// Округление до `decimals` знаков, половины от нуля (`2.345 -> 2.35`,
/// `-2.345 -> -2.35`, с учётом двоичного представления входа).
///
/// Значения, у которых в этой точности не осталось дробных разрядов,
/// возвращаются как есть.
pub fn round_half_away(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    if !value.is_finite() || value.abs() >= FRACTION_LIMIT / scale {
        return value;
    }
    (value * scale).round() / scale
}

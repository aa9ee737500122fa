//! Statistics over sparse, date-indexed series.
//!
//! A [`Series`] holds at most one value per date; dates may carry a missing
//! value (a day row exists but nothing was recorded). Every diff- or
//! regression-based statistic returns `None` when fewer than two values are
//! available.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Buckets end on Sunday and are labelled with that Sunday.
    Weekly,
    /// Buckets are labelled with the last day of the month.
    Monthly,
}

impl Period {
    #[must_use]
    pub fn bucket_end(self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Weekly => {
                let to_sunday = 6 - i64::from(date.weekday().num_days_from_monday());
                date + Duration::days(to_sunday)
            }
            Period::Monthly => month_end(date),
        }
    }
}

fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Sum,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Series {
    samples: Vec<(NaiveDate, Option<f64>)>,
}

impl Series {
    /// Build a series, sorting by date. A later duplicate date replaces an
    /// earlier one.
    pub fn new(samples: impl IntoIterator<Item = (NaiveDate, Option<f64>)>) -> Self {
        let by_date: BTreeMap<NaiveDate, Option<f64>> = samples.into_iter().collect();
        Self {
            samples: by_date.into_iter().collect(),
        }
    }

    pub fn from_values(samples: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self::new(samples.into_iter().map(|(d, v)| (d, Some(v))))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples that carry a value.
    pub fn observed(&self) -> impl Iterator<Item = Point> + '_ {
        self.samples
            .iter()
            .filter_map(|&(date, value)| value.map(|value| Point { date, value }))
    }

    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.observed().map(|p| p.value).collect()
    }

    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.samples.iter().map(|&(d, _)| d).collect()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Point> {
        self.observed().last()
    }

    /// Samples with `start <= date <= end`.
    #[must_use]
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Series {
        Series {
            samples: self
                .samples
                .iter()
                .copied()
                .filter(|&(d, _)| d >= start && d <= end)
                .collect(),
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn resample(&self, period: Period, aggregation: Aggregation) -> Vec<Point> {
        let mut buckets: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for p in self.observed() {
            buckets
                .entry(period.bucket_end(p.date))
                .or_default()
                .push(p.value);
        }
        buckets
            .into_iter()
            .map(|(date, values)| {
                let value = match aggregation {
                    Aggregation::Mean => mean(&values).unwrap_or(0.0),
                    Aggregation::Sum => values.iter().sum(),
                    Aggregation::Count => values.len() as f64,
                };
                Point { date, value }
            })
            .collect()
    }

    /// Trailing mean over the last `window` available values. The first
    /// points average whatever is available so far.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn moving_average(&self, window: usize) -> Vec<Point> {
        let window = window.max(1);
        let points: Vec<Point> = self.observed().collect();
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let start = (i + 1).saturating_sub(window);
                let slice = &points[start..=i];
                let sum: f64 = slice.iter().map(|p| p.value).sum();
                Point {
                    date: p.date,
                    value: sum / slice.len() as f64,
                }
            })
            .collect()
    }

    /// Change between consecutive recorded values.
    #[must_use]
    pub fn first_differences(&self) -> Vec<f64> {
        self.values().windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Sample standard deviation of the first differences.
    #[must_use]
    pub fn fluctuation(&self) -> Option<f64> {
        sample_std(&self.first_differences())
    }

    /// Least-squares line through the recorded values against their position
    /// (0, 1, 2, ...), ignoring gaps between dates.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn trend(&self) -> Option<Trend> {
        let ys = self.values();
        if ys.len() < 2 {
            return None;
        }
        let n = ys.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = ys.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, y) in ys.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y - y_mean);
            sxx += dx * dx;
        }
        let slope = sxy / sxx;
        Some(Trend {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    /// Largest single-step decrease (most negative difference).
    #[must_use]
    pub fn drawdown(&self) -> Option<f64> {
        self.first_differences().into_iter().reduce(f64::min)
    }

    /// Largest single-step increase.
    #[must_use]
    pub fn runup(&self) -> Option<f64> {
        self.first_differences().into_iter().reduce(f64::max)
    }

    /// Latest value minus the lowest value.
    #[must_use]
    pub fn total_change(&self) -> Option<f64> {
        let values = self.values();
        if values.len() < 2 {
            return None;
        }
        let latest = *values.last()?;
        Some(latest - values.iter().copied().reduce(f64::min)?)
    }

    /// Latest value minus the value recorded exactly `days` earlier.
    #[must_use]
    pub fn change_over(&self, days: i64) -> Option<f64> {
        let latest = self.latest()?;
        let earlier = latest.date - Duration::days(days);
        let before = self
            .observed()
            .find(|p| p.date == earlier)
            .map(|p| p.value)?;
        Some(latest.value - before)
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        mean(&self.values())
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.observed().map(|p| p.value).reduce(f64::min)
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.observed().map(|p| p.value).reduce(f64::max)
    }

    #[must_use]
    pub fn summary(&self) -> SeriesSummary {
        let trend = self.trend();
        SeriesSummary {
            count: self.observed().count(),
            latest: self.latest().map(|p| p.value),
            mean: self.mean(),
            fluctuation: self.fluctuation(),
            trend_slope: trend.map(|t| t.slope),
            trend_intercept: trend.map(|t| t.intercept),
            change_7d: self.change_over(7),
            max_drawdown: self.drawdown(),
            max_runup: self.runup(),
            max: self.max(),
            min: self.min(),
            total_change: self.total_change(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub latest: Option<f64>,
    pub mean: Option<f64>,
    pub fluctuation: Option<f64>,
    pub trend_slope: Option<f64>,
    pub trend_intercept: Option<f64>,
    pub change_7d: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub max_runup: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub total_change: Option<f64>,
}

// --- Free helpers ---

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with one degree of freedom removed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Sample standard deviation over the mean. `None` when the mean is zero.
#[must_use]
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m.abs() < f64::EPSILON {
        return None;
    }
    Some(sample_std(values)? / m)
}

/// One flag per calendar day from the first to the last date given, true
/// where at least one date fell on that day.
#[must_use]
pub fn presence_by_day(dates: &[NaiveDate]) -> Vec<bool> {
    let (Some(&first), Some(&last)) = (dates.iter().min(), dates.iter().max()) else {
        return Vec::new();
    };
    let span = (last - first).num_days();
    let mut present = vec![false; usize::try_from(span + 1).unwrap_or(0)];
    for d in dates {
        if let Ok(i) = usize::try_from((*d - first).num_days()) {
            present[i] = true;
        }
    }
    present
}

/// Length of the run of `true` ending at the last element.
#[must_use]
pub fn streak_current(present: &[bool]) -> usize {
    present.iter().rev().take_while(|&&p| p).count()
}

#[must_use]
pub fn streak_longest(present: &[bool]) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for &p in present {
        if p {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn daily(start: &str, values: &[f64]) -> Series {
        let start = d(start);
        Series::from_values(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (start + Duration::days(i as i64), *v)),
        )
    }

    #[test]
    fn test_trend_on_straight_line() {
        let s = daily("2024-03-01", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let t = s.trend().unwrap();
        assert!((t.slope - 1.0).abs() < 1e-6);
        assert!((t.intercept - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_trend_reindexes_after_gaps() {
        let s = Series::new([
            (d("2024-03-01"), Some(10.0)),
            (d("2024-03-02"), None),
            (d("2024-03-09"), Some(12.0)),
            (d("2024-03-20"), Some(14.0)),
        ]);
        let t = s.trend().unwrap();
        assert!((t.slope - 2.0).abs() < 1e-9);
        assert!((t.intercept - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_is_soft_failure() {
        let s = daily("2024-03-01", &[180.0]);
        assert!(s.trend().is_none());
        assert!(s.fluctuation().is_none());
        assert!(s.drawdown().is_none());
        assert!(s.runup().is_none());
        assert!(s.total_change().is_none());
        assert_eq!(s.mean(), Some(180.0));

        let empty = Series::default();
        let summary = empty.summary();
        assert_eq!(summary.count, 0);
        assert!(summary.mean.is_none());
    }

    #[test]
    fn test_drawdown_runup_and_total_change() {
        let s = daily("2024-03-01", &[180.0, 178.5, 179.0, 176.0, 177.5]);
        assert_eq!(s.first_differences(), vec![-1.5, 0.5, -3.0, 1.5]);
        assert_eq!(s.drawdown(), Some(-3.0));
        assert_eq!(s.runup(), Some(1.5));
        assert_eq!(s.total_change(), Some(1.5));
    }

    #[test]
    fn test_fluctuation_is_std_of_differences() {
        // diffs: 1, 3, 1, 3 -> mean 2, sample variance 4/3
        let s = daily("2024-03-01", &[0.0, 1.0, 4.0, 5.0, 8.0]);
        let f = s.fluctuation().unwrap();
        assert!((f - (4.0f64 / 3.0).sqrt()).abs() < 1e-9);
        // constant climb has no volatility
        let steady = daily("2024-03-01", &[1.0, 2.0, 3.0]);
        assert!(steady.fluctuation().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_partial_windows() {
        let s = daily("2024-03-01", &[2.0, 4.0, 6.0, 8.0]);
        let ma = s.moving_average(3);
        let values: Vec<f64> = ma.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0, 6.0]);
        assert_eq!(ma[3].date, d("2024-03-04"));
    }

    #[test]
    fn test_moving_average_skips_missing() {
        let s = Series::new([
            (d("2024-03-01"), Some(2.0)),
            (d("2024-03-02"), None),
            (d("2024-03-03"), Some(4.0)),
        ]);
        let ma = s.moving_average(7);
        assert_eq!(ma.len(), 2);
        assert!((ma[1].value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_resample_weekly_labels_sunday() {
        // 2024-03-04 is a Monday, 2024-03-10 the Sunday ending its week
        let s = Series::from_values([
            (d("2024-03-04"), 180.0),
            (d("2024-03-10"), 178.0),
            (d("2024-03-11"), 177.0),
        ]);
        let weekly = s.resample(Period::Weekly, Aggregation::Mean);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].date, d("2024-03-10"));
        assert!((weekly[0].value - 179.0).abs() < 1e-12);
        assert_eq!(weekly[1].date, d("2024-03-17"));

        let counts = s.resample(Period::Weekly, Aggregation::Count);
        assert_eq!(counts[0].value, 2.0);
        let sums = s.resample(Period::Weekly, Aggregation::Sum);
        assert_eq!(sums[0].value, 358.0);
    }

    #[test]
    fn test_resample_monthly() {
        let s = Series::from_values([
            (d("2024-02-03"), 10.0),
            (d("2024-02-29"), 20.0),
            (d("2024-12-31"), 5.0),
        ]);
        let monthly = s.resample(Period::Monthly, Aggregation::Mean);
        assert_eq!(monthly[0].date, d("2024-02-29"));
        assert_eq!(monthly[0].value, 15.0);
        assert_eq!(monthly[1].date, d("2024-12-31"));
    }

    #[test]
    fn test_change_over_requires_exact_day() {
        let s = Series::from_values([
            (d("2024-03-01"), 180.0),
            (d("2024-03-05"), 179.0),
            (d("2024-03-08"), 178.0),
        ]);
        assert_eq!(s.change_over(7), Some(-2.0));
        assert_eq!(s.change_over(2), None);
    }

    #[test]
    fn test_window_is_inclusive() {
        let s = daily("2024-03-01", &[1.0, 2.0, 3.0, 4.0]);
        let w = s.window(d("2024-03-02"), d("2024-03-03"));
        assert_eq!(w.values(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_streaks() {
        let present = [true, false, true, true, true];
        assert_eq!(streak_current(&present), 3);
        assert_eq!(streak_longest(&present), 3);

        let present = [true, true, true, true, false, true];
        assert_eq!(streak_current(&present), 1);
        assert_eq!(streak_longest(&present), 4);

        assert_eq!(streak_current(&[]), 0);
        assert_eq!(streak_longest(&[false, false]), 0);
    }

    #[test]
    fn test_presence_by_day_fills_gaps() {
        let present = presence_by_day(&[d("2024-03-01"), d("2024-03-03"), d("2024-03-03")]);
        assert_eq!(present, vec![true, false, true]);
        assert!(presence_by_day(&[]).is_empty());
    }

    #[test]
    fn test_coefficient_of_variation() {
        let cv = coefficient_of_variation(&[10.0, 20.0, 30.0]).unwrap();
        assert!((cv - 0.5).abs() < 1e-12);
        assert!(coefficient_of_variation(&[0.0, 0.0]).is_none());
        assert!(coefficient_of_variation(&[5.0]).is_none());
    }

    #[test]
    fn test_new_sorts_and_dedups() {
        let s = Series::from_values([
            (d("2024-03-03"), 3.0),
            (d("2024-03-01"), 1.0),
            (d("2024-03-03"), 4.0),
        ]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.values(), vec![1.0, 4.0]);
    }
}

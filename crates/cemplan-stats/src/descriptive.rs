/// Summary statistics of a list of scalar values.
///
/// Variance is the population variance (divided by `n`, not `n - 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveStats {
    /// Number of values.
    pub count: usize,
    /// The minimum value.
    pub min: f32,
    /// The maximum value.
    pub max: f32,
    /// The arithmetic mean.
    pub mean: f32,
    /// The median (upper median for even counts).
    pub median: f32,
    /// The population variance.
    pub variance: f32,
    /// The population standard deviation.
    pub std_dev: f32,
}

impl DescriptiveStats {
    /// Computes descriptive statistics from unsorted values.
    ///
    /// NaN values are ordered with [`f32::total_cmp`] and therefore propagate into
    /// `mean` and `variance`.
    ///
    /// # Returns
    ///
    /// * `Some(DescriptiveStats)` - if at least one value is given
    /// * `None` - if `values` is empty
    ///
    /// # Examples
    ///
    /// ```
    /// # use cemplan_stats::descriptive::DescriptiveStats;
    /// let stats = DescriptiveStats::new([5.0, 2.0, 4.0, 1.0, 3.0]).unwrap();
    /// assert_eq!(stats.count, 5);
    /// assert_eq!(stats.median, 3.0);
    /// assert_eq!(stats.variance, 2.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f32>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f32::total_cmp);
        Self::from_sorted(&values)
    }

    /// Like [`Self::new`], but skips sorting.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    #[must_use]
    pub fn from_sorted(sorted_values: &[f32]) -> Option<Self> {
        assert!(
            sorted_values.is_sorted_by(|a, b| a.total_cmp(b).is_le()),
            "values must be sorted in ascending order"
        );

        let min = *sorted_values.first()?;
        let max = *sorted_values.last()?;
        let count = sorted_values.len();
        let mean = mean(sorted_values.iter().copied())?;
        let variance = population_variance(sorted_values.iter().copied(), mean)?;

        Some(Self {
            count,
            min,
            max,
            mean,
            median: sorted_values[count / 2],
            variance,
            std_dev: variance.sqrt(),
        })
    }
}

/// Arithmetic mean of `values`, or `None` when empty.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean<I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = f32>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f32, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Population variance of `values` around `mean`, or `None` when empty.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn population_variance<I>(values: I, mean: f32) -> Option<f32>
where
    I: IntoIterator<Item = f32>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f32, 0_usize), |(sum, count), v| {
            (sum + (v - mean).powi(2), count + 1)
        });
    (count > 0).then(|| sum / count as f32)
}

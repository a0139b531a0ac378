//! Column-wise statistics over a set of equally-sized vectors.
//!
//! Each input row is one sample (for example one flattened parameter vector); the
//! functions here reduce the rows position by position.

/// Elementwise arithmetic mean of `rows`.
///
/// Returns `None` when `rows` is empty.
///
/// # Panics
///
/// Panics if the rows do not all have the same length.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean<R>(rows: &[R]) -> Option<Vec<f32>>
where
    R: AsRef<[f32]>,
{
    let (first, rest) = rows.split_first()?;
    let mut sum = first.as_ref().to_vec();
    for row in rest {
        let row = row.as_ref();
        assert_eq!(row.len(), sum.len(), "rows must have the same length");
        for (s, v) in sum.iter_mut().zip(row) {
            *s += v;
        }
    }
    let n = rows.len() as f32;
    for s in &mut sum {
        *s /= n;
    }
    Some(sum)
}

/// Elementwise population variance of `rows` around `mean`.
///
/// The result is always non-negative (it is a mean of squares). Returns an empty
/// vector when `rows` is empty.
///
/// # Panics
///
/// Panics if a row length differs from `mean.len()`.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn population_variance<R>(rows: &[R], mean: &[f32]) -> Vec<f32>
where
    R: AsRef<[f32]>,
{
    if rows.is_empty() {
        return vec![];
    }
    let mut sum = vec![0.0; mean.len()];
    for row in rows {
        let row = row.as_ref();
        assert_eq!(row.len(), mean.len(), "rows must have the same length");
        for ((s, v), m) in sum.iter_mut().zip(row).zip(mean) {
            *s += (v - m).powi(2);
        }
    }
    let n = rows.len() as f32;
    for s in &mut sum {
        *s /= n;
    }
    sum
}

/// Elementwise population standard deviation of `rows` around `mean`.
#[must_use]
pub fn population_std_dev<R>(rows: &[R], mean: &[f32]) -> Vec<f32>
where
    R: AsRef<[f32]>,
{
    population_variance(rows, mean)
        .into_iter()
        .map(f32::sqrt)
        .collect()
}

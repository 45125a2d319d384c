use std::cmp::Ordering;

#[derive(Debug, Clone, Copy)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// argsort returns the indices that would sort an array. NaN values compare via `total_cmp`,
/// equal values keep their original order.
pub fn argsort(x: &[f64], order: SortOrder) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..x.len()).collect();
    match order {
        SortOrder::Ascending => indices.sort_by(|&a, &b| x[a].total_cmp(&x[b])),
        SortOrder::Descending => indices.sort_by(|&a, &b| x[b].total_cmp(&x[a])),
    }
    indices
}

/// sort_samples orders `[x, f(x)]` samples by increasing x, which is what `lin_interp` expects.
pub fn sort_samples(samples: &mut [[f64; 2]]) {
    samples.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap_or(Ordering::Equal));
}

/// lin_interp returns the linearly interpolated value at x for the given `[x, f(x)]` samples.
/// Samples must be sorted by increasing x. Outside of the sampled range the first or last value
/// is held, so the result always lies between two neighbouring samples. Inspired by
/// numpy.interp.
pub fn lin_interp(x: f64, samples: &[[f64; 2]]) -> f64 {
    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };

    if x <= first[0] {
        return first[1];
    }

    for pair in samples.windows(2) {
        let [x0, f0] = pair[0];
        let [x1, f1] = pair[1];
        if x <= x1 {
            if x1 - x0 <= f64::EPSILON {
                return f1;
            }
            return f0 + (x - x0) * (f1 - f0) / (x1 - x0);
        }
    }

    last[1]
}

/// clamped_lin_interp clamps x to [x_min, x_max] before interpolating.
pub fn clamped_lin_interp(x: f64, x_min: f64, x_max: f64, samples: &[[f64; 2]]) -> f64 {
    lin_interp(x.clamp(x_min, x_max), samples)
}

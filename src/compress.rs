use std::collections::BTreeSet;

use tracing::trace;

use crate::dom::Element;

/// Fraction of interior points to drop, always within `[0.0, 1.0]`.
///
/// `0.0` disables decimation, `1.0` keeps only the first and last point.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Compression(f64);

impl Compression {
    pub const NONE: Self = Self(0.0);
    pub const MAX: Self = Self(1.0);

    /// Clamp `ratio` into range. NaN counts as no compression.
    pub fn new(ratio: f64) -> Self {
        if ratio.is_nan() {
            Self::NONE
        } else {
            Self(ratio.clamp(0.0, 1.0))
        }
    }

    pub fn ratio(self) -> f64 {
        self.0
    }

    pub fn is_enabled(self) -> bool {
        self.0 > 0.0
    }
}

impl From<f64> for Compression {
    fn from(ratio: f64) -> Self {
        Self::new(ratio)
    }
}

/// Original indices to drop from a sequence of `len` points.
///
/// A threshold starts at `1 / ratio` and advances by the same step every time
/// an index reaches it. The first and last index are never returned.
pub fn removal_indices(len: usize, ratio: f64) -> BTreeSet<usize> {
    let step = 1.0 / ratio;
    let mut next_index_to_remove = step;
    let mut doomed = BTreeSet::new();

    for i in 0..len {
        if i == 0 || i == len - 1 {
            continue;
        }
        if i as f64 >= next_index_to_remove {
            doomed.insert(i);
            next_index_to_remove += step;
        }
    }

    doomed
}

/// Decimate the descendants of `container` named `tag`, treating them as one
/// sequence in document order. Returns the number of points removed.
///
/// `ratio` must be greater than zero; callers skip this entirely when
/// compression is disabled.
pub fn compress(container: &mut Element, tag: &str, ratio: f64) -> usize {
    let count = container.count_descendants(tag);
    let doomed = removal_indices(count, ratio);
    if doomed.is_empty() {
        return 0;
    }

    trace!(
        container = container.name(),
        tag,
        count,
        removing = doomed.len(),
        "decimating points"
    );
    container.remove_descendants(tag, &doomed)
}

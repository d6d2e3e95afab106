//! Distance functions consumed by the index.
//!
//! The index only ever calls [`Metric::distance`] and trusts the metric axioms (symmetry, zero on
//! identical inputs, triangle inequality) without checking them. Pruning is only correct when they
//! hold.

use serde::{Serialize, Deserialize};

use crate::data::Descriptor;

/// A pairwise distance over samples of type `S`
pub trait Metric<S: ?Sized> {
    fn distance(&self, a: &S, b: &S) -> f64;
}

impl<S: ?Sized, F> Metric<S> for F
where
    F: Fn(&S, &S) -> f64,
{
    fn distance(&self, a: &S, b: &S) -> f64 {
        self(a, b)
    }
}

fn check_lengths(a: &Descriptor, b: &Descriptor) {
    assert!(a.len() == b.len(), "descriptor length mismatch: {} vs {}", a.len(), b.len());
}

/// L2 distance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Euclidean;

impl Metric<Descriptor> for Euclidean {

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f64 {

        check_lengths(a, b);

        let mut sum: f64 = 0.0;
        for (x, y) in a.data.iter().zip(b.data.iter()) {
            let diff = *x as f64 - *y as f64;
            sum += diff * diff;
        }

        return sum.sqrt();
    }
}

/// Maximum absolute coordinate difference (L-infinity)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Chebyshev;

impl Metric<Descriptor> for Chebyshev {

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f64 {

        check_lengths(a, b);

        let mut max: f64 = 0.0;
        for (x, y) in a.data.iter().zip(b.data.iter()) {
            let diff = (*x as f64 - *y as f64).abs();
            if diff > max {
                max = diff;
            }
        }

        return max;
    }
}

/// Metric selector persisted in a tree's config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Euclidean,
    Chebyshev,
}

impl Metric<Descriptor> for MetricKind {

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> f64 {
        match self {
            MetricKind::Euclidean => Euclidean.distance(a, b),
            MetricKind::Chebyshev => Chebyshev.distance(a, b),
        }
    }
}

//! Index splitting routines.
//!
//! Every routine works on plain integer indices and never touches sample
//! data. Argument validation happens before the random source is consulted,
//! so a rejected call leaves the generator state untouched.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use tracing::instrument;

use crate::error::SplitError;

/// The indices a split operates on: the range `[0, n)` or an explicit,
/// duplicate-free index list kept in caller order.
///
/// Explicit lists can only be built through [`IndexDomain::explicit`], so
/// every domain a split sees is free of duplicates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDomain {
    repr: Repr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Repr {
    Range(usize),
    Explicit(Vec<usize>),
}

impl IndexDomain {
    /// Creates the range domain `[0, n)`.
    #[must_use]
    pub const fn range(n: usize) -> Self {
        Self {
            repr: Repr::Range(n),
        }
    }

    /// Wraps an explicit index list.
    ///
    /// # Errors
    /// Returns [`SplitError::DuplicateIndex`] when an index is listed twice.
    pub fn explicit(indices: Vec<usize>) -> Result<Self, SplitError> {
        let mut seen = HashSet::with_capacity(indices.len());
        for &index in &indices {
            if !seen.insert(index) {
                return Err(SplitError::DuplicateIndex { index });
            }
        }
        Ok(Self::from_unique(indices))
    }

    /// Wraps a list the caller already knows to be duplicate-free, such as
    /// the training side of another split.
    pub(crate) fn from_unique(indices: Vec<usize>) -> Self {
        Self {
            repr: Repr::Explicit(indices),
        }
    }

    /// Whether the domain is an implicit range.
    #[must_use]
    pub fn is_range(&self) -> bool {
        matches!(self.repr, Repr::Range(_))
    }

    /// Number of indices in the domain.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Range(n) => *n,
            Repr::Explicit(indices) => indices.len(),
        }
    }

    /// Whether the domain holds no indices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the indices in domain order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<usize> {
        match &self.repr {
            Repr::Range(n) => (0..*n).collect(),
            Repr::Explicit(indices) => indices.clone(),
        }
    }

    fn sorted(&self) -> Vec<usize> {
        let mut indices = self.to_vec();
        if !self.is_range() {
            indices.sort_unstable();
        }
        indices
    }
}

/// How many indices go to the training side of a split.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrainingSize {
    /// An absolute count, clamped to the domain length.
    Count(usize),
    /// A fraction of the domain length in `[0, 1]`, truncated towards zero.
    Fraction(f64),
}

impl TrainingSize {
    fn validate(self) -> Result<Self, SplitError> {
        match self {
            Self::Fraction(value) if !(0.0..=1.0).contains(&value) => {
                Err(SplitError::InvalidFraction { value })
            }
            other => Ok(other),
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::float_arithmetic,
        reason = "a validated fraction of the length truncates to a count within the length"
    )]
    fn resolve(self, len: usize) -> usize {
        match self {
            Self::Count(count) => count.min(len),
            Self::Fraction(value) => ((len as f64 * value) as usize).min(len),
        }
    }
}

/// A pair of disjoint index sets whose union is the split domain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Split {
    /// Indices used for fitting.
    pub training: Vec<usize>,
    /// Held-out indices.
    pub test: Vec<usize>,
}

impl Split {
    fn at(mut indices: Vec<usize>, training_len: usize) -> Self {
        let test = indices.split_off(training_len);
        Self {
            training: indices,
            test,
        }
    }
}

/// Splits the domain in its given order: the first `size` indices train, the
/// rest are held out.
///
/// # Errors
/// Returns [`SplitError::InvalidFraction`] for a fraction outside `[0, 1]`.
///
/// # Examples
/// ```
/// use moonfold_core::split::{IndexDomain, TrainingSize, plain};
///
/// let split = plain(&IndexDomain::range(5), TrainingSize::Fraction(0.5))?;
/// assert_eq!(split.training, vec![0, 1]);
/// assert_eq!(split.test, vec![2, 3, 4]);
/// # Ok::<(), moonfold_core::SplitError>(())
/// ```
pub fn plain(domain: &IndexDomain, size: TrainingSize) -> Result<Split, SplitError> {
    let training_len = size.validate()?.resolve(domain.len());
    Ok(Split::at(domain.to_vec(), training_len))
}

/// Permutes the domain uniformly at random, then splits it like [`plain`].
///
/// # Errors
/// Returns [`SplitError::InvalidFraction`] for a fraction outside `[0, 1]`.
pub fn holdout<R: Rng + ?Sized>(
    domain: &IndexDomain,
    size: TrainingSize,
    rng: &mut R,
) -> Result<Split, SplitError> {
    let training_len = size.validate()?.resolve(domain.len());
    Ok(shuffled_split(domain, training_len, rng))
}

/// Runs `repetitions` independent holdout splits from one advancing stream.
///
/// # Errors
/// Returns [`SplitError::ZeroRepetitions`] when `repetitions` is zero and
/// [`SplitError::InvalidFraction`] for a fraction outside `[0, 1]`.
pub fn repeated_holdout<R: Rng + ?Sized>(
    domain: &IndexDomain,
    size: TrainingSize,
    repetitions: usize,
    rng: &mut R,
) -> Result<Vec<Split>, SplitError> {
    if repetitions == 0 {
        return Err(SplitError::ZeroRepetitions);
    }
    let training_len = size.validate()?.resolve(domain.len());
    Ok((0..repetitions)
        .map(|_| shuffled_split(domain, training_len, rng))
        .collect())
}

fn shuffled_split<R: Rng + ?Sized>(
    domain: &IndexDomain,
    training_len: usize,
    rng: &mut R,
) -> Split {
    let mut indices = domain.to_vec();
    indices.shuffle(rng);
    Split::at(indices, training_len)
}

/// Partitions a permutation of the domain into `folds` near-equal chunks.
///
/// Fold `k` holds chunk `k` as its test set, in permutation order. Its
/// training set is the domain minus that chunk, sorted ascending. Earlier
/// chunks absorb the remainder when the domain length is not a multiple of
/// `folds`; with more folds than indices the trailing chunks are empty.
///
/// # Errors
/// Returns [`SplitError::ZeroFolds`] when `folds` is zero.
///
/// # Examples
/// ```
/// use moonfold_core::split::{IndexDomain, kfold};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let splits = kfold(&IndexDomain::range(10), 3, &mut StdRng::seed_from_u64(7))?;
/// let sizes: Vec<_> = splits.iter().map(|s| s.test.len()).collect();
/// assert_eq!(sizes, vec![4, 3, 3]);
/// assert!(splits.iter().all(|s| s.training.len() + s.test.len() == 10));
/// # Ok::<(), moonfold_core::SplitError>(())
/// ```
#[instrument(name = "split.kfold", err, skip(domain, rng), fields(len = domain.len()))]
pub fn kfold<R: Rng + ?Sized>(
    domain: &IndexDomain,
    folds: usize,
    rng: &mut R,
) -> Result<Vec<Split>, SplitError> {
    let (Some(base), Some(remainder)) = (
        domain.len().checked_div(folds),
        domain.len().checked_rem(folds),
    ) else {
        return Err(SplitError::ZeroFolds);
    };
    let mut permutation = domain.to_vec();
    permutation.shuffle(rng);
    let sorted = domain.sorted();

    let mut splits = Vec::with_capacity(folds);
    let mut start = 0;
    for fold in 0..folds {
        let size = base + usize::from(fold < remainder);
        let test = permutation[start..start + size].to_vec();
        start += size;
        let held: HashSet<usize> = test.iter().copied().collect();
        let training = sorted
            .iter()
            .copied()
            .filter(|index| !held.contains(index))
            .collect();
        splits.push(Split { training, test });
    }
    Ok(splits)
}

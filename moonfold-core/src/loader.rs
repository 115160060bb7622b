//! Batch iteration over dataset views.

use std::{fmt, str::FromStr};

use rand::{Rng, rngs::SmallRng, seq::SliceRandom};
use tracing::error;

use crate::{
    dataset::SampleDataset,
    device::Device,
    error::LoaderError,
    sample::{Label, Point},
};

/// Order in which a loader visits its dataset on each pass.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum IterationStrategy {
    /// Position order, identical on every pass. Parsed from `none`.
    Sequential,
    /// A fresh uniform permutation on every pass.
    #[default]
    Shuffle,
    /// Positions drawn with replacement on every pass, `n_batches ×
    /// batch_size` of them.
    Bootstrap,
}

impl IterationStrategy {
    /// Returns the token this strategy is parsed from.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "none",
            Self::Shuffle => "shuffle",
            Self::Bootstrap => "bootstrap",
        }
    }
}

impl fmt::Display for IterationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IterationStrategy {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::Sequential),
            "shuffle" => Ok(Self::Shuffle),
            "bootstrap" => Ok(Self::Bootstrap),
            _ => Err(LoaderError::InvalidStrategy {
                provided: s.to_owned(),
            }),
        }
    }
}

/// One materialised batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// Global sample indices, in batch order.
    pub indices: Vec<usize>,
    /// Sample coordinates.
    pub points: Vec<Point>,
    /// Sample labels.
    pub labels: Vec<Label>,
    /// Device the batch was read from.
    pub device: Device,
}

impl Batch {
    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Splits a dataset into batches according to an [`IterationStrategy`].
///
/// The loader owns its dataset view and its random stream, so two loaders
/// never influence each other's pass order.
///
/// # Examples
/// ```
/// use moonfold_core::{BatchLoader, Device, IterationStrategy, Label, Point, SampleDataset, SampleTable};
/// use rand::{SeedableRng, rngs::SmallRng};
///
/// let table = SampleTable::new(vec![Point::default(); 5], vec![Label::Zero; 5])?;
/// let dataset = SampleDataset::from_table(table, Device::cpu());
/// let mut loader = BatchLoader::new(
///     dataset,
///     IterationStrategy::Sequential,
///     2,
///     false,
///     SmallRng::seed_from_u64(0),
/// )?;
/// let sizes: Vec<_> = loader.epoch().map(|batch| batch.len()).collect();
/// assert_eq!(sizes, vec![2, 2, 1]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug)]
pub struct BatchLoader {
    dataset: SampleDataset,
    strategy: IterationStrategy,
    batch_size: usize,
    drop_last: bool,
    rng: SmallRng,
}

impl BatchLoader {
    /// Creates a loader over `dataset`.
    ///
    /// # Errors
    /// Returns [`LoaderError::ZeroBatchSize`] when `batch_size` is zero.
    pub fn new(
        dataset: SampleDataset,
        strategy: IterationStrategy,
        batch_size: usize,
        drop_last: bool,
        rng: SmallRng,
    ) -> Result<Self, LoaderError> {
        if batch_size == 0 {
            return Err(LoaderError::ZeroBatchSize);
        }
        Ok(Self {
            dataset,
            strategy,
            batch_size,
            drop_last,
            rng,
        })
    }

    /// Number of batches per pass: `⌊len / batch⌋` when the short final
    /// batch is dropped, `⌈len / batch⌉` otherwise.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let len = self.dataset.len();
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }

    /// `n_batches × batch_size`, the number of items a bootstrap pass yields.
    #[must_use]
    pub fn effective_len(&self) -> usize {
        self.n_batches() * self.batch_size
    }

    /// Current batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Replaces the batch size used by subsequent passes.
    ///
    /// # Errors
    /// Returns [`LoaderError::ZeroBatchSize`] when `batch_size` is zero; the
    /// previous size is kept.
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), LoaderError> {
        if batch_size == 0 {
            return Err(LoaderError::ZeroBatchSize);
        }
        self.batch_size = batch_size;
        Ok(())
    }

    /// Whether a short final batch is dropped.
    #[must_use]
    pub fn drop_last(&self) -> bool {
        self.drop_last
    }

    /// Sets whether a short final batch is dropped.
    pub fn set_drop_last(&mut self, drop_last: bool) {
        self.drop_last = drop_last;
    }

    /// Current iteration strategy.
    #[must_use]
    pub fn strategy(&self) -> IterationStrategy {
        self.strategy
    }

    /// Replaces the iteration strategy used by subsequent passes.
    pub fn set_strategy(&mut self, strategy: IterationStrategy) {
        self.strategy = strategy;
    }

    /// The dataset view this loader iterates.
    #[must_use]
    pub fn dataset(&self) -> &SampleDataset {
        &self.dataset
    }

    /// Mutable access to the dataset view, e.g. to relocate it.
    pub fn dataset_mut(&mut self) -> &mut SampleDataset {
        &mut self.dataset
    }

    /// Moves the dataset view to `device` without touching its indices.
    pub fn relocate(&mut self, device: &Device) {
        self.dataset = self.dataset.to(device);
    }

    /// Starts a pass, drawing the visiting order from the loader's stream.
    pub fn epoch(&mut self) -> Epoch<'_> {
        let order = self.draw_order();
        Epoch {
            dataset: &self.dataset,
            order,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }

    fn draw_order(&mut self) -> Vec<usize> {
        let len = self.dataset.len();
        let effective = self.effective_len();
        let visible = if self.drop_last { effective } else { len };
        match self.strategy {
            IterationStrategy::Sequential => (0..visible).collect(),
            IterationStrategy::Shuffle => {
                let mut order: Vec<usize> = (0..len).collect();
                order.shuffle(&mut self.rng);
                order.truncate(visible);
                order
            }
            IterationStrategy::Bootstrap => {
                let rng = &mut self.rng;
                (0..effective).map(|_| rng.gen_range(0..len)).collect()
            }
        }
    }
}

/// One pass of a [`BatchLoader`].
#[derive(Debug)]
pub struct Epoch<'a> {
    dataset: &'a SampleDataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Epoch<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.order.get(self.cursor..)?;
        if remaining.is_empty() {
            return None;
        }
        let take = remaining.len().min(self.batch_size);
        let mut batch = Batch {
            indices: Vec::with_capacity(take),
            points: Vec::with_capacity(take),
            labels: Vec::with_capacity(take),
            device: self.dataset.device().clone(),
        };
        for &position in remaining.iter().take(take) {
            let Some((index, sample)) = self.dataset.entry(position) else {
                error!(
                    position,
                    len = self.dataset.len(),
                    "batch position outside the dataset view"
                );
                continue;
            };
            batch.indices.push(index);
            batch.points.push(sample.point);
            batch.labels.push(sample.label);
        }
        self.cursor += take;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.order.len().saturating_sub(self.cursor);
        let batches = remaining.div_ceil(self.batch_size);
        (batches, Some(batches))
    }
}

impl ExactSizeIterator for Epoch<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleTable;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rstest::{fixture, rstest};

    use crate::test_utils::suite_proptest_config;

    fn dataset_of(len: usize) -> SampleDataset {
        let points = (0..len)
            .map(|i| Point::new(i as f64, 0.0))
            .collect();
        let table = SampleTable::new(points, vec![Label::One; len]).expect("aligned columns");
        SampleDataset::from_table(table, Device::cpu())
    }

    #[fixture]
    fn seven() -> SampleDataset {
        dataset_of(7)
    }

    fn loader(
        dataset: SampleDataset,
        strategy: IterationStrategy,
        batch_size: usize,
        drop_last: bool,
    ) -> BatchLoader {
        BatchLoader::new(
            dataset,
            strategy,
            batch_size,
            drop_last,
            SmallRng::seed_from_u64(99),
        )
        .expect("positive batch size")
    }

    #[rstest]
    #[case("none", IterationStrategy::Sequential)]
    #[case("shuffle", IterationStrategy::Shuffle)]
    #[case(" Bootstrap ", IterationStrategy::Bootstrap)]
    fn parses_strategy_tokens(#[case] raw: &str, #[case] expected: IterationStrategy) {
        assert_eq!(raw.parse::<IterationStrategy>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert_eq!(
            "sorted".parse::<IterationStrategy>(),
            Err(LoaderError::InvalidStrategy {
                provided: "sorted".to_owned(),
            })
        );
    }

    #[rstest]
    fn rejects_zero_batch_size(seven: SampleDataset) {
        let err = BatchLoader::new(
            seven,
            IterationStrategy::Shuffle,
            0,
            false,
            SmallRng::seed_from_u64(0),
        )
        .expect_err("zero batch size");
        assert_eq!(err, LoaderError::ZeroBatchSize);
    }

    #[rstest]
    #[case::keep(false, 3, vec![3, 3, 1])]
    #[case::drop(true, 2, vec![3, 3])]
    fn sequential_pass_respects_drop_policy(
        seven: SampleDataset,
        #[case] drop_last: bool,
        #[case] n_batches: usize,
        #[case] sizes: Vec<usize>,
    ) {
        let mut loader = loader(seven, IterationStrategy::Sequential, 3, drop_last);
        assert_eq!(loader.n_batches(), n_batches);
        assert_eq!(loader.effective_len(), n_batches * 3);
        let batches: Vec<Batch> = loader.epoch().collect();
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), sizes);
        let indices: Vec<usize> = batches.into_iter().flat_map(|b| b.indices).collect();
        assert_eq!(indices, (0..indices.len()).collect::<Vec<_>>());
    }

    #[rstest]
    fn shuffle_visits_every_member_once_in_a_fresh_order(seven: SampleDataset) {
        let view = seven.subset(&[6, 5, 4, 3, 2, 1, 0]).expect("positions in range");
        let mut loader = loader(view, IterationStrategy::Shuffle, 2, false);
        let first: Vec<usize> = loader.epoch().flat_map(|b| b.indices).collect();
        let second: Vec<usize> = loader.epoch().flat_map(|b| b.indices).collect();
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..7).collect::<Vec<_>>());
        let mut sorted = second.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..7).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[rstest]
    #[case::keep(false, 9)]
    #[case::drop(true, 6)]
    fn bootstrap_yields_whole_batches(
        seven: SampleDataset,
        #[case] drop_last: bool,
        #[case] expected: usize,
    ) {
        let mut loader = loader(seven, IterationStrategy::Bootstrap, 3, drop_last);
        let batches: Vec<Batch> = loader.epoch().collect();
        assert!(batches.iter().all(|b| b.len() == 3));
        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, expected);
        assert_eq!(total, loader.effective_len());
        assert!(batches.iter().flat_map(|b| &b.indices).all(|&i| i < 7));
    }

    #[rstest]
    fn batch_size_changes_apply_to_the_next_pass(seven: SampleDataset) {
        let mut loader = loader(seven, IterationStrategy::Sequential, 3, false);
        loader.set_batch_size(4).expect("positive batch size");
        assert_eq!(loader.epoch().len(), 2);
        assert_eq!(loader.set_batch_size(0), Err(LoaderError::ZeroBatchSize));
        assert_eq!(loader.batch_size(), 4);
    }

    #[rstest]
    fn relocation_changes_batch_device_only(seven: SampleDataset) {
        let mut loader = loader(seven, IterationStrategy::Sequential, 7, false);
        let before: Vec<Batch> = loader.epoch().collect();
        let cuda = Device::parse("cuda:1").expect("valid token");
        loader.relocate(&cuda);
        let after: Vec<Batch> = loader.epoch().collect();
        assert_eq!(after[0].device, cuda);
        assert_eq!(after[0].indices, before[0].indices);
        assert_eq!(after[0].points, before[0].points);
    }

    #[rstest]
    fn drop_policy_can_be_switched_between_passes(seven: SampleDataset) {
        let mut loader = loader(seven, IterationStrategy::Shuffle, 3, false);
        assert!(!loader.drop_last());
        assert_eq!(loader.epoch().map(|b| b.len()).sum::<usize>(), 7);
        loader.set_drop_last(true);
        assert!(loader.drop_last());
        assert_eq!(loader.n_batches(), 2);
        let sizes: Vec<usize> = loader.epoch().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[rstest]
    fn positions_outside_the_view_are_reported(seven: SampleDataset) {
        use moonfold_test_support::tracing::EventRecorder;
        use tracing_subscriber::layer::SubscriberExt;

        let recorder = EventRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let batch = tracing::subscriber::with_default(subscriber, || {
            let mut epoch = Epoch {
                dataset: &seven,
                order: vec![2, 11],
                batch_size: 2,
                cursor: 0,
            };
            epoch.next()
        })
        .expect("one batch");
        assert_eq!(batch.indices, vec![2]);
        let reported = recorder.with_message("batch position outside the dataset view");
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].field("position"), Some("11"));
        assert_eq!(reported[0].level, tracing::Level::ERROR);
    }

    #[test]
    fn empty_dataset_yields_no_batches() {
        let mut loader = loader(dataset_of(0), IterationStrategy::Bootstrap, 4, false);
        assert_eq!(loader.n_batches(), 0);
        assert_eq!(loader.epoch().count(), 0);
    }

    proptest! {
        #![proptest_config(suite_proptest_config(64))]

        #[test]
        fn bootstrap_total_is_batch_multiple(len in 0usize..60, batch in 1usize..9, drop_last in any::<bool>()) {
            let mut loader = loader(dataset_of(len), IterationStrategy::Bootstrap, batch, drop_last);
            let total: usize = loader.epoch().map(|b| b.len()).sum();
            prop_assert_eq!(total, loader.n_batches() * batch);
        }

        #[test]
        fn sequential_keep_covers_the_dataset(len in 0usize..60, batch in 1usize..9) {
            let mut loader = loader(dataset_of(len), IterationStrategy::Sequential, batch, false);
            let total: usize = loader.epoch().map(|b| b.len()).sum();
            prop_assert_eq!(total, len);
            prop_assert!(loader.effective_len() >= len);
        }
    }
}

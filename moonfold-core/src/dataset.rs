//! Device-tagged sample storage and index-remapped dataset views.
//!
//! Storage is reference counted. Taking a subset or moving a dataset to a
//! different device never copies sample data; a view only owns its position
//! remapping and its device tag.

use std::sync::Arc;

use crate::{
    device::Device,
    error::DatasetError,
    sample::{Label, Point, Sample, SampleTable},
};

/// An immutable contiguous array placed on a compute device.
#[derive(Clone, Debug)]
pub struct DeviceBuffer<T> {
    values: Arc<[T]>,
    device: Device,
}

impl<T> DeviceBuffer<T> {
    /// Places `values` on `device`.
    pub fn new(values: impl Into<Arc<[T]>>, device: Device) -> Self {
        Self {
            values: values.into(),
            device,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrows the elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Device the buffer is placed on.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns a handle to the same storage tagged with `device`.
    #[must_use]
    pub fn to(&self, device: Device) -> Self {
        Self {
            values: Arc::clone(&self.values),
            device,
        }
    }

    /// Whether both handles point at the same allocation.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

/// A dataset over shared point and label storage.
///
/// The full dataset addresses storage directly. Views created through
/// [`SampleDataset::subset`] carry a remapping from view position to storage
/// row, and views of views compose their remappings so lookups stay one hop.
///
/// # Examples
/// ```
/// use moonfold_core::{Device, Label, Point, SampleDataset, SampleTable};
///
/// let table = SampleTable::new(
///     vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)],
///     vec![Label::Zero, Label::One, Label::Zero],
/// )?;
/// let full = SampleDataset::from_table(table, Device::cpu());
/// let view = full.subset(&[2, 0])?;
/// assert_eq!(view.len(), 2);
/// assert_eq!(view.get(0), full.get(2));
/// assert!(view.shares_storage_with(&full));
/// # Ok::<(), moonfold_core::DatasetError>(())
/// ```
#[derive(Clone, Debug)]
pub struct SampleDataset {
    points: DeviceBuffer<Point>,
    labels: DeviceBuffer<Label>,
    rows: Option<Arc<[usize]>>,
}

impl SampleDataset {
    /// Pairs point and label buffers into a full dataset.
    ///
    /// # Errors
    /// Returns [`DatasetError::ShapeMismatch`] when the buffers differ in
    /// length and [`DatasetError::DeviceMismatch`] when they sit on different
    /// devices.
    pub fn new(
        points: DeviceBuffer<Point>,
        labels: DeviceBuffer<Label>,
    ) -> Result<Self, DatasetError> {
        if points.len() != labels.len() {
            return Err(DatasetError::ShapeMismatch {
                points: points.len(),
                labels: labels.len(),
            });
        }
        if points.device() != labels.device() {
            return Err(DatasetError::DeviceMismatch {
                points: points.device().clone(),
                labels: labels.device().clone(),
            });
        }
        Ok(Self {
            points,
            labels,
            rows: None,
        })
    }

    /// Places a sample table on `device` as a full dataset.
    #[must_use]
    pub fn from_table(table: SampleTable, device: Device) -> Self {
        let (points, labels) = table.into_parts();
        Self {
            points: DeviceBuffer::new(points, device.clone()),
            labels: DeviceBuffer::new(labels, device),
            rows: None,
        }
    }

    /// Number of samples visible through this dataset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.as_ref().map_or(self.points.len(), |rows| rows.len())
    }

    /// Whether no samples are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device the storage is placed on.
    #[must_use]
    pub fn device(&self) -> &Device {
        self.points.device()
    }

    /// Whether this dataset remaps positions onto its storage.
    #[must_use]
    pub fn is_view(&self) -> bool {
        self.rows.is_some()
    }

    /// Maps a position in this dataset to the global sample index.
    #[must_use]
    pub fn global_index(&self, position: usize) -> Option<usize> {
        match &self.rows {
            Some(rows) => rows.get(position).copied(),
            None => (position < self.points.len()).then_some(position),
        }
    }

    /// Returns the global indices of every visible sample in position order.
    #[must_use]
    pub fn global_indices(&self) -> Vec<usize> {
        match &self.rows {
            Some(rows) => rows.to_vec(),
            None => (0..self.points.len()).collect(),
        }
    }

    /// Returns the sample at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<Sample> {
        self.entry(position).map(|(_, sample)| sample)
    }

    /// Returns the global index and sample at `position` with one remapping
    /// lookup.
    #[must_use]
    pub fn entry(&self, position: usize) -> Option<(usize, Sample)> {
        let row = self.global_index(position)?;
        let point = *self.points.as_slice().get(row)?;
        let label = *self.labels.as_slice().get(row)?;
        Some((row, Sample { point, label }))
    }

    /// Creates a view of the samples at `positions`, in that order.
    ///
    /// # Errors
    /// Returns [`DatasetError::IndexOutOfBounds`] for the first position at or
    /// beyond [`SampleDataset::len`].
    pub fn subset(&self, positions: &[usize]) -> Result<Self, DatasetError> {
        let rows = positions
            .iter()
            .map(|&position| {
                self.global_index(position)
                    .ok_or_else(|| DatasetError::IndexOutOfBounds {
                        index: position,
                        len: self.len(),
                    })
            })
            .collect::<Result<Arc<[usize]>, _>>()?;
        Ok(Self {
            points: self.points.clone(),
            labels: self.labels.clone(),
            rows: Some(rows),
        })
    }

    /// Returns the same view with its storage tagged for `device`.
    #[must_use]
    pub fn to(&self, device: &Device) -> Self {
        Self {
            points: self.points.to(device.clone()),
            labels: self.labels.to(device.clone()),
            rows: self.rows.clone(),
        }
    }

    /// Whether both datasets read from the same point and label allocations.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        self.points.shares_storage_with(&other.points)
            && self.labels.shares_storage_with(&other.labels)
    }

    /// Iterates visible samples in position order.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.len()).filter_map(|position| self.get(position))
    }
}

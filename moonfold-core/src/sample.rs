//! Labelled 2D samples and the flat table they are stored in.

use crate::error::DatasetError;

/// A coordinate on the cartesian plane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    /// Horizontal coordinate.
    pub x1: f64,
    /// Vertical coordinate.
    pub x2: f64,
}

impl Point {
    /// Creates a point from its two coordinates.
    #[must_use]
    pub const fn new(x1: f64, x2: f64) -> Self {
        Self { x1, x2 }
    }

    /// Returns the squared Euclidean distance to `other`.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "distance computation requires floating-point arithmetic"
    )]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x1 - other.x1;
        let dy = self.x2 - other.x2;
        dx * dx + dy * dy
    }
}

/// Binary class label. Class 0 is the upper moon, class 1 the lower one.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Label {
    /// Moon 0.
    Zero,
    /// Moon 1.
    One,
}

impl Label {
    /// Returns the integer encoding used in artifacts.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

impl TryFrom<u8> for Label {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            other => Err(other),
        }
    }
}

/// One labelled sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Sample coordinates.
    pub point: Point,
    /// Sample class.
    pub label: Label,
}

/// An ordered table of labelled points; row order defines global indices.
///
/// # Examples
/// ```
/// use moonfold_core::{Label, Point, SampleTable};
///
/// let table = SampleTable::new(
///     vec![Point::new(0.0, 1.0), Point::new(1.0, 0.0)],
///     vec![Label::Zero, Label::One],
/// )?;
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.class_counts(), (1, 1));
/// # Ok::<(), moonfold_core::DatasetError>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleTable {
    points: Vec<Point>,
    labels: Vec<Label>,
}

impl SampleTable {
    /// Pairs points with labels.
    ///
    /// # Errors
    /// Returns [`DatasetError::ShapeMismatch`] when the lengths differ.
    pub fn new(points: Vec<Point>, labels: Vec<Label>) -> Result<Self, DatasetError> {
        if points.len() != labels.len() {
            return Err(DatasetError::ShapeMismatch {
                points: points.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { points, labels })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Row coordinates in global-index order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Row labels in global-index order.
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Returns the row at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Sample> {
        let point = *self.points.get(index)?;
        let label = *self.labels.get(index)?;
        Some(Sample { point, label })
    }

    /// Iterates rows in global-index order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Sample> + '_ {
        self.points
            .iter()
            .zip(&self.labels)
            .map(|(&point, &label)| Sample { point, label })
    }

    /// Counts rows per class as `(class 0, class 1)`.
    #[must_use]
    pub fn class_counts(&self) -> (usize, usize) {
        let ones = self.labels.iter().filter(|&&l| l == Label::One).count();
        (self.labels.len() - ones, ones)
    }

    /// Splits the table into its point and label columns.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Point>, Vec<Label>) {
        (self.points, self.labels)
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.points.push(sample.point);
        self.labels.push(sample.label);
    }

    pub(crate) fn append(&mut self, points: Vec<Point>, label: Label) {
        self.labels
            .extend(std::iter::repeat_n(label, points.len()));
        self.points.extend(points);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Ok(Label::Zero))]
    #[case(1, Ok(Label::One))]
    #[case(2, Err(2))]
    fn label_decodes_wire_values(#[case] raw: u8, #[case] expected: Result<Label, u8>) {
        assert_eq!(Label::try_from(raw), expected);
    }

    #[test]
    fn table_rejects_shape_mismatch() {
        let err = SampleTable::new(vec![Point::default(); 3], vec![Label::One; 2])
            .expect_err("mismatched columns must fail");
        assert_eq!(err, DatasetError::ShapeMismatch { points: 3, labels: 2 });
    }

    #[test]
    fn append_keeps_columns_aligned() {
        let mut table = SampleTable::default();
        table.append(vec![Point::new(1.0, 2.0); 2], Label::Zero);
        table.append(vec![Point::new(3.0, 4.0)], Label::One);
        assert_eq!(table.len(), 3);
        assert_eq!(table.class_counts(), (2, 1));
        let last = table.get(2).expect("row 2 exists");
        assert_eq!(last.label, Label::One);
        assert_eq!(last.point, Point::new(3.0, 4.0));
    }
}

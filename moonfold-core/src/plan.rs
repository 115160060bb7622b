//! Nested cross-validation index plans.
//!
//! A plan is a rectangular `outer × inner` grid. Each cell holds the
//! training, validation and test indices of one inner fold; the test set of
//! a cell is the outer test fold and is shared by every inner fold of that
//! outer fold.

use std::io::{Read, Write};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{PlanError, SplitError},
    split::{IndexDomain, kfold},
};

/// Index sets of one `(outer, inner)` cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldIndices {
    /// Inner training indices.
    pub training: Vec<usize>,
    /// Inner validation indices.
    pub validation: Vec<usize>,
    /// Outer test indices.
    pub test: Vec<usize>,
}

impl FoldIndices {
    /// Returns the design set, the sorted union of training and validation.
    #[must_use]
    pub fn design(&self) -> Vec<usize> {
        let mut design = Vec::with_capacity(self.training.len() + self.validation.len());
        design.extend(&self.training);
        design.extend(&self.validation);
        design.sort_unstable();
        design
    }
}

/// A rectangular grid of [`FoldIndices`], serialised as
/// `array[outer][inner]`.
///
/// # Examples
/// ```
/// use moonfold_core::NestedFoldPlan;
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let plan = NestedFoldPlan::generate(20, 4, 3, &mut StdRng::seed_from_u64(42))?;
/// assert_eq!(plan.shape(), (4, 3));
/// plan.validate(20)?;
/// # Ok::<(), moonfold_core::PlanError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedFoldPlan {
    cells: Vec<Vec<FoldIndices>>,
}

impl NestedFoldPlan {
    /// Runs k-fold over `[0, total)` for the outer level, then k-fold over
    /// each outer design set for the inner level, drawing every permutation
    /// from the same stream in outer-fold order.
    ///
    /// # Errors
    /// Returns [`PlanError::Split`] wrapping [`SplitError::ZeroFolds`] when
    /// either fold count is zero; the stream is not touched in that case.
    #[instrument(name = "plan.generate", err, skip(rng))]
    pub fn generate<R: Rng + ?Sized>(
        total: usize,
        outer_folds: usize,
        inner_folds: usize,
        rng: &mut R,
    ) -> Result<Self, PlanError> {
        if outer_folds == 0 || inner_folds == 0 {
            return Err(SplitError::ZeroFolds.into());
        }
        let outer = kfold(&IndexDomain::range(total), outer_folds, rng)?;
        let mut cells = Vec::with_capacity(outer.len());
        for outer_split in outer {
            // Outer training sets come from a duplicate-free range.
            let design = IndexDomain::from_unique(outer_split.training);
            let row = kfold(&design, inner_folds, rng)?
                .into_iter()
                .map(|inner_split| FoldIndices {
                    training: inner_split.training,
                    validation: inner_split.test,
                    test: outer_split.test.clone(),
                })
                .collect();
            cells.push(row);
        }
        debug!(outer_folds, inner_folds, "nested fold plan generated");
        Ok(Self { cells })
    }

    /// Wraps a grid without checking it; call [`NestedFoldPlan::validate`]
    /// before trusting the result.
    #[must_use]
    pub fn from_cells(cells: Vec<Vec<FoldIndices>>) -> Self {
        Self { cells }
    }

    /// Returns `(outer folds, inner folds)`, reading the inner count from the
    /// first outer fold.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        let inner = self.cells.first().map_or(0, Vec::len);
        (self.cells.len(), inner)
    }

    /// Returns the cell at `(outer, inner)`.
    #[must_use]
    pub fn get(&self, outer: usize, inner: usize) -> Option<&FoldIndices> {
        self.cells.get(outer)?.get(inner)
    }

    /// Returns the grid rows.
    #[must_use]
    pub fn cells(&self) -> &[Vec<FoldIndices>] {
        &self.cells
    }

    /// Iterates cells in row-major order together with their position.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &FoldIndices)> + '_ {
        self.cells.iter().enumerate().flat_map(|(outer, row)| {
            row.iter()
                .enumerate()
                .map(move |(inner, cell)| ((outer, inner), cell))
        })
    }

    /// Checks the grid against a dataset of `total` samples.
    ///
    /// # Errors
    /// Returns the first [`PlanError`] found: an empty or ragged grid, an
    /// index outside `[0, total)`, sets that overlap or miss an index, a test
    /// set that changes across inner folds, outer test sets that do not
    /// partition `[0, total)`, or inner validation sets that do not partition
    /// their design set.
    pub fn validate(&self, total: usize) -> Result<(), PlanError> {
        let (outer_folds, inner_folds) = self.shape();
        if outer_folds == 0 || inner_folds == 0 {
            return Err(PlanError::EmptyGrid);
        }
        for (outer, row) in self.cells.iter().enumerate() {
            if row.len() != inner_folds {
                return Err(PlanError::RaggedGrid {
                    outer,
                    expected: inner_folds,
                    actual: row.len(),
                });
            }
        }
        for ((outer, inner), cell) in self.iter() {
            check_cell(outer, inner, cell, total)?;
        }

        let mut outer_hits = vec![0_usize; total];
        for (outer, row) in self.cells.iter().enumerate() {
            let mut validation_hits = vec![0_usize; total];
            for (inner, cell) in row.iter().enumerate() {
                if cell.test != row[0].test {
                    return Err(PlanError::TestSetVaries { outer, inner });
                }
                for &index in &cell.validation {
                    validation_hits[index] += 1;
                }
            }
            let mut in_test = vec![false; total];
            for &index in &row[0].test {
                outer_hits[index] += 1;
                in_test[index] = true;
            }
            if let Some(index) = (0..total).find(|&i| !in_test[i] && validation_hits[i] != 1) {
                return Err(PlanError::InnerValidationsNotPartition {
                    outer,
                    index,
                    occurrences: validation_hits[index],
                });
            }
        }
        if let Some(index) = outer_hits.iter().position(|&hits| hits != 1) {
            return Err(PlanError::OuterTestsNotPartition {
                index,
                occurrences: outer_hits[index],
            });
        }
        Ok(())
    }

    /// Writes the plan as one JSON document.
    ///
    /// # Errors
    /// Propagates serialisation and I/O failures from `serde_json`.
    pub fn to_json_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    /// Reads a plan previously written by [`NestedFoldPlan::to_json_writer`].
    /// The result is not validated.
    ///
    /// # Errors
    /// Propagates parse and I/O failures from `serde_json`.
    pub fn from_json_reader<R: Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}

fn check_cell(
    outer: usize,
    inner: usize,
    cell: &FoldIndices,
    total: usize,
) -> Result<(), PlanError> {
    let mut seen = vec![false; total];
    let members = cell
        .training
        .iter()
        .chain(&cell.validation)
        .chain(&cell.test);
    for &index in members {
        let Some(slot) = seen.get_mut(index) else {
            return Err(PlanError::IndexOutOfRange {
                outer,
                inner,
                index,
                total,
            });
        };
        if *slot {
            return Err(PlanError::OverlappingSets {
                outer,
                inner,
                index,
            });
        }
        *slot = true;
    }
    match seen.iter().position(|&hit| !hit) {
        Some(index) => Err(PlanError::IncompleteCoverage {
            outer,
            inner,
            index,
        }),
        None => Ok(()),
    }
}

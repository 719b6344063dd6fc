//! Random-hyperplane LSH model.
//!
//! Each of the `nb_tables` hash tables owns `nb_bits_per_table` hyperplane
//! normals drawn from N(0, 1). A vector's code for a table is the sign
//! pattern of its projections onto those normals, packed into an integer
//! with bit `i` set when projection `i` is non-negative.
//!
//! The normals are fully determined by `(bases_seed, nb_tables,
//! nb_bits_per_table, nb_dimensions)`, so an evicted or never-persisted
//! basis can always be regenerated bit for bit.
//!
//! References:
//! - Charikar (2002): "Similarity estimation techniques from rounding algorithms"

use crate::error::{AknnError, Result};
use crate::lsh::record::LshModelRecord;
use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::collections::BTreeMap;

/// Widest table code that still fits a signed 64-bit integer.
pub const MAX_BITS_PER_TABLE: usize = 63;

/// Fixed per-model overhead added to the basis size when weighing a model.
const MODEL_OVERHEAD_BYTES: u64 = 256;

/// Hash codes of one vector: stringified table index -> table code.
pub type VectorHashes = BTreeMap<String, u64>;

/// A random-hyperplane LSH model.
///
/// Immutable once shared; lazy basis generation produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct LshModel {
    nb_tables: usize,
    nb_bits_per_table: usize,
    nb_dimensions: Option<usize>,
    description: String,
    bases_seed: i64,
    /// One `nb_bits_per_table x nb_dimensions` matrix per table.
    bases: Option<Vec<Array2<f64>>>,
}

impl LshModel {
    /// Creates a model whose bases are drawn from `seed`.
    ///
    /// A random seed is picked when `seed` is `None`. If `nb_dimensions` is
    /// `None` the model is created without bases; call
    /// [`generate_bases`](Self::generate_bases) once the dimensionality of
    /// the data is known.
    pub fn with_random_bases(
        nb_tables: usize,
        nb_bits_per_table: usize,
        nb_dimensions: Option<usize>,
        description: impl Into<String>,
        seed: Option<i64>,
    ) -> Result<Self> {
        validate_shape(nb_tables, nb_bits_per_table)?;

        let mut model = Self {
            nb_tables,
            nb_bits_per_table,
            nb_dimensions: None,
            description: description.into(),
            bases_seed: seed.unwrap_or_else(|| rand::thread_rng().gen()),
            bases: None,
        };

        if let Some(dims) = nb_dimensions {
            model.generate_bases(dims)?;
        }

        Ok(model)
    }

    /// Creates a model from caller-supplied hyperplane rows.
    ///
    /// `sample` holds `nb_tables * nb_bits_per_table` rows of equal length;
    /// consecutive blocks of `nb_bits_per_table` rows become the tables, in
    /// input order. The seed is still recorded so the record stays complete.
    pub fn from_sample(
        nb_tables: usize,
        nb_bits_per_table: usize,
        description: impl Into<String>,
        sample: &[Vec<f64>],
        seed: Option<i64>,
    ) -> Result<Self> {
        validate_shape(nb_tables, nb_bits_per_table)?;

        let expected_rows = nb_tables * nb_bits_per_table;
        if sample.len() != expected_rows {
            return Err(AknnError::Validation(format!(
                "vector sample has {} rows, expected nb_tables * nb_bits_per_table = {}",
                sample.len(),
                expected_rows
            )));
        }

        let dims = sample[0].len();
        if dims == 0 {
            return Err(AknnError::Validation("vector sample rows are empty".into()));
        }
        if let Some(row) = sample.iter().position(|r| r.len() != dims) {
            return Err(AknnError::Validation(format!(
                "vector sample row {} has length {}, expected {}",
                row,
                sample[row].len(),
                dims
            )));
        }

        let bases = sample
            .chunks(nb_bits_per_table)
            .map(|block| {
                let flat: Vec<f64> = block.iter().flatten().copied().collect();
                to_matrix(nb_bits_per_table, dims, flat)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            nb_tables,
            nb_bits_per_table,
            nb_dimensions: Some(dims),
            description: description.into(),
            bases_seed: seed.unwrap_or_else(|| rand::thread_rng().gen()),
            bases: Some(bases),
        })
    }

    /// Fixes the dimensionality and regenerates the bases from the seed.
    ///
    /// Calling this again with a different dimensionality changes every
    /// future hash code, so callers invoke it at most once per model.
    pub fn generate_bases(&mut self, nb_dimensions: usize) -> Result<()> {
        if nb_dimensions == 0 {
            return Err(AknnError::Validation(
                "nb_dimensions must be at least 1".into(),
            ));
        }

        self.bases = Some(random_normal_bases(
            self.bases_seed,
            self.nb_tables,
            self.nb_bits_per_table,
            nb_dimensions,
        )?);
        self.nb_dimensions = Some(nb_dimensions);
        Ok(())
    }

    /// Returns a copy of this model with bases generated for `nb_dimensions`.
    pub fn with_generated_bases(&self, nb_dimensions: usize) -> Result<Self> {
        let mut model = self.clone();
        model.generate_bases(nb_dimensions)?;
        Ok(model)
    }

    /// Computes one hash code per table for `vector`.
    ///
    /// Fails with [`AknnError::NoBases`] before bases exist and with a
    /// validation error when the vector length differs from the model's.
    pub fn hash(&self, vector: &[f64]) -> Result<VectorHashes> {
        let bases = self.bases.as_ref().ok_or(AknnError::NoBases)?;
        self.check_dimensions(vector)?;

        let view = ArrayView1::from(vector);
        let hashes = bases
            .iter()
            .enumerate()
            .map(|(table, basis)| {
                let projections = basis.dot(&view);
                let code = projections
                    .iter()
                    .enumerate()
                    .filter(|(_, &d)| d >= 0.0)
                    .fold(0u64, |code, (bit, _)| code | (1u64 << bit));
                (table.to_string(), code)
            })
            .collect();

        Ok(hashes)
    }

    /// Rejects vectors whose length differs from the fixed dimensionality.
    pub fn check_dimensions(&self, vector: &[f64]) -> Result<()> {
        match self.nb_dimensions {
            Some(dims) if dims != vector.len() => Err(AknnError::Validation(format!(
                "vector has {} dimensions, model expects {}",
                vector.len(),
                dims
            ))),
            _ => Ok(()),
        }
    }

    /// Returns true once bases exist and the model can hash.
    #[inline]
    pub fn has_bases(&self) -> bool {
        self.bases.is_some()
    }

    /// Returns the number of hash tables.
    #[inline]
    pub fn nb_tables(&self) -> usize {
        self.nb_tables
    }

    /// Returns the number of hyperplanes per table.
    #[inline]
    pub fn nb_bits_per_table(&self) -> usize {
        self.nb_bits_per_table
    }

    /// Returns the dimensionality, once fixed.
    #[inline]
    pub fn nb_dimensions(&self) -> Option<usize> {
        self.nb_dimensions
    }

    /// Returns the free-text description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the seed the bases are generated from.
    #[inline]
    pub fn bases_seed(&self) -> i64 {
        self.bases_seed
    }

    /// Returns the per-table hyperplane matrices, if generated.
    pub fn bases(&self) -> Option<&[Array2<f64>]> {
        self.bases.as_deref()
    }

    /// Estimated memory footprint in bytes, used as the cache weight.
    pub fn estimate_bytes_usage(&self) -> u64 {
        let cells = match self.bases {
            Some(_) => {
                self.nb_tables * self.nb_bits_per_table * self.nb_dimensions.unwrap_or(0)
            }
            None => 0,
        };
        MODEL_OVERHEAD_BYTES + (cells * std::mem::size_of::<f64>()) as u64
    }

    /// Serializes the model into its stored record.
    pub fn to_record(&self) -> LshModelRecord {
        LshModelRecord {
            nb_tables: self.nb_tables,
            nb_bits_per_table: self.nb_bits_per_table,
            nb_dimensions: self.nb_dimensions,
            description: self.description.clone(),
            bases_seed: self.bases_seed,
            bases: self.bases.as_ref().map(|bases| {
                bases
                    .iter()
                    .map(|basis| basis.outer_iter().map(|row| row.to_vec()).collect())
                    .collect()
            }),
        }
    }

    /// Rebuilds a model from its stored record.
    ///
    /// Stored bases are replayed verbatim and checked against the declared
    /// shape. A record without bases yields a model without bases.
    pub fn from_record(record: LshModelRecord) -> Result<Self> {
        validate_shape(record.nb_tables, record.nb_bits_per_table)?;

        let bases = match record.bases {
            None => None,
            Some(raw) => {
                let dims = record.nb_dimensions.ok_or_else(|| {
                    AknnError::Validation("bases are present but nb_dimensions is not".into())
                })?;
                if raw.len() != record.nb_tables {
                    return Err(AknnError::Validation(format!(
                        "record has {} basis matrices, expected {}",
                        raw.len(),
                        record.nb_tables
                    )));
                }

                let matrices = raw
                    .into_iter()
                    .enumerate()
                    .map(|(table, rows)| {
                        if rows.len() != record.nb_bits_per_table
                            || rows.iter().any(|r| r.len() != dims)
                        {
                            return Err(AknnError::Validation(format!(
                                "basis of table {} is not {} x {}",
                                table, record.nb_bits_per_table, dims
                            )));
                        }
                        let flat: Vec<f64> = rows.into_iter().flatten().collect();
                        to_matrix(record.nb_bits_per_table, dims, flat)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(matrices)
            }
        };

        Ok(Self {
            nb_tables: record.nb_tables,
            nb_bits_per_table: record.nb_bits_per_table,
            nb_dimensions: record.nb_dimensions,
            description: record.description,
            bases_seed: record.bases_seed,
            bases,
        })
    }
}

/// Checks table count and code width at model-creation time.
fn validate_shape(nb_tables: usize, nb_bits_per_table: usize) -> Result<()> {
    if nb_tables == 0 {
        return Err(AknnError::Validation("nb_tables must be at least 1".into()));
    }
    if nb_bits_per_table == 0 || nb_bits_per_table > MAX_BITS_PER_TABLE {
        return Err(AknnError::Validation(format!(
            "nb_bits_per_table must be in 1..={}, got {}",
            MAX_BITS_PER_TABLE, nb_bits_per_table
        )));
    }
    Ok(())
}

/// Draws `nb_tables` matrices of standard-normal hyperplanes from `seed`.
///
/// Components are drawn row by row, table by table, from one ChaCha8 stream.
fn random_normal_bases(
    seed: i64,
    nb_tables: usize,
    nb_bits_per_table: usize,
    nb_dimensions: usize,
) -> Result<Vec<Array2<f64>>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);

    (0..nb_tables)
        .map(|_| {
            let flat: Vec<f64> = (0..nb_bits_per_table * nb_dimensions)
                .map(|_| rng.sample(StandardNormal))
                .collect();
            to_matrix(nb_bits_per_table, nb_dimensions, flat)
        })
        .collect()
}

fn to_matrix(rows: usize, cols: usize, flat: Vec<f64>) -> Result<Array2<f64>> {
    Array2::from_shape_vec((rows, cols), flat)
        .map_err(|e| AknnError::Validation(format!("invalid basis shape: {e}")))
}

use super::Indexer;
use crate::error::Result;
use crate::lsh::LshModel;
use crate::store::{ModelKey, StoreError, WriteMode};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Where a new model's hyperplanes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBasis {
    /// Gaussian hyperplanes from a seed. Without dimensions the bases are
    /// generated on first indexing.
    Random {
        /// Vector dimensionality, if already known.
        nb_dimensions: Option<usize>,
        /// Random seed; drawn from the thread RNG when absent.
        seed: Option<i64>,
    },
    /// `nb_tables * nb_bits_per_table` caller-supplied rows, used as is.
    Sample {
        /// Hyperplane rows, table by table.
        vectors: Vec<Vec<f64>>,
    },
}

/// Parameters of a new model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateModelRequest {
    /// Where the model record is stored.
    pub location: ModelKey,
    /// Number of hash tables.
    pub nb_tables: usize,
    /// Hyperplanes per table, at most 63.
    pub nb_bits_per_table: usize,
    /// Free text stored with the model.
    #[serde(default)]
    pub description: String,
    /// Source of the hyperplanes.
    pub basis: ModelBasis,
}

/// What a create call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOutcome {
    /// A new model record was written.
    Created,
    /// A model already existed at the location and was left untouched.
    AlreadyExists,
}

impl Indexer {
    /// Builds and stores a model unless one already exists at the location.
    pub fn create_model(&self, request: CreateModelRequest) -> Result<CreateOutcome> {
        let CreateModelRequest {
            location,
            nb_tables,
            nb_bits_per_table,
            description,
            basis,
        } = request;

        let model = match basis {
            ModelBasis::Random {
                nb_dimensions,
                seed,
            } => LshModel::with_random_bases(
                nb_tables,
                nb_bits_per_table,
                nb_dimensions,
                description,
                seed,
            )?,
            ModelBasis::Sample { vectors } => {
                LshModel::from_sample(nb_tables, nb_bits_per_table, description, &vectors, None)?
            }
        };

        match self
            .store
            .put(&location, model.to_record().to_source()?, WriteMode::Create)
        {
            Ok(()) => {
                info!(
                    "Created model {} ({} tables x {} bits, dimensions {:?})",
                    location,
                    model.nb_tables(),
                    model.nb_bits_per_table(),
                    model.nb_dimensions()
                );
                Ok(CreateOutcome::Created)
            }
            Err(StoreError::AlreadyExists(_)) => {
                warn!("Model {} already exists, leaving it unchanged", location);
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }
}

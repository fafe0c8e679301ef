use std::path::PathBuf;

use arrow_schema::ArrowError;
use netloom_core::{ColumnTypeMismatch, ErrorKind, NetworkError};
use thiserror::Error;

/// Errors raised while writing or reading network files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("output `{}` already exists; enable force_overwrite to replace it", path.display())]
    OutputExists { path: PathBuf },
    #[error("population `{population}` already exists in `{}`", path.display())]
    PopulationExists { path: PathBuf, population: String },
    #[error("an explicit {artifact} file name cannot hold {pairs} edge populations")]
    AmbiguousOutput { artifact: &'static str, pairs: usize },
    #[error("`{}` holds populations {available:?}; choose one by name", path.display())]
    PopulationRequired {
        path: PathBuf,
        available: Vec<String>,
    },
    #[error("population `{population}` not found in `{}`", path.display())]
    UnknownPopulation { path: PathBuf, population: String },
    #[error("`{}` has no top-level /nodes group", path.display())]
    MissingNodes { path: PathBuf },
    #[error("dataset `{dataset}` is missing")]
    MissingDataset { dataset: String },
    #[error("dataset `{dataset}` is malformed: {reason}")]
    MalformedDataset { dataset: String, reason: String },
    #[error("type table `{}` is malformed: {reason}", path.display())]
    MalformedTypeTable { path: PathBuf, reason: String },
    #[error("column type mismatch: {0}")]
    ColumnType(#[from] ColumnTypeMismatch),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

netloom_core::define_error_codes! {
    /// Stable codes describing [`StorageError`] variants.
    enum StorageErrorCode for StorageError {
        /// Building or querying the network failed.
        Network => Network(..) => "STORAGE_NETWORK",
        /// The output file exists and overwriting was not requested.
        OutputExists => OutputExists { .. } => "STORAGE_OUTPUT_EXISTS",
        /// Appending would replace an existing population.
        PopulationExists => PopulationExists { .. } => "STORAGE_POPULATION_EXISTS",
        /// One explicit file name was given for several populations.
        AmbiguousOutput => AmbiguousOutput { .. } => "STORAGE_AMBIGUOUS_OUTPUT",
        /// Several populations are stored and none was named.
        PopulationRequired => PopulationRequired { .. } => "STORAGE_POPULATION_REQUIRED",
        /// The named population is not stored.
        UnknownPopulation => UnknownPopulation { .. } => "STORAGE_UNKNOWN_POPULATION",
        /// The file holds no node populations.
        MissingNodes => MissingNodes { .. } => "STORAGE_MISSING_NODES",
        /// A required dataset is absent.
        MissingDataset => MissingDataset { .. } => "STORAGE_MISSING_DATASET",
        /// A dataset has the wrong type or shape.
        MalformedDataset => MalformedDataset { .. } => "STORAGE_MALFORMED_DATASET",
        /// A type table could not be interpreted.
        MalformedTypeTable => MalformedTypeTable { .. } => "STORAGE_MALFORMED_TYPE_TABLE",
        /// Stored values did not fit their column.
        ColumnType => ColumnType(..) => "STORAGE_COLUMN_TYPE",
        /// Arrow rejected a batch.
        Arrow => Arrow(..) => "STORAGE_ARROW",
        /// Parquet encoding or decoding failed.
        Parquet => Parquet(..) => "STORAGE_PARQUET",
        /// Reading or writing a type table failed.
        Csv => Csv(..) => "STORAGE_CSV",
        /// File system access failed.
        Io => Io { .. } => "STORAGE_IO",
    }
}

impl StorageError {
    /// Classifies the error into the shared [`ErrorKind`] taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(error) => error.kind(),
            Self::OutputExists { .. } | Self::PopulationExists { .. } => ErrorKind::IoConflict,
            Self::AmbiguousOutput { .. } | Self::PopulationRequired { .. } => {
                ErrorKind::Configuration
            }
            Self::UnknownPopulation { .. }
            | Self::MissingNodes { .. }
            | Self::MissingDataset { .. }
            | Self::MalformedDataset { .. }
            | Self::MalformedTypeTable { .. }
            | Self::ColumnType(_)
            | Self::Arrow(_)
            | Self::Parquet(_)
            | Self::Csv(_) => ErrorKind::Format,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn malformed(dataset: &str, reason: impl Into<String>) -> Self {
        Self::MalformedDataset {
            dataset: dataset.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<netloom_core::SortError> for StorageError {
    fn from(error: netloom_core::SortError) -> Self {
        Self::Network(NetworkError::from(error))
    }
}

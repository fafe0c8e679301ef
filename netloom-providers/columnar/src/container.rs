//! Hierarchical dataset container persisted as a single Parquet file.
//!
//! Each dataset is addressed by a slash-separated path such as
//! `/nodes/V1/node_id` and stored as one Parquet row: the path, a dtype
//! label, the number of components per element, and a `LargeList` column
//! holding the flattened values. Exactly one of the typed list columns is
//! populated per row.
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Write,
    path::Path,
    sync::Arc,
};

use arrow_array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, LargeListArray, RecordBatch,
    StringArray, UInt64Array,
    builder::{
        BooleanBuilder, Float64Builder, Int64Builder, LargeListBuilder, StringBuilder,
        UInt64Builder,
    },
};
use netloom_core::{Column, DType};
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::Compression,
    file::{properties::WriterProperties, reader::ChunkReader},
};

use crate::{atomic::write_atomically, errors::StorageError};

const PATH: &str = "path";
const DTYPE: &str = "dtype";
const WIDTH: &str = "width";
const INT_VALUES: &str = "int_values";
const UINT_VALUES: &str = "uint_values";
const FLOAT_VALUES: &str = "float_values";
const UTF8_VALUES: &str = "utf8_values";
const BOOL_VALUES: &str = "bool_values";

/// Flattened values of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub enum DatasetValues {
    /// Signed integers.
    Int(Vec<i64>),
    /// Unsigned integers, used for ids and index ranges.
    UInt(Vec<u64>),
    /// Floats; vector datasets store their components row-major.
    Float(Vec<f64>),
    /// Strings.
    Utf8(Vec<String>),
    /// Booleans.
    Bool(Vec<bool>),
}

impl DatasetValues {
    fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::UInt(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Utf8(values) => values.len(),
            Self::Bool(values) => values.len(),
        }
    }
}

/// A typed array of fixed-width elements.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    dtype: String,
    width: usize,
    values: DatasetValues,
}

impl Dataset {
    /// Unsigned 64-bit elements.
    #[must_use]
    pub fn uint64(values: Vec<u64>) -> Self {
        Self {
            dtype: "uint64".to_owned(),
            width: 1,
            values: DatasetValues::UInt(values),
        }
    }

    /// Unsigned 32-bit elements, widened for storage.
    #[must_use]
    pub fn uint32(values: &[u32]) -> Self {
        Self {
            dtype: "uint32".to_owned(),
            width: 1,
            values: DatasetValues::UInt(values.iter().copied().map(u64::from).collect()),
        }
    }

    /// `[start, end)` pairs stored as two-component elements.
    #[must_use]
    pub fn ranges(pairs: &[(u64, u64)]) -> Self {
        Self {
            dtype: "uint64".to_owned(),
            width: 2,
            values: DatasetValues::UInt(pairs.iter().flat_map(|&(start, end)| [start, end]).collect()),
        }
    }

    /// Copies an attribute column.
    #[must_use]
    pub fn from_column(column: &Column) -> Self {
        let dtype = column.dtype().to_string();
        let (width, values) = match column {
            Column::Int(values) => (1, DatasetValues::Int(values.clone())),
            Column::Float(values) => (1, DatasetValues::Float(values.clone())),
            Column::Str(values) => (1, DatasetValues::Utf8(values.clone())),
            Column::Bool(values) => (1, DatasetValues::Bool(values.clone())),
            Column::Vector { width, values } => (*width, DatasetValues::Float(values.clone())),
        };
        Self {
            dtype,
            width,
            values,
        }
    }

    /// Returns the dtype label.
    #[must_use]
    pub fn dtype(&self) -> &str {
        &self.dtype
    }

    /// Returns the number of components per element.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the flattened values.
    #[must_use]
    pub fn values(&self) -> &DatasetValues {
        &self.values
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len().checked_div(self.width).unwrap_or(0)
    }

    /// Returns whether the dataset has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the dataset as scalar unsigned integers.
    ///
    /// # Errors
    /// Returns [`StorageError::MalformedDataset`] for vector data, negative
    /// integers or non-integer types.
    pub fn to_u64(&self, path: &str) -> Result<Vec<u64>, StorageError> {
        if self.width != 1 {
            return Err(StorageError::malformed(path, format!("expected scalars, found width {}", self.width)));
        }
        match &self.values {
            DatasetValues::UInt(values) => Ok(values.clone()),
            DatasetValues::Int(values) => values
                .iter()
                .map(|&value| {
                    u64::try_from(value)
                        .map_err(|_| StorageError::malformed(path, format!("negative id {value}")))
                })
                .collect(),
            _ => Err(StorageError::malformed(path, format!("expected integers, found {}", self.dtype))),
        }
    }

    /// Reads the dataset as an attribute column.
    ///
    /// # Errors
    /// Returns [`StorageError::MalformedDataset`] when the dtype label is not
    /// an attribute type or disagrees with the stored values.
    pub fn to_column(&self, path: &str) -> Result<Column, StorageError> {
        let dtype: DType = self
            .dtype
            .parse()
            .map_err(|reason: String| StorageError::malformed(path, reason))?;
        let column = match (dtype, &self.values) {
            (DType::Int, DatasetValues::Int(values)) => Column::Int(values.clone()),
            (DType::Float, DatasetValues::Float(values)) => Column::Float(values.clone()),
            (DType::Str, DatasetValues::Utf8(values)) => Column::Str(values.clone()),
            (DType::Bool, DatasetValues::Bool(values)) => Column::Bool(values.clone()),
            (DType::Vector(width), DatasetValues::Float(values)) if width == self.width => {
                Column::Vector {
                    width,
                    values: values.clone(),
                }
            }
            _ => {
                return Err(StorageError::malformed(
                    path,
                    format!("dtype {} does not match the stored values", self.dtype),
                ));
            }
        };
        Ok(column)
    }
}

/// An ordered collection of datasets keyed by path.
///
/// # Examples
/// ```
/// use netloom_providers_columnar::{Container, Dataset};
///
/// let mut container = Container::new();
/// container.insert("/nodes/V1/node_id", Dataset::uint64(vec![0, 1, 2]));
/// container.insert("/nodes/V1/0/x", Dataset::from_column(&vec![0.5, 1.5, 2.5].into()));
/// assert_eq!(container.children("/nodes"), ["V1"]);
/// assert_eq!(container.children("/nodes/V1"), ["0", "node_id"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Container {
    datasets: BTreeMap<String, Dataset>,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the dataset at `path`.
    pub fn insert(&mut self, path: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(path.into(), dataset);
    }

    /// Returns the dataset at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Dataset> {
        self.datasets.get(path)
    }

    /// Returns the dataset at `path` or a missing-dataset error.
    ///
    /// # Errors
    /// Returns [`StorageError::MissingDataset`] when nothing is stored there.
    pub fn require(&self, path: &str) -> Result<&Dataset, StorageError> {
        self.get(path).ok_or_else(|| StorageError::MissingDataset {
            dataset: path.to_owned(),
        })
    }

    /// Iterates dataset paths in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Returns the number of datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Returns whether the container holds no datasets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Returns whether any dataset lives under the group `prefix`.
    #[must_use]
    pub fn contains_group(&self, prefix: &str) -> bool {
        let prefix = group_prefix(prefix);
        self.datasets.keys().any(|path| path.starts_with(&prefix))
    }

    /// Returns the names of the direct children of the group `prefix`.
    #[must_use]
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let prefix = group_prefix(prefix);
        let names: BTreeSet<&str> = self
            .datasets
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .collect();
        names.into_iter().map(str::to_owned).collect()
    }

    /// Drops every dataset under the group `prefix`.
    pub fn remove_group(&mut self, prefix: &str) {
        let prefix = group_prefix(prefix);
        self.datasets.retain(|path, _| !path.starts_with(&prefix));
    }

    /// Copies every dataset of `other`, replacing paths present in both.
    pub fn merge(&mut self, other: Self) {
        self.datasets.extend(other.datasets);
    }

    /// Encodes the container as Parquet into `writer`.
    ///
    /// # Errors
    /// Returns [`StorageError`] when Arrow or Parquet reject the data.
    pub fn write_parquet<W>(&self, writer: W, compression: Compression) -> Result<(), StorageError>
    where
        W: Write + Send,
    {
        let batch = self.to_record_batch()?;
        let properties = WriterProperties::builder()
            .set_compression(compression)
            .build();
        let mut writer = ArrowWriter::try_new(writer, batch.schema(), Some(properties))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Writes the container to `path`, replacing it atomically.
    ///
    /// # Errors
    /// Returns [`StorageError`] when encoding or file access fails.
    pub fn write(&self, path: &Path, compression: Compression) -> Result<(), StorageError> {
        write_atomically(path, |file| self.write_parquet(file, compression))
    }

    /// Decodes a container from Parquet.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the data is not a dataset container.
    pub fn read_parquet<R>(reader: R) -> Result<Self, StorageError>
    where
        R: ChunkReader + 'static,
    {
        let reader = ParquetRecordBatchReaderBuilder::try_new(reader)?.build()?;
        let mut container = Self::new();
        for batch in reader {
            container.append_batch(&batch?)?;
        }
        Ok(container)
    }

    /// Reads the container stored at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the file cannot be opened or decoded.
    pub fn read(path: &Path) -> Result<Self, StorageError> {
        let file = File::open(path).map_err(StorageError::io(path))?;
        Self::read_parquet(file)
    }

    fn to_record_batch(&self) -> Result<RecordBatch, StorageError> {
        let mut paths = StringBuilder::new();
        let mut dtypes = StringBuilder::new();
        let mut widths = UInt64Builder::new();
        let mut ints = LargeListBuilder::new(Int64Builder::new());
        let mut uints = LargeListBuilder::new(UInt64Builder::new());
        let mut floats = LargeListBuilder::new(Float64Builder::new());
        let mut utf8 = LargeListBuilder::new(StringBuilder::new());
        let mut bools = LargeListBuilder::new(BooleanBuilder::new());

        for (path, dataset) in &self.datasets {
            paths.append_value(path);
            dtypes.append_value(&dataset.dtype);
            widths.append_value(dataset.width as u64);
            let (mut int, mut uint, mut float, mut text, mut flag) = (false, false, false, false, false);
            match &dataset.values {
                DatasetValues::Int(values) => {
                    ints.values().append_slice(values);
                    int = true;
                }
                DatasetValues::UInt(values) => {
                    uints.values().append_slice(values);
                    uint = true;
                }
                DatasetValues::Float(values) => {
                    floats.values().append_slice(values);
                    float = true;
                }
                DatasetValues::Utf8(values) => {
                    for value in values {
                        utf8.values().append_value(value);
                    }
                    text = true;
                }
                DatasetValues::Bool(values) => {
                    bools.values().append_slice(values);
                    flag = true;
                }
            }
            ints.append(int);
            uints.append(uint);
            floats.append(float);
            utf8.append(text);
            bools.append(flag);
        }

        let columns: [(&str, ArrayRef); 8] = [
            (PATH, Arc::new(paths.finish())),
            (DTYPE, Arc::new(dtypes.finish())),
            (WIDTH, Arc::new(widths.finish())),
            (INT_VALUES, Arc::new(ints.finish())),
            (UINT_VALUES, Arc::new(uints.finish())),
            (FLOAT_VALUES, Arc::new(floats.finish())),
            (UTF8_VALUES, Arc::new(utf8.finish())),
            (BOOL_VALUES, Arc::new(bools.finish())),
        ];
        Ok(RecordBatch::try_from_iter(columns)?)
    }

    fn append_batch(&mut self, batch: &RecordBatch) -> Result<(), StorageError> {
        let paths: &StringArray = column(batch, PATH)?;
        let dtypes: &StringArray = column(batch, DTYPE)?;
        let widths: &UInt64Array = column(batch, WIDTH)?;
        let ints: &LargeListArray = column(batch, INT_VALUES)?;
        let uints: &LargeListArray = column(batch, UINT_VALUES)?;
        let floats: &LargeListArray = column(batch, FLOAT_VALUES)?;
        let utf8: &LargeListArray = column(batch, UTF8_VALUES)?;
        let bools: &LargeListArray = column(batch, BOOL_VALUES)?;

        for row in 0..batch.num_rows() {
            if paths.is_null(row) || dtypes.is_null(row) || widths.is_null(row) {
                return Err(StorageError::malformed(PATH, format!("row {row} lacks path metadata")));
            }
            let path = paths.value(row);
            let width = usize::try_from(widths.value(row))
                .map_err(|_| StorageError::malformed(path, "width exceeds usize"))?;
            let values = if let Some(list) = populated(ints, row) {
                DatasetValues::Int(elements::<Int64Array>(&list, path)?.values().to_vec())
            } else if let Some(list) = populated(uints, row) {
                DatasetValues::UInt(elements::<UInt64Array>(&list, path)?.values().to_vec())
            } else if let Some(list) = populated(floats, row) {
                DatasetValues::Float(elements::<Float64Array>(&list, path)?.values().to_vec())
            } else if let Some(list) = populated(utf8, row) {
                let strings = elements::<StringArray>(&list, path)?;
                DatasetValues::Utf8(
                    strings
                        .iter()
                        .map(|value| value.map(str::to_owned))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| StorageError::malformed(path, "null string"))?,
                )
            } else if let Some(list) = populated(bools, row) {
                let flags = elements::<BooleanArray>(&list, path)?;
                DatasetValues::Bool(
                    flags
                        .iter()
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| StorageError::malformed(path, "null boolean"))?,
                )
            } else {
                return Err(StorageError::malformed(path, "no value column is populated"));
            };
            if width == 0 || values.len() % width != 0 {
                return Err(StorageError::malformed(
                    path,
                    format!("{} values do not form elements of width {width}", values.len()),
                ));
            }
            self.insert(
                path,
                Dataset {
                    dtype: dtypes.value(row).to_owned(),
                    width,
                    values,
                },
            );
        }
        Ok(())
    }
}

fn group_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StorageError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StorageError::MissingDataset {
            dataset: name.to_owned(),
        })?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StorageError::malformed(name, "unexpected arrow type"))
}

fn populated(list: &LargeListArray, row: usize) -> Option<ArrayRef> {
    (!list.is_null(row)).then(|| list.value(row))
}

fn elements<'a, T: Array + 'static>(array: &'a ArrayRef, path: &str) -> Result<&'a T, StorageError> {
    let values = array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StorageError::malformed(path, format!("unexpected element type {}", array.data_type())))?;
    if values.null_count() > 0 {
        return Err(StorageError::malformed(path, "null element"));
    }
    Ok(values)
}

//! Space-delimited node and edge type tables.
//!
//! The first column holds the type id (`node_type_id` or `edge_type_id`),
//! followed by the union of type attributes in first-seen order. Missing
//! cells hold the configured null token.
use std::{fs::File, io::Write, path::Path};

use netloom_core::{TypeTable, Value};

use crate::{atomic::write_atomically, errors::StorageError};

/// Encodes `table` as delimited text into `writer`.
///
/// # Errors
/// Returns [`StorageError::Csv`] when the writer fails.
pub fn write_type_table<W: Write>(
    writer: W,
    table: &TypeTable,
    id_column: &str,
    null_token: &str,
) -> Result<(), StorageError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .from_writer(writer);
    writer.write_record(std::iter::once(id_column).chain(table.columns().iter().map(String::as_str)))?;
    for type_id in table.type_ids() {
        let cells = table.render_row(type_id, null_token).unwrap_or_default();
        writer.write_record(std::iter::once(type_id.to_string()).chain(cells))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Writes `table` to `path`, replacing it atomically.
///
/// # Errors
/// Returns [`StorageError`] when encoding or file access fails.
pub fn save_type_table(
    path: &Path,
    table: &TypeTable,
    id_column: &str,
    null_token: &str,
) -> Result<(), StorageError> {
    write_atomically(path, |file| write_type_table(file, table, id_column, null_token))
}

/// Decodes a type table; cells equal to `null_token` are left unset.
///
/// # Errors
/// Returns [`StorageError::MalformedTypeTable`] when the header lacks
/// `id_column` or an id is not a non-negative integer.
pub fn read_type_table<R: std::io::Read>(
    reader: R,
    id_column: &str,
    null_token: &str,
    origin: &Path,
) -> Result<TypeTable, StorageError> {
    let malformed = |reason: String| StorageError::MalformedTypeTable {
        path: origin.to_path_buf(),
        reason,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let id_at = headers
        .iter()
        .position(|name| name == id_column)
        .ok_or_else(|| malformed(format!("missing `{id_column}` column")))?;

    let mut table = TypeTable::default();
    for record in reader.records() {
        let record = record?;
        let raw_id = record.get(id_at).unwrap_or_default();
        let type_id = raw_id
            .parse::<u64>()
            .map_err(|_| malformed(format!("invalid type id `{raw_id}`")))?;
        let attributes = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|&(at, (_, cell))| at != id_at && cell != null_token)
            .map(|(_, (name, cell))| (name.to_owned(), Value::parse(cell)))
            .collect();
        table.insert(type_id, attributes);
    }
    Ok(table)
}

/// Reads the type table stored at `path`.
///
/// # Errors
/// See [`read_type_table`]; I/O failures name `path`.
pub fn load_type_table(
    path: &Path,
    id_column: &str,
    null_token: &str,
) -> Result<TypeTable, StorageError> {
    let file = File::open(path).map_err(StorageError::io(path))?;
    read_type_table(file, id_column, null_token, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypeTable {
        let mut table = TypeTable::default();
        table.insert(
            100,
            vec![
                ("model_type".to_owned(), Value::from("biophysical")),
                ("pop_name".to_owned(), Value::from("Scnn1a cells")),
            ],
        );
        table.insert(101, vec![("ei".to_owned(), Value::from("i"))]);
        table.insert(102, vec![("weight".to_owned(), Value::Float(2.0))]);
        table
    }

    fn render(table: &TypeTable) -> String {
        let mut buffer = Vec::new();
        write_type_table(&mut buffer, table, "node_type_id", "NULL").expect("table encodes");
        String::from_utf8(buffer).expect("utf8")
    }

    #[test]
    fn rows_are_null_filled_over_the_column_union() {
        let text = render(&table());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "node_type_id model_type pop_name ei weight");
        assert_eq!(lines[1], "100 biophysical \"Scnn1a cells\" NULL NULL");
        assert_eq!(lines[2], "101 NULL NULL i NULL");
        assert_eq!(lines[3], "102 NULL NULL NULL 2.0");
    }

    #[test]
    fn tables_read_back_without_null_cells() {
        let original = table();
        let text = render(&original);
        let decoded = read_type_table(text.as_bytes(), "node_type_id", "NULL", Path::new("t.csv"))
            .expect("table decodes");
        assert_eq!(decoded.type_ids().collect::<Vec<_>>(), [100, 101, 102]);
        assert_eq!(decoded.attributes(101), original.attributes(101));
        assert_eq!(decoded.get(102, "weight"), Some(&Value::Float(2.0)));
        assert_eq!(decoded.get(100, "pop_name"), Some(&Value::from("Scnn1a cells")));
        assert_eq!(decoded.get(100, "ei"), None);
    }

    #[test]
    fn missing_id_column_is_a_format_error() {
        let err = read_type_table(
            "edge_type_id syn\n100 exc\n".as_bytes(),
            "node_type_id",
            "NULL",
            Path::new("edges.csv"),
        )
        .expect_err("wrong id column");
        assert_eq!(err.kind(), netloom_core::ErrorKind::Format);
    }

    proptest::proptest! {
        #[test]
        fn decoded_tables_keep_every_defined_cell(
            rows in proptest::collection::btree_map(
                100_u64..200,
                proptest::collection::vec(("[a-c]", "x[A-Za-z ]{0,6}", proptest::bool::ANY, -50_i64..50), 0..3),
                1..6,
            ),
        ) {
            let mut table = TypeTable::default();
            for (type_id, cells) in &rows {
                let mut attributes: Vec<(String, Value)> = Vec::new();
                for (name, text, as_text, number) in cells {
                    if attributes.iter().any(|(seen, _)| seen == name) {
                        continue;
                    }
                    let value = if *as_text { Value::from(text.as_str()) } else { Value::Int(*number) };
                    attributes.push((name.clone(), value));
                }
                table.insert(*type_id, attributes);
            }
            let decoded = read_type_table(render(&table).as_bytes(), "node_type_id", "NULL", Path::new("t.csv"))
                .expect("table decodes");
            proptest::prop_assert_eq!(decoded.type_ids().collect::<Vec<_>>(), table.type_ids().collect::<Vec<_>>());
            let sorted = |table: &TypeTable, type_id: u64| {
                let mut cells = table.attributes(type_id).unwrap_or_default().to_vec();
                cells.sort_by(|left, right| left.0.cmp(&right.0));
                cells
            };
            for type_id in table.type_ids() {
                proptest::prop_assert_eq!(sorted(&decoded, type_id), sorted(&table, type_id));
            }
        }
    }
}

//! Decompressing mirrored tables into tab-separated text files.

use crate::error::{join_error, Result, SyncError};
use crate::layout::{safe_component, SCHEMA_FILE};
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Deserialize, Debug)]
struct SchemaDoc {
    schema: BTreeMap<String, SchemaTable>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SchemaTable {
    table_name: String,
    columns: Vec<SchemaColumn>,
}

#[derive(Deserialize, Debug)]
struct SchemaColumn {
    name: String,
}

/// Writes `<output>/<table>.txt` for every schema table named in `filter`:
/// a header of column names, then the rows of every file in
/// `<source>/<table>`, in sequence order. Returns the written paths.
pub async fn unpack(source: &Path, output: &Path, filter: &[String]) -> Result<Vec<PathBuf>> {
    let schema_path = source.join(SCHEMA_FILE);
    let raw = match tokio::fs::read(&schema_path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::SchemaMissing(schema_path))
        }
        Err(e) => return Err(e.into()),
    };
    let doc: SchemaDoc = serde_json::from_slice(&raw)?;

    let tables: Vec<SchemaTable> = doc
        .schema
        .into_values()
        .filter(|t| filter.contains(&t.table_name))
        .collect();
    if tables.is_empty() {
        warn!("no tables matched filter, nothing will be unpacked");
        return Ok(Vec::new());
    }
    debug!(
        "will unpack {}",
        tables
            .iter()
            .map(|t| t.table_name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );
    tokio::fs::create_dir_all(output).await?;

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let input_dir = source.join(safe_component(&table.table_name)?);
        let out_path = output.join(format!("{}.txt", table.table_name));
        info!("outputting {} to {}", table.table_name, out_path.display());

        let dest = out_path.clone();
        let rows = tokio::task::spawn_blocking(move || unpack_table(&table, &input_dir, &dest))
            .await
            .map_err(join_error)??;
        info!("finished with {} ({} rows)", out_path.display(), rows);
        written.push(out_path);
    }
    Ok(written)
}

/// Orders `<sequence>_<filename>` files by numeric sequence, then by name,
/// so `9_x` comes before `10_x`.
fn file_order(path: &Path) -> (Option<u64>, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sequence = name
        .split_once('_')
        .and_then(|(prefix, _)| prefix.parse().ok());
    (sequence, name)
}

fn unpack_table(table: &SchemaTable, input_dir: &Path, dest: &Path) -> Result<u64> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    files.retain(|p| p.is_file());
    files.sort_by_cached_key(|p| file_order(p));

    let mut out = BufWriter::new(std::fs::File::create(dest)?);
    let header: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    writeln!(out, "{}", header.join("\t"))?;

    let mut rows = 0u64;
    for path in files {
        let reader = BufReader::new(MultiGzDecoder::new(std::fs::File::open(&path)?));
        for line in reader.split(b'\n') {
            let line = line?;
            let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            out.write_all(line)?;
            out.write_all(b"\n")?;
            rows += 1;
        }
    }
    out.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gz(path: &Path, contents: &str) {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(contents.as_bytes()).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, enc.finish().unwrap()).unwrap();
    }

    fn write_schema(root: &Path) {
        let schema = serde_json::json!({
            "version": "1.0.1",
            "schema": {
                "users": {
                    "tableName": "user_dim",
                    "columns": [{"name": "id"}, {"name": "name"}]
                },
                "courses": {
                    "tableName": "course_dim",
                    "columns": [{"name": "id"}]
                }
            }
        });
        std::fs::write(root.join(SCHEMA_FILE), schema.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_unpack_concatenates_in_name_order() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_schema(src.path());
        gz(&src.path().join("user_dim/2_b.gz"), "3\tc\n\n4\td");
        gz(&src.path().join("user_dim/1_a.gz"), "1\ta\r\n2\tb\n");

        let written = unpack(src.path(), out.path(), &["user_dim".to_string()])
            .await
            .unwrap();

        assert_eq!(written, vec![out.path().join("user_dim.txt")]);
        assert_eq!(
            std::fs::read_to_string(&written[0]).unwrap(),
            "id\tname\n1\ta\n2\tb\n3\tc\n4\td\n"
        );
        assert!(!out.path().join("course_dim.txt").exists());
    }

    #[tokio::test]
    async fn test_sequences_sort_numerically() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_schema(src.path());
        gz(&src.path().join("user_dim/10_part.gz"), "3\tpartial\n");
        gz(&src.path().join("user_dim/9_part.gz"), "1\tfull\n");
        gz(&src.path().join("user_dim/9_another.gz"), "0\tfull\n");

        let written = unpack(src.path(), out.path(), &["user_dim".to_string()])
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&written[0]).unwrap(),
            "id\tname\n0\tfull\n1\tfull\n3\tpartial\n"
        );
    }

    #[test]
    fn test_file_order() {
        let mut names = vec!["10_a", "9_b", "9_a", "100_a"];
        names.sort_by_cached_key(|n| file_order(Path::new(n)));
        assert_eq!(names, vec!["9_a", "9_b", "10_a", "100_a"]);
    }

    #[tokio::test]
    async fn test_no_matching_table_is_a_warning() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_schema(src.path());

        let written = unpack(src.path(), out.path(), &["nope".to_string()])
            .await
            .unwrap();

        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_missing_schema() {
        let src = tempfile::tempdir().unwrap();
        let err = unpack(src.path(), src.path(), &["user_dim".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SchemaMissing(_)));
    }
}

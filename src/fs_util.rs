use std::fs::{self, File};
use std::io::{BufWriter, Write};

use camino::Utf8Path;

use crate::error::XmapError;

/// Writes `dest` through a temp file in the same directory so readers never
/// observe a partial artifact.
pub fn write_atomic<F>(dest: &Utf8Path, write: F) -> Result<(), XmapError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), XmapError>,
{
    let parent = match dest.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| XmapError::Filesystem(format!("create {parent}: {err}")))?;

    let temp = tempfile::Builder::new()
        .prefix(".xmap-out")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| XmapError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

pub fn write_bytes_atomic(dest: &Utf8Path, bytes: &[u8]) -> Result<(), XmapError> {
    write_atomic(dest, |out| {
        out.write_all(bytes)
            .map_err(|err| XmapError::Filesystem(err.to_string()))
    })
}

pub fn read_to_string(path: &Utf8Path) -> Result<String, XmapError> {
    fs::read_to_string(path.as_std_path()).map_err(|err| XmapError::InputRead {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Opens a delimited table with a header row, checking that `required` columns exist.
pub fn open_table(
    path: &Utf8Path,
    delimiter: u8,
    required: &[&str],
) -> Result<csv::Reader<File>, XmapError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path.as_std_path())
        .map_err(|err| XmapError::InputRead {
            path: path.to_string(),
            message: err.to_string(),
        })?;
    let headers = reader.headers().map_err(|err| XmapError::InputRead {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    for column in required {
        if !headers.iter().any(|header| header == *column) {
            return Err(XmapError::MissingColumn {
                path: path.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(reader)
}

/// Picks the delimiter from the file extension: tab for `.tsv`, comma otherwise.
pub fn delimiter_for(path: &Utf8Path) -> u8 {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

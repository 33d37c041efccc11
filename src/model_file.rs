// src/model_file.rs

//! Binary model layout, host-endian, no version tag:
//!
//! ```text
//! i32 label count
//!   per label: i32 id, i32 len, len bytes (name + NUL)
//! i32 entry count
//!   per entry: i32 label id, i32 len, len bytes (name + NUL)
//! mean matrix
//! per trained algorithm in canonical order: W matrix, P matrix
//! ```
//!
//! Matrices use [`crate::matrix::write_binary`]. The identity variant has no
//! W and stores P only. Which algorithms are present is not recorded; the
//! reader must be told.
//!
//! LDA carries its PCA stage inside its own W, so an LDA-only model has no
//! PCA section. Layouts that always store PCA next to LDA are not compatible.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::config::FeatureKind;
use crate::dataset::{DataEntry, DataLabel, Dataset};
use crate::error::{RecognitionError, Result};
use crate::matrix::{self, Matrix};

/// W and P of one trained algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSection {
    pub kind: FeatureKind,
    /// `None` for the identity variant.
    pub basis: Option<Matrix>,
    pub projection: Matrix,
}

/// Everything a model file holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFileContents {
    pub dataset: Dataset,
    pub mean: Matrix,
    pub sections: Vec<ModelSection>,
}

fn to_i32(value: usize, what: &str) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} {} exceeds i32", what, value),
        )
    })
}

/// Writes `i32 len` (including the trailing NUL), the bytes, then NUL.
fn write_string<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    writer.write_all(&to_i32(s.len() + 1, "string length")?.to_ne_bytes())?;
    writer.write_all(s.as_bytes())?;
    writer.write_all(&[0u8])
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = matrix::read_i32(reader)?;
    if len < 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid string length {}", len),
        ));
    }
    let mut buf = matrix::read_bytes(reader, len as usize)?;
    if buf.pop() != Some(0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "string is not NUL-terminated",
        ));
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Serializes the catalog, mean and sections in file order.
///
/// Every entry must be labeled.
pub fn write_model<W: Write>(writer: &mut W, contents: &ModelFileContents) -> io::Result<()> {
    let labels = contents.dataset.labels();
    writer.write_all(&to_i32(labels.len(), "label count")?.to_ne_bytes())?;
    for label in labels {
        writer.write_all(&label.id.to_ne_bytes())?;
        write_string(writer, &label.name)?;
    }

    let entries = contents.dataset.entries();
    writer.write_all(&to_i32(entries.len(), "entry count")?.to_ne_bytes())?;
    for entry in entries {
        let label = contents.dataset.label_of(entry).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("entry '{}' has no label", entry.name),
            )
        })?;
        writer.write_all(&label.id.to_ne_bytes())?;
        write_string(writer, &entry.name)?;
    }

    matrix::write_binary(writer, &contents.mean)?;
    for section in &contents.sections {
        if let Some(basis) = &section.basis {
            matrix::write_binary(writer, basis)?;
        }
        matrix::write_binary(writer, &section.projection)?;
    }
    writer.flush()
}

fn count<R: Read>(reader: &mut R, what: &str) -> io::Result<usize> {
    let n = matrix::read_i32(reader)?;
    usize::try_from(n).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative {} {}", what, n),
        )
    })
}

/// Reads a file written by [`write_model`] holding sections for `kinds`, in that order.
///
/// Entry labels are resolved by id. `path` only labels errors.
pub fn read_model<R: Read>(reader: &mut R, kinds: &[FeatureKind], path: &str) -> Result<ModelFileContents> {
    let io_err = |e: io::Error| RecognitionError::io(path, e);

    let n_labels = count(reader, "label count").map_err(io_err)?;
    let mut labels = Vec::new();
    let mut index_by_id = HashMap::new();
    for index in 0..n_labels {
        let id = matrix::read_i32(reader).map_err(io_err)?;
        let name = read_string(reader).map_err(io_err)?;
        if index_by_id.insert(id, index).is_some() {
            return Err(RecognitionError::Format {
                path: path.to_string(),
                detail: format!("duplicate label id {}", id),
            });
        }
        labels.push(DataLabel { id, name });
    }

    let n_entries = count(reader, "entry count").map_err(io_err)?;
    let mut entries = Vec::new();
    for _ in 0..n_entries {
        let label_id = matrix::read_i32(reader).map_err(io_err)?;
        let name = read_string(reader).map_err(io_err)?;
        let label = *index_by_id.get(&label_id).ok_or_else(|| RecognitionError::Format {
            path: path.to_string(),
            detail: format!("entry '{}' refers to unknown label id {}", name, label_id),
        })?;
        entries.push(DataEntry {
            name,
            label: Some(label),
        });
    }
    let dataset = Dataset::from_parts(labels, entries)?;

    let mean = matrix::read_binary(reader).map_err(io_err)?;
    let mut sections = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let basis = match kind {
            FeatureKind::Identity => None,
            _ => Some(matrix::read_binary(reader).map_err(io_err)?),
        };
        let projection = matrix::read_binary(reader).map_err(io_err)?;
        sections.push(ModelSection {
            kind,
            basis,
            projection,
        });
    }

    Ok(ModelFileContents {
        dataset,
        mean,
        sections,
    })
}

// src/dataset.rs

use log::{debug, info};
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{RecognitionError, Result};
use crate::matrix::Matrix;

/// One class. Unique by `id` within a catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataLabel {
    pub id: i32,
    pub name: String,
}

/// One sample: a name resolvable by a [`SampleSource`] and the index of its
/// label in the owning catalog's label table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataEntry {
    pub name: String,
    pub label: Option<usize>,
}

/// Ordered entries plus the deduplicated labels they point into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    labels: Vec<DataLabel>,
    entries: Vec<DataEntry>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a catalog from stored parts, checking that every entry's label index is valid.
    pub fn from_parts(labels: Vec<DataLabel>, entries: Vec<DataEntry>) -> Result<Self> {
        if let Some(entry) = entries
            .iter()
            .find(|e| e.label.map_or(false, |l| l >= labels.len()))
        {
            return Err(RecognitionError::InvalidParameter(format!(
                "entry '{}' refers to missing label index {:?}",
                entry.name, entry.label
            )));
        }
        Ok(Self { labels, entries })
    }

    /// Appends an entry, registering its class name on first sight.
    pub fn push(&mut self, name: impl Into<String>, label_name: Option<&str>) -> usize {
        let label = label_name.map(|label_name| self.label_index_or_insert(label_name));
        self.entries.push(DataEntry {
            name: name.into(),
            label,
        });
        self.entries.len() - 1
    }

    fn label_index_or_insert(&mut self, label_name: &str) -> usize {
        if let Some(index) = self.labels.iter().position(|l| l.name == label_name) {
            return index;
        }
        self.labels.push(DataLabel {
            id: self.labels.len() as i32,
            name: label_name.to_string(),
        });
        self.labels.len() - 1
    }

    /// Scans `path` for sample files, sorted by file name.
    ///
    /// With `labeled`, the class name is the file stem up to the first `_`
    /// (`alice_03.pgm` belongs to `alice`).
    pub fn from_directory<P: AsRef<Path>>(path: P, labeled: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut files: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| RecognitionError::io(path, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        let mut dataset = Dataset::new();
        for file in files {
            let label_name = if labeled {
                let stem = file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| RecognitionError::Format {
                        path: file.display().to_string(),
                        detail: "file name is not valid UTF-8".to_string(),
                    })?;
                Some(stem.split('_').next().unwrap_or(stem).to_string())
            } else {
                None
            };
            dataset.push(file.display().to_string(), label_name.as_deref());
        }
        info!(
            "Scanned {}: {} samples, {} classes",
            path.display(),
            dataset.entries.len(),
            dataset.labels.len()
        );
        Ok(dataset)
    }

    pub fn labels(&self) -> &[DataLabel] {
        &self.labels
    }

    pub fn entries(&self) -> &[DataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn label_of(&self, entry: &DataEntry) -> Option<&DataLabel> {
        entry.label.map(|i| &self.labels[i])
    }

    /// Label index of every entry; fails if any entry is unlabeled.
    pub fn label_indices(&self) -> Result<Vec<usize>> {
        self.entries
            .iter()
            .map(|e| {
                e.label.ok_or_else(|| {
                    RecognitionError::InvalidParameter(format!("entry '{}' has no label", e.name))
                })
            })
            .collect()
    }

    /// Decodes every entry into one column of a feature × sample matrix.
    pub fn sample_matrix(&self, source: &dyn SampleSource) -> Result<Matrix> {
        let first = self.entries.first().ok_or_else(|| {
            RecognitionError::InsufficientSamples("catalog has no samples".to_string())
        })?;
        let first_sample = source.read_sample(&first.name)?;
        let n_features = first_sample.len();
        let mut x = Array2::<f64>::zeros((n_features, self.entries.len()));
        x.column_mut(0).assign(&first_sample);

        for (j, entry) in self.entries.iter().enumerate().skip(1) {
            let sample = source.read_sample(&entry.name)?;
            if sample.len() != n_features {
                return Err(RecognitionError::dims(
                    "sample_matrix",
                    format!(
                        "'{}' has {} values but '{}' has {}",
                        entry.name,
                        sample.len(),
                        first.name,
                        n_features
                    ),
                ));
            }
            x.column_mut(j).assign(&sample);
        }
        debug!("Built sample matrix {}x{}", x.nrows(), x.ncols());
        Ok(x)
    }
}

/// Decodes a sample name into a flattened feature vector.
pub trait SampleSource: Sync {
    fn read_sample(&self, name: &str) -> Result<Array1<f64>>;
}

/// Genome vectors stored as whitespace-separated numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenomeSource;

impl SampleSource for GenomeSource {
    fn read_sample(&self, name: &str) -> Result<Array1<f64>> {
        let text = fs::read_to_string(name).map_err(|e| RecognitionError::io(name, e))?;
        text.split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|e| RecognitionError::Format {
                    path: name.to_string(),
                    detail: format!("bad value '{}': {}", token, e),
                })
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from)
    }
}

/// 8-bit binary PGM (P5) and PPM (P6) images, flattened row by row with
/// interleaved channels.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSource;

impl ImageSource {
    fn parse(name: &str, bytes: &[u8]) -> Result<Array1<f64>> {
        let malformed = |detail: &str| RecognitionError::Format {
            path: name.to_string(),
            detail: detail.to_string(),
        };

        // Header: magic, width, height, maxval, separated by whitespace with optional comments.
        let mut fields = Vec::with_capacity(4);
        let mut pos = 0;
        while fields.len() < 4 {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos < bytes.len() && bytes[pos] == b'#' {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                continue;
            }
            let start = pos;
            while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if start == pos {
                return Err(malformed("truncated header"));
            }
            fields.push(String::from_utf8_lossy(&bytes[start..pos]).into_owned());
        }
        // exactly one whitespace byte precedes the raster
        pos += 1;

        let channels = match fields[0].as_str() {
            "P5" => 1,
            "P6" => 3,
            _ => return Err(malformed("expected a binary PGM (P5) or PPM (P6) image")),
        };
        let dim = |s: &str| usize::from_str(s).map_err(|_| malformed("bad image dimension"));
        let width = dim(&fields[1])?;
        let height = dim(&fields[2])?;
        let maxval = dim(&fields[3])?;
        if maxval == 0 || maxval > 255 {
            return Err(malformed("only 8-bit images are supported"));
        }

        let end = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .and_then(|len| pos.checked_add(len))
            .ok_or_else(|| malformed("image dimensions overflow"))?;
        let raster = bytes
            .get(pos..end)
            .ok_or_else(|| malformed("truncated raster"))?;
        Ok(raster.iter().map(|&b| b as f64).collect())
    }
}

impl SampleSource for ImageSource {
    fn read_sample(&self, name: &str) -> Result<Array1<f64>> {
        let bytes = fs::read(name).map_err(|e| RecognitionError::io(name, e))?;
        Self::parse(name, &bytes)
    }
}

/// Samples held in memory, keyed by entry name.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    samples: HashMap<String, Array1<f64>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, sample: Array1<f64>) {
        self.samples.insert(name.into(), sample);
    }
}

impl SampleSource for InMemorySource {
    fn read_sample(&self, name: &str) -> Result<Array1<f64>> {
        self.samples
            .get(name)
            .cloned()
            .ok_or_else(|| RecognitionError::Format {
                path: name.to_string(),
                detail: "no in-memory sample with this name".to_string(),
            })
    }
}

/// Kind of raw sample file the CLI reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Genome,
    Image,
}

impl FromStr for DataType {
    type Err = RecognitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "genome" => Ok(DataType::Genome),
            "image" => Ok(DataType::Image),
            _ => Err(RecognitionError::UnknownSelector {
                kind: "data type",
                value: s.to_string(),
                expected: "genome, image",
            }),
        }
    }
}

impl DataType {
    pub fn source(self) -> Box<dyn SampleSource> {
        match self {
            DataType::Genome => Box::new(GenomeSource),
            DataType::Image => Box::new(ImageSource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    #[test]
    fn push_deduplicates_labels_in_first_seen_order() {
        let mut ds = Dataset::new();
        ds.push("b_1", Some("bob"));
        ds.push("a_1", Some("alice"));
        ds.push("b_2", Some("bob"));
        assert_eq!(ds.labels().len(), 2);
        assert_eq!(ds.labels()[0], DataLabel { id: 0, name: "bob".to_string() });
        assert_eq!(ds.label_indices().unwrap(), vec![0, 1, 0]);
        assert_eq!(ds.label_of(&ds.entries()[1]).unwrap().name, "alice");
    }

    #[test]
    fn directory_scan_derives_classes_from_file_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["carol_2.txt", "alice_1.txt", "carol_1.txt"] {
            fs::write(dir.path().join(name), "1 2 3").unwrap();
        }
        let ds = Dataset::from_directory(dir.path(), true).unwrap();
        let names: Vec<&str> = ds.labels().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
        assert!(ds.entries()[0].name.ends_with("alice_1.txt"));

        let unlabeled = Dataset::from_directory(dir.path(), false).unwrap();
        assert!(unlabeled.labels().is_empty());
        assert!(unlabeled.label_indices().is_err());
    }

    #[test]
    fn sample_matrix_rejects_mismatched_lengths() {
        let mut source = InMemorySource::new();
        source.insert("x", array![1.0, 2.0, 3.0]);
        source.insert("y", array![1.0, 2.0]);
        let mut ds = Dataset::new();
        ds.push("x", Some("a"));
        ds.push("y", Some("a"));
        let err = ds.sample_matrix(&source).unwrap_err();
        assert!(matches!(err, RecognitionError::DimensionMismatch { .. }));
    }

    #[test]
    fn genome_and_image_sources_decode() {
        let dir = tempfile::tempdir().unwrap();
        let genome = dir.path().join("g_1.txt");
        fs::write(&genome, "0.5 1\n-2.25\n").unwrap();
        let v = GenomeSource.read_sample(genome.to_str().unwrap()).unwrap();
        assert_eq!(v, array![0.5, 1.0, -2.25]);

        let image = dir.path().join("face_1.pgm");
        let mut f = fs::File::create(&image).unwrap();
        f.write_all(b"P5\n# comment\n2 2\n255\n").unwrap();
        f.write_all(&[0, 10, 200, 255]).unwrap();
        drop(f);
        let v = ImageSource.read_sample(image.to_str().unwrap()).unwrap();
        assert_eq!(v, array![0.0, 10.0, 200.0, 255.0]);

        let truncated = ImageSource::parse("t", b"P6 4 4 255\n\x01\x02");
        assert!(matches!(truncated, Err(RecognitionError::Format { .. })));
    }

    #[test]
    fn oversized_image_header_is_malformed() {
        let huge = ImageSource::parse("h", b"P5 99999999999 99999999999 255\n\x00");
        assert!(matches!(huge, Err(RecognitionError::Format { .. })));

        let max = format!("P6 {} 2 255\n", usize::MAX);
        let wide = ImageSource::parse("w", max.as_bytes());
        assert!(matches!(wide, Err(RecognitionError::Format { .. })));
    }
}

// src/stream.rs

use log::{debug, info};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::dataset::{Dataset, SampleSource};
use crate::error::{RecognitionError, Result};
use crate::model::ClassificationModel;

/// Ends the loop.
pub const END_TOKEN: u8 = b'0';
/// Runs one predict pass.
pub const READ_TOKEN: u8 = b'1';

/// Serves predict requests read one byte at a time from `input`.
///
/// Each [`READ_TOKEN`] rescans `dir` (unlabeled) and writes one
/// `name  label` line per sample and trained algorithm to `output`. A
/// pass over an empty directory writes nothing.
/// [`END_TOKEN`] or end of input stops the loop; every other byte is
/// ignored. Returns the number of passes served.
pub fn run_stream<R: Read, W: Write>(
    model: &ClassificationModel,
    dir: &Path,
    source: &dyn SampleSource,
    mut input: R,
    mut output: W,
) -> Result<usize> {
    let out_err = |e| RecognitionError::io("<stream output>", e);
    let mut passes = 0;
    let mut token = [0u8; 1];
    loop {
        match input.read(&mut token) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(RecognitionError::io("<stream input>", e)),
        }
        match token[0] {
            END_TOKEN => break,
            READ_TOKEN => {
                let dataset = Dataset::from_directory(dir, false)?;
                if dataset.is_empty() {
                    debug!("Stream directory {} is empty", dir.display());
                    passes += 1;
                    continue;
                }
                for (kind, labels) in model.predict_labels(&dataset, source)? {
                    debug!("{}: {} stream predictions", kind, labels.len());
                    for (name, label) in labels {
                        writeln!(output, "{:<12}  {}", name, label).map_err(out_err)?;
                    }
                }
                output.flush().map_err(out_err)?;
                passes += 1;
            }
            _ => {}
        }
    }
    info!("Stream closed after {} predict passes", passes);
    Ok(passes)
}

use crate::encoder::{CodecEncoder, Encoder};
use crate::error::{CompressionError, ErrorKind, Result};
use crate::formats::is_supported_image;
use crate::optimizer::{OptimizationResult, Optimizer, SearchOptions};
use crate::validation::validate_output_dir;
use glob::glob;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Where optimized files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Write `<dir>/<file name>` for every input.
    Directory(PathBuf),
    /// Replace each input, only after it was optimized without error.
    InPlace,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output: OutputMode,
    pub target_size: Option<u64>,
    pub search: SearchOptions,
    /// Files optimized concurrently; `None` or `Some(1)` runs sequentially.
    pub jobs: Option<usize>,
}

/// One line of the batch report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub filename: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    Optimized(OptimizationResult),
    Failed {
        success: bool,
        error: String,
        kind: ErrorKind,
    },
}

impl BatchRecord {
    fn failed(input: &Path, output: PathBuf, err: &CompressionError) -> Self {
        Self {
            filename: file_name(input),
            input_path: input.to_path_buf(),
            output_path: output,
            outcome: RecordOutcome::Failed {
                success: false,
                error: err.to_string(),
                kind: err.kind(),
            },
        }
    }

    pub fn success(&self) -> bool {
        match &self.outcome {
            RecordOutcome::Optimized(result) => result.success,
            RecordOutcome::Failed { .. } => false,
        }
    }

    pub fn result(&self) -> Option<&OptimizationResult> {
        match &self.outcome {
            RecordOutcome::Optimized(result) => Some(result),
            RecordOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RecordOutcome::Optimized(_) => None,
            RecordOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Optimizes every input with the production encoder.
///
/// One record per input, in input order. A failing file becomes a failed
/// record; only setup problems (output directory, worker pool) fail the call.
pub fn batch_optimize(inputs: &[PathBuf], options: &BatchOptions) -> Result<Vec<BatchRecord>> {
    let optimizer = Optimizer::new(CodecEncoder, options.search);
    batch_optimize_with(&optimizer, inputs, options, &ProgressBar::hidden())
}

pub fn batch_optimize_with<E: Encoder>(
    optimizer: &Optimizer<E>,
    inputs: &[PathBuf],
    options: &BatchOptions,
    progress: &ProgressBar,
) -> Result<Vec<BatchRecord>> {
    if let OutputMode::Directory(dir) = &options.output {
        validate_output_dir(dir)?;
    }

    let plans = plan_outputs(inputs, &options.output);
    let process = |(input, plan): (&PathBuf, &Planned)| {
        let record = match plan {
            Planned::Write(output_path) => process_single_image(
                optimizer,
                input,
                output_path,
                &options.output,
                options.target_size,
            ),
            Planned::Rejected(record) => record.clone(),
        };
        progress.inc(1);
        record
    };

    let jobs = options.jobs.unwrap_or(1).max(1);
    let records = if jobs > 1 && inputs.len() > 1 {
        debug!(jobs, files = inputs.len(), "optimizing in parallel");
        let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
        pool.install(|| inputs.par_iter().zip(plans.par_iter()).map(process).collect())
    } else {
        inputs.iter().zip(plans.iter()).map(process).collect()
    };

    Ok(records)
}

/// Output decided for one input before any work starts.
enum Planned {
    Write(PathBuf),
    Rejected(BatchRecord),
}

/// Assigns every input its output path. The first input to claim a path keeps
/// it; later inputs mapping to the same path are rejected so no output is
/// written twice.
fn plan_outputs(inputs: &[PathBuf], output: &OutputMode) -> Vec<Planned> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();

    inputs
        .iter()
        .map(|input| {
            let path = match output {
                OutputMode::Directory(dir) => match generate_output_path(input, dir) {
                    Ok(path) => path,
                    Err(e) => return Planned::Rejected(BatchRecord::failed(input, dir.clone(), &e)),
                },
                OutputMode::InPlace => input.clone(),
            };

            match claimed.entry(path.clone()) {
                Entry::Occupied(first) => {
                    let err = CompressionError::OutputConflict {
                        path: path.clone(),
                        first: first.get().to_path_buf(),
                    };
                    warn!(input = %input.display(), error = %err, "skipping input");
                    Planned::Rejected(BatchRecord::failed(input, path, &err))
                }
                Entry::Vacant(slot) => {
                    slot.insert(input.as_path());
                    Planned::Write(path)
                }
            }
        })
        .collect()
}

fn process_single_image<E: Encoder>(
    optimizer: &Optimizer<E>,
    input: &Path,
    output_path: &Path,
    output: &OutputMode,
    target_size: Option<u64>,
) -> BatchRecord {
    let outcome = match output {
        OutputMode::Directory(_) => optimizer.optimize_file(input, output_path, target_size),
        OutputMode::InPlace => optimize_in_place(optimizer, input, target_size),
    };

    match outcome {
        Ok(result) => BatchRecord {
            filename: file_name(input),
            input_path: input.to_path_buf(),
            output_path: output_path.to_path_buf(),
            outcome: RecordOutcome::Optimized(result),
        },
        Err(e) => {
            error!(input = %input.display(), error = %e, "failed to optimize");
            BatchRecord::failed(input, output_path.to_path_buf(), &e)
        }
    }
}

/// Writes into a temporary file next to the input and renames it over the
/// original once the optimization succeeded. On error the temporary file is
/// dropped and the original is untouched.
///
/// Also used by single-file compression when the output is the input.
pub fn optimize_in_place<E: Encoder>(
    optimizer: &Optimizer<E>,
    input: &Path,
    target_size: Option<u64>,
) -> Result<OptimizationResult> {
    let parent = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent)?;

    let result = optimizer.optimize_file(input, temp.path(), target_size)?;
    fs::set_permissions(temp.path(), fs::metadata(input)?.permissions())?;

    temp.persist(input)
        .map_err(|e| CompressionError::ReplaceFailed {
            path: input.to_path_buf(),
            source: e.error,
        })?;
    Ok(result)
}

/// Resolves command-line inputs (files, directories, glob patterns) into a
/// de-duplicated list of image paths, keeping first-seen order.
pub fn resolve_inputs(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for input in inputs {
        for path in collect_image_files(input, recursive)? {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

pub fn collect_image_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();
    let input_path = Path::new(input);

    if input_path.is_file() {
        // explicit files pass through, unsupported ones fail later per file
        image_files.push(input_path.to_path_buf());
    } else if input_path.is_dir() {
        let walker = if recursive {
            WalkDir::new(input_path).sort_by_file_name()
        } else {
            WalkDir::new(input_path).max_depth(1).sort_by_file_name()
        };

        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(input, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_file() && is_supported_image(path) {
                image_files.push(path.to_path_buf());
            }
        }
    } else {
        let pattern =
            glob(input).map_err(|_| CompressionError::NoImageFilesFound(input.to_string()))?;
        for entry in pattern.flatten() {
            if entry.is_file() && is_supported_image(&entry) {
                image_files.push(entry);
            }
        }
    }

    Ok(image_files)
}

pub fn generate_output_path(input_path: &Path, output_dir: &Path) -> Result<PathBuf> {
    let name = input_path
        .file_name()
        .ok_or_else(|| CompressionError::UnsupportedFormat("Invalid file name".to_string()))?;
    Ok(output_dir.join(name))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

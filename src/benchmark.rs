use crate::config::RunConfig;
use crate::data_io::{DataReader, NetCDFReader, ReaderError};
use crate::operations::{run_operation, Operation};
use crate::parallel::{ChunkShape, PipelineError, PipelineStats};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Read error: {0}")]
    Read(#[from] ReaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Field {field} differs in shape: {reference:?} vs {candidate:?}")]
    ShapeMismatch {
        field: String,
        reference: Vec<usize>,
        candidate: Vec<usize>,
    },

    #[error("No operations or chunk parameters to benchmark")]
    Empty,
}

/// Timing of one operation at one chunk parameter
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub operation: String,
    pub chunk: usize,
    pub output: PathBuf,
    pub duration: Duration,
    pub stats: PipelineStats,
    /// Largest scaled difference from the unchunked output, when one was run
    pub max_diff: Option<f64>,
}

/// Results of running a set of operations over a set of chunk parameters
#[derive(Debug, Clone)]
pub struct BenchmarkSuite {
    pub results: Vec<BenchmarkResult>,
    pub input_file: PathBuf,
    pub threads: Option<usize>,
}

impl BenchmarkSuite {
    /// Run every operation at every chunk parameter and write the report
    pub fn run_suite(
        operations: &[Operation],
        chunk_params: &[usize],
        base: &RunConfig,
    ) -> Result<Self, BenchmarkError> {
        if operations.is_empty() || chunk_params.is_empty() {
            return Err(BenchmarkError::Empty);
        }
        let output_dir = base.output_dir();
        fs::create_dir_all(&output_dir)?;

        log::info!(
            "Benchmarking {} operation(s) over chunks {:?} on {}",
            operations.len(),
            chunk_params,
            base.input.display()
        );

        let mut results = Vec::with_capacity(operations.len() * chunk_params.len());
        for operation in operations {
            let fields: Vec<String> = operation
                .output_fields()
                .into_iter()
                .map(String::from)
                .collect();
            let mut unchunked: Option<PathBuf> = None;
            for &chunk in chunk_params {
                let mut config = base.clone();
                config.chunks = ChunkShape {
                    time: chunk,
                    lat: base.chunks.lat,
                };
                let outcome = run_operation(operation, &config)?;
                log::info!(
                    "  {} chunk={}: {:.3}s",
                    operation,
                    chunk,
                    outcome.stats.total_time.as_secs_f64()
                );
                let max_diff = match &unchunked {
                    Some(reference) if chunk != 0 => Some(
                        compare_outputs(reference, &outcome.output, &fields)?
                            .iter()
                            .map(|c| if c.nan_mismatches > 0 { f64::INFINITY } else { c.max_scaled_diff })
                            .fold(0.0, f64::max),
                    ),
                    _ => None,
                };
                if chunk == 0 {
                    unchunked = Some(outcome.output.clone());
                }
                results.push(BenchmarkResult {
                    operation: operation.to_string(),
                    chunk,
                    output: outcome.output,
                    duration: outcome.stats.total_time,
                    stats: outcome.stats,
                    max_diff,
                });
            }
        }

        let suite = BenchmarkSuite {
            results,
            input_file: base.input.clone(),
            threads: base.threads,
        };
        suite.write_report(&output_dir)?;
        Ok(suite)
    }

    /// Write `benchmark_report.txt` into `output_dir`; returns its path
    pub fn write_report(&self, output_dir: &Path) -> Result<PathBuf, BenchmarkError> {
        let report_path = output_dir.join("benchmark_report.txt");
        let mut report = String::new();

        report.push_str("=== Atmospheric Benchmark Report ===\n\n");
        report.push_str(&format!(
            "Generated: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        report.push_str(&format!("Input file: {}\n", self.input_file.display()));
        match self.threads {
            Some(n) => report.push_str(&format!("Threads: {}\n", n)),
            None => report.push_str(&format!("Threads: {} (global pool)\n", rayon::current_num_threads())),
        }
        report.push('\n');

        report.push_str("Operation             | Chunk | Tiles | Read (s) | Compute (s) | Write (s) | Total (s) | Speedup | Max diff\n");
        report.push_str("----------------------|-------|-------|----------|-------------|-----------|-----------|---------|---------\n");
        for result in &self.results {
            let speedup = self
                .baseline(&result.operation)
                .map(|base| base.as_secs_f64() / result.duration.as_secs_f64().max(f64::EPSILON));
            report.push_str(&format!(
                "{:21} | {:5} | {:5} | {:8.3} | {:11.3} | {:9.3} | {:9.3} | {:>7} | {}\n",
                result.operation,
                result.chunk,
                result.stats.tiles,
                result.stats.read_time.as_secs_f64(),
                result.stats.compute_time.as_secs_f64(),
                result.stats.write_time.as_secs_f64(),
                result.duration.as_secs_f64(),
                speedup
                    .map(|s| format!("{:.2}x", s))
                    .unwrap_or_else(|| "-".to_string()),
                result
                    .max_diff
                    .map(|d| format!("{:.2e}", d))
                    .unwrap_or_else(|| "-".to_string())
            ));
        }

        report.push_str("\n=== Fastest chunk per operation ===\n");
        let mut seen: Vec<&str> = Vec::new();
        for result in &self.results {
            if seen.contains(&result.operation.as_str()) {
                continue;
            }
            seen.push(&result.operation);
            if let Some(best) = self.find_fastest_chunk(&result.operation) {
                report.push_str(&format!("{}: chunk {}\n", result.operation, best));
            }
        }

        fs::write(&report_path, report)?;
        log::info!("Benchmark report written to: {}", report_path.display());
        Ok(report_path)
    }

    /// Unchunked duration of an operation, if it was run
    fn baseline(&self, operation: &str) -> Option<Duration> {
        self.results
            .iter()
            .find(|r| r.operation == operation && r.chunk == 0)
            .map(|r| r.duration)
    }

    /// Chunk parameter with the shortest total time for an operation
    pub fn find_fastest_chunk(&self, operation: &str) -> Option<usize> {
        self.results
            .iter()
            .filter(|r| r.operation == operation)
            .min_by_key(|r| r.duration)
            .map(|r| r.chunk)
    }
}

/// Difference statistics of one field between two datasets
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComparison {
    pub field: String,
    pub max_abs_diff: f64,
    /// Largest `|a - b| / max(1, |a|, |b|)`
    pub max_scaled_diff: f64,
    /// Points where exactly one side is NaN
    pub nan_mismatches: usize,
}

impl FieldComparison {
    pub fn passes(&self, tolerance: f64) -> bool {
        self.nan_mismatches == 0 && self.max_scaled_diff <= tolerance
    }
}

impl fmt::Display for FieldComparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: max |diff| {:.3e}, max scaled diff {:.3e}, NaN mismatches {}",
            self.field, self.max_abs_diff, self.max_scaled_diff, self.nan_mismatches
        )
    }
}

/// Compare fields of two readers value by value; NaN matches NaN
pub fn compare_fields<A: DataReader, B: DataReader>(
    reference: &A,
    candidate: &B,
    fields: &[String],
) -> Result<Vec<FieldComparison>, BenchmarkError> {
    let mut comparisons = Vec::with_capacity(fields.len());
    for field in fields {
        let a = reference.read_field(field)?;
        let b = candidate.read_field(field)?;
        if a.shape() != b.shape() {
            return Err(BenchmarkError::ShapeMismatch {
                field: field.clone(),
                reference: a.shape().to_vec(),
                candidate: b.shape().to_vec(),
            });
        }

        let mut cmp = FieldComparison {
            field: field.clone(),
            max_abs_diff: 0.0,
            max_scaled_diff: 0.0,
            nan_mismatches: 0,
        };
        for (&x, &y) in a.iter().zip(b.iter()) {
            match (x.is_nan(), y.is_nan()) {
                (true, true) => continue,
                (false, false) => {}
                _ => {
                    cmp.nan_mismatches += 1;
                    continue;
                }
            }
            let (x, y) = (x as f64, y as f64);
            let diff = (x - y).abs();
            let scale = x.abs().max(y.abs()).max(1.0);
            cmp.max_abs_diff = cmp.max_abs_diff.max(diff);
            cmp.max_scaled_diff = cmp.max_scaled_diff.max(diff / scale);
        }
        comparisons.push(cmp);
    }
    Ok(comparisons)
}

/// Compare two NetCDF files. With no field list every field of the
/// reference is compared.
pub fn compare_outputs(
    reference: &Path,
    candidate: &Path,
    fields: &[String],
) -> Result<Vec<FieldComparison>, BenchmarkError> {
    let reference = NetCDFReader::open(reference)?;
    let candidate = NetCDFReader::open(candidate)?;
    let fields = if fields.is_empty() {
        reference.layout().field_names()
    } else {
        fields.to_vec()
    };
    compare_fields(&reference, &candidate, &fields)
}

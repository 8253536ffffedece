use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use fringe_pmd::analysis::smoothing::SmoothingConfig;
use fringe_pmd::data::filter::subtract_reference;
use fringe_pmd::{
    load_trace, CountingMode, Pipeline, PipelineConfig, PipelineOutput, RowPolicy, Trace,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Estimate PMD from interferometric spectra by fringe counting.
#[derive(Parser, Debug)]
#[command(name = "fringe-pmd", version, about)]
struct Cli {
    /// Trace file (.csv, .txt, .json) or a directory of traces.
    input: PathBuf,

    /// JSON config file; command-line flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reference trace subtracted from every measurement before analysis.
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<CountingMode>,

    /// Sweep start in nm (default: first wavelength of the trace).
    #[arg(long, value_name = "NM")]
    lambda_min: Option<f64>,

    /// Sweep stop in nm (default: last wavelength of the trace).
    #[arg(long, value_name = "NM")]
    lambda_max: Option<f64>,

    #[arg(long, value_name = "KM")]
    fiber_length: Option<f64>,

    #[arg(long)]
    k_sigma: Option<f64>,

    #[arg(long, value_name = "DB")]
    floor_db: Option<f64>,

    /// Use the noise-based delta only, skip the plateau scan.
    #[arg(long)]
    no_scan: bool,

    #[arg(long, value_name = "DB")]
    scan_min: Option<f64>,

    #[arg(long, value_name = "DB")]
    scan_max: Option<f64>,

    #[arg(long, value_name = "N")]
    scan_steps: Option<usize>,

    /// Only count within this many dB of the trace maximum.
    #[arg(long, value_name = "DB")]
    threshold_db: Option<f64>,

    /// Savitzky–Golay smoothing before detection (window 11, order 3).
    #[arg(long)]
    smooth: bool,

    /// Drop samples at or below this wavelength (header artifacts).
    #[arg(long, value_name = "NM")]
    min_wavelength: Option<f64>,

    /// Skip unparsable rows instead of rejecting the trace.
    #[arg(long)]
    skip_bad_rows: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Write the report to a file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File config (or defaults) with command-line overrides applied.
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.lambda_min.is_some() {
            config.lambda_min_nm = self.lambda_min;
        }
        if self.lambda_max.is_some() {
            config.lambda_max_nm = self.lambda_max;
        }
        if let Some(v) = self.fiber_length {
            config.fiber_length_km = v;
        }
        if let Some(v) = self.k_sigma {
            config.k_sigma = v;
        }
        if let Some(v) = self.floor_db {
            config.floor_db = v;
        }
        if self.no_scan {
            config.use_scan = false;
        }
        if let Some(v) = self.scan_min {
            config.scan_min = v;
        }
        if let Some(v) = self.scan_max {
            config.scan_max = v;
        }
        if let Some(v) = self.scan_steps {
            config.scan_steps = v;
        }
        if let Some(v) = self.threshold_db {
            config.use_mask = true;
            config.threshold_db = v;
        }
        if self.smooth && config.smoothing.is_none() {
            config.smoothing = Some(SmoothingConfig::default());
        }
        if self.min_wavelength.is_some() {
            config.min_wavelength_nm = self.min_wavelength;
        }
        Ok(config)
    }

    fn row_policy(&self) -> RowPolicy {
        if self.skip_bad_rows {
            RowPolicy::Skip
        } else {
            RowPolicy::Abort
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One line of the report: a file and what became of it.
#[derive(Debug, Serialize)]
struct ReportEntry {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PipelineOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn format_entry(entry: &ReportEntry, mode: CountingMode) -> String {
    match (&entry.output, &entry.error) {
        (Some(out), _) => {
            let r = &out.result;
            let mut line = format!(
                "{}: N = {} ({mode}), delta = {:.3} dB, Δt_PMD = {:.4} ps, D_PMD = {:.4} ps/√km",
                entry.file, r.n_extrema, r.delta_db_used, r.delta_t_ps, r.d_pmd_ps_per_sqrt_km
            );
            for w in &out.warnings {
                line.push_str(&format!(" [warning: {w}]"));
            }
            line
        }
        (None, Some(err)) => format!("{}: FAILED: {err}", entry.file),
        (None, None) => format!("{}: no result", entry.file),
    }
}

fn write_report(entries: &[ReportEntry], cli: &Cli, mode: CountingMode) -> Result<()> {
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    if cli.json {
        serde_json::to_writer_pretty(&mut out, entries).context("writing JSON report")?;
        writeln!(out)?;
    } else {
        for entry in entries {
            writeln!(out, "{}", format_entry(entry, mode))?;
        }
    }
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Input discovery
// ---------------------------------------------------------------------------

fn is_trace_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("csv" | "txt" | "json")
    )
}

/// The input file itself, or every trace file under the input directory,
/// sorted. `exclude` (the reference trace) is never returned from a directory.
fn collect_inputs(input: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }
    let excluded = exclude.and_then(|p| p.canonicalize().ok());
    let mut files = Vec::new();
    for entry in WalkDir::new(input) {
        let entry = entry.with_context(|| format!("scanning {}", input.display()))?;
        if !entry.file_type().is_file() || !is_trace_file(entry.path()) {
            continue;
        }
        if excluded.is_some() && entry.path().canonicalize().ok() == excluded {
            debug!("not analysing reference {}", entry.path().display());
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let config = cli.pipeline_config()?;
    let mode = config.mode;
    let pipeline = Pipeline::new(config).context("invalid configuration")?;

    let reference = match &cli.reference {
        Some(path) => Some(
            load_trace(path, cli.row_policy())
                .with_context(|| format!("loading reference {}", path.display()))?,
        ),
        None => None,
    };

    let files = collect_inputs(&cli.input, cli.reference.as_deref())?;
    if files.is_empty() {
        bail!("no trace files found under {}", cli.input.display());
    }
    info!("analysing {} trace(s)", files.len());

    // Load failures keep their slot so the report stays in file order.
    let loaded: Vec<(String, Result<Trace>)> = files
        .iter()
        .map(|path| {
            let name = path.display().to_string();
            let trace = load_trace(path, cli.row_policy())
                .map_err(anyhow::Error::from)
                .and_then(|trace| match &reference {
                    Some(reference) => Ok(subtract_reference(&trace, reference)?),
                    None => Ok(trace),
                });
            (name, trace)
        })
        .collect();

    let traces: Vec<Trace> = loaded
        .iter()
        .filter_map(|(_, t)| t.as_ref().ok().cloned())
        .collect();
    let mut results = pipeline.run_batch(&traces).into_iter();

    let mut entries = Vec::with_capacity(loaded.len());
    for (file, trace) in loaded {
        let outcome = match trace {
            Ok(_) => match results.next() {
                Some(Ok(out)) => Ok(out),
                Some(Err(e)) => Err(anyhow::Error::from(e)),
                None => Err(anyhow::anyhow!("missing pipeline result")),
            },
            Err(e) => Err(e),
        };
        let entry = match outcome {
            Ok(out) => {
                for w in &out.warnings {
                    warn!("{file}: {w}");
                }
                ReportEntry {
                    file,
                    output: Some(out),
                    error: None,
                }
            }
            Err(e) => {
                error!("{file}: {e:#}");
                ReportEntry {
                    file,
                    output: None,
                    error: Some(format!("{e:#}")),
                }
            }
        };
        entries.push(entry);
    }

    write_report(&entries, &cli, mode)?;

    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    if failed > 0 {
        warn!("{failed} of {} trace(s) failed", entries.len());
    }
    if failed == entries.len() {
        bail!("every trace failed");
    }
    Ok(())
}

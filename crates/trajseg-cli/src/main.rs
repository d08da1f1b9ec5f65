// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use serde::Serialize;
use std::env;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use trajseg_cli::{
    CliError, RunSummary, TrajectoryResult, read_trajectories, segment_inputs, write_results,
};
use trajseg_core::{BudgetMode, Constraints, ExecutionContext, ReproMode};
use trajseg_offline::{CostStorage, Segmenter, SegmenterConfig};

const DEFAULT_MAX_SEGMENTS: usize = 50;

enum Command {
    Segment(SegmentArgs),
}

#[derive(Debug)]
struct SegmentArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    summary: Option<PathBuf>,
    max_segments: usize,
    jobs: Option<usize>,
    time_budget_ms: Option<u64>,
    memory_budget_bytes: Option<usize>,
    max_points: Option<usize>,
    budget_mode: BudgetMode,
    repro_mode: ReproMode,
    cost_storage: CostStorage,
}

impl Default for SegmentArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            summary: None,
            max_segments: DEFAULT_MAX_SEGMENTS,
            jobs: None,
            time_budget_ms: None,
            memory_budget_bytes: None,
            max_points: None,
            budget_mode: BudgetMode::HardFail,
            repro_mode: ReproMode::Balanced,
            cost_storage: CostStorage::Dense,
        }
    }
}

impl SegmentArgs {
    fn constraints(&self) -> Constraints {
        Constraints {
            time_budget_ms: self.time_budget_ms,
            memory_budget_bytes: self.memory_budget_bytes,
            max_points: self.max_points,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunStatus {
    Success,
    TrajectoriesFailed,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

fn main() {
    init_tracing();
    match run() {
        Ok(RunStatus::Success) => {}
        Ok(RunStatus::TrajectoriesFailed) => process::exit(2),
        Err(err) => {
            emit_structured_error(&err);
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunStatus, CliError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = parse_cli(&args)? else {
        return Ok(RunStatus::Success);
    };

    match command {
        Command::Segment(args) => handle_segment(args),
    }
}

fn parse_cli(args: &[String]) -> Result<Option<Command>, CliError> {
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print_root_help();
        return Ok(None);
    }
    if matches!(args[0].as_str(), "-V" | "--version") {
        print_version();
        return Ok(None);
    }

    let command_name = args[0].as_str();
    let rest = &args[1..];

    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_command_help(command_name)?;
        return Ok(None);
    }

    match command_name {
        "segment" => Ok(Some(Command::Segment(parse_segment_args(rest)?))),
        _ => Err(CliError::invalid_input(format!(
            "unknown command '{command_name}'; expected: segment"
        ))),
    }
}

fn parse_segment_args(tokens: &[String]) -> Result<SegmentArgs, CliError> {
    let mut args = SegmentArgs::default();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let (flag, inline_value) = split_flag(tokens[idx].as_str())?;
        match flag {
            "--input" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.input = PathBuf::from(raw);
            }
            "--output" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.output = Some(PathBuf::from(raw));
            }
            "--summary" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.summary = Some(PathBuf::from(raw));
            }
            "--max-segments" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.max_segments = parse_usize_arg(raw.as_str(), flag)?;
            }
            "--jobs" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.jobs = Some(parse_usize_arg(raw.as_str(), flag)?);
            }
            "--time-budget-ms" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.time_budget_ms = Some(parse_u64_arg(raw.as_str(), flag)?);
            }
            "--memory-budget-bytes" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.memory_budget_bytes = Some(parse_usize_arg(raw.as_str(), flag)?);
            }
            "--max-points" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.max_points = Some(parse_usize_arg(raw.as_str(), flag)?);
            }
            "--budget-mode" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.budget_mode = parse_budget_mode(raw.as_str())?;
            }
            "--repro" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.repro_mode = parse_repro_mode(raw.as_str())?;
            }
            "--cost-storage" => {
                let raw = take_flag_value(flag, inline_value, tokens, &mut idx)?;
                args.cost_storage = parse_cost_storage(raw.as_str())?;
            }
            other => {
                return Err(CliError::invalid_input(format!(
                    "unknown segment option '{other}'"
                )));
            }
        }
        idx += 1;
    }

    if args.input.as_os_str().is_empty() {
        return Err(CliError::invalid_input("segment requires --input <path>"));
    }
    if args.max_segments == 0 {
        return Err(CliError::invalid_input(
            "--max-segments must be >= 1; got 0",
        ));
    }
    if args.jobs == Some(0) {
        return Err(CliError::invalid_input("--jobs must be >= 1; got 0"));
    }

    Ok(args)
}

fn split_flag(token: &str) -> Result<(&str, Option<String>), CliError> {
    if !token.starts_with("--") {
        return Err(CliError::invalid_input(format!(
            "unexpected positional argument '{token}'; expected --flag value"
        )));
    }
    if let Some((flag, value)) = token.split_once('=') {
        return Ok((flag, Some(value.to_string())));
    }
    Ok((token, None))
}

fn take_flag_value(
    flag: &str,
    inline_value: Option<String>,
    tokens: &[String],
    idx: &mut usize,
) -> Result<String, CliError> {
    if let Some(value) = inline_value {
        return Ok(value);
    }

    *idx += 1;
    let value = tokens
        .get(*idx)
        .ok_or_else(|| CliError::invalid_input(format!("{flag} requires a value")))?;
    if value.starts_with("--") {
        return Err(CliError::invalid_input(format!(
            "{flag} requires a value, but got option '{value}'"
        )));
    }
    Ok(value.clone())
}

fn parse_usize_arg(raw: &str, flag: &str) -> Result<usize, CliError> {
    raw.parse::<usize>().map_err(|_| {
        CliError::invalid_input(format!(
            "{flag} expects a non-negative integer, got '{raw}'"
        ))
    })
}

fn parse_u64_arg(raw: &str, flag: &str) -> Result<u64, CliError> {
    raw.parse::<u64>().map_err(|_| {
        CliError::invalid_input(format!(
            "{flag} expects a non-negative integer, got '{raw}'"
        ))
    })
}

fn parse_budget_mode(raw: &str) -> Result<BudgetMode, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "hard" | "hard_fail" => Ok(BudgetMode::HardFail),
        "soft" | "soft_degrade" => Ok(BudgetMode::SoftDegrade),
        _ => Err(CliError::invalid_input(format!(
            "invalid --budget-mode '{raw}'; expected one of: hard, soft"
        ))),
    }
}

fn parse_repro_mode(raw: &str) -> Result<ReproMode, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "strict" => Ok(ReproMode::Strict),
        "balanced" => Ok(ReproMode::Balanced),
        "fast" => Ok(ReproMode::Fast),
        _ => Err(CliError::invalid_input(format!(
            "invalid --repro '{raw}'; expected one of: strict, balanced, fast"
        ))),
    }
}

fn parse_cost_storage(raw: &str) -> Result<CostStorage, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "dense" => Ok(CostStorage::Dense),
        "on_demand" | "on-demand" => Ok(CostStorage::OnDemand),
        _ => Err(CliError::invalid_input(format!(
            "invalid --cost-storage '{raw}'; expected one of: dense, on_demand"
        ))),
    }
}

fn print_version() {
    println!("trajseg {}", env!("CARGO_PKG_VERSION"));
}

fn print_root_help() {
    println!(
        "trajseg {}\n\nUSAGE:\n  trajseg <COMMAND> [OPTIONS]\n\nCOMMANDS:\n  segment   Segment every trajectory in a signal CSV\n\nGLOBAL OPTIONS:\n  -h, --help      Show help\n  -V, --version   Show version\n\nLog verbosity follows RUST_LOG (default: info).",
        env!("CARGO_PKG_VERSION")
    );
}

fn print_command_help(command: &str) -> Result<(), CliError> {
    match command {
        "segment" => {
            println!(
                "USAGE:\n  trajseg segment --input <path> [OPTIONS]\n\nOPTIONS:\n  --input <path>                         Required signal CSV\n  --output <path>                        Write segmented CSV to file (default: stdout)\n  --summary <path>                       Write JSON run summary to file\n  --max-segments <usize>                 Default: 50\n  --jobs <usize>                         Worker threads (default: rayon default)\n  --time-budget-ms <u64>                 Per-trajectory time budget\n  --memory-budget-bytes <usize>          Per-trajectory memory budget\n  --max-points <usize>                   Per-trajectory size limit\n  --budget-mode <hard|soft>              Default: hard\n  --repro <strict|balanced|fast>         Default: balanced\n  --cost-storage <dense|on_demand>       Default: dense"
            );
            Ok(())
        }
        _ => Err(CliError::invalid_input(format!(
            "unknown command '{command}'; expected: segment"
        ))),
    }
}

fn handle_segment(args: SegmentArgs) -> Result<RunStatus, CliError> {
    let started_at = Instant::now();
    let constraints = args.constraints();
    constraints.validate()?;
    let segmenter = Segmenter::new(SegmenterConfig {
        max_segments: args.max_segments,
        cost_storage: args.cost_storage,
        ..SegmenterConfig::default()
    })?;

    let input = File::open(&args.input).map_err(|source| {
        CliError::io(format!("failed to open '{}'", args.input.display()), source)
    })?;
    let inputs = read_trajectories(BufReader::new(input))?;
    tracing::info!(
        input = %args.input.display(),
        trajectories = inputs.len(),
        rejected = inputs.iter().filter(|input| input.trajectory.is_err()).count(),
        points = inputs.iter().map(|input| input.n).sum::<usize>(),
        "loaded signal file"
    );

    let ctx = ExecutionContext::new(&constraints)
        .with_budget_mode(args.budget_mode)
        .with_repro_mode(args.repro_mode);
    let results = match args.jobs {
        Some(1) => segment_inputs(&segmenter, inputs, &ctx, false),
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|err| {
                    CliError::invalid_input(format!("failed to build a {jobs}-thread pool: {err}"))
                })?;
            pool.install(|| segment_inputs(&segmenter, inputs, &ctx, true))
        }
        None => segment_inputs(&segmenter, inputs, &ctx, true),
    };

    write_segmented_output(&results, args.output.as_deref())?;

    let summary = RunSummary::new(args.input.display().to_string(), &results);
    tracing::info!(
        trajectories = summary.trajectories,
        segmented = summary.segmented,
        failed = summary.failed,
        runtime_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        "segmentation run finished"
    );
    if let Some(path) = args.summary.as_deref() {
        write_json_output(&summary, path)?;
    }

    if summary.failed > 0 {
        Ok(RunStatus::TrajectoriesFailed)
    } else {
        Ok(RunStatus::Success)
    }
}

fn write_segmented_output(
    results: &[TrajectoryResult],
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let sink: Box<dyn Write> = match output_path {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|source| {
            CliError::io(format!("failed to create '{}'", path.display()), source)
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut sink = write_results(sink, results)?;
    sink.flush()
        .map_err(|source| CliError::io("failed to flush segmented output", source))
}

fn write_json_output<T: Serialize>(payload: &T, output_path: &Path) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(payload)
        .map_err(|source| CliError::json("failed to serialize JSON output", source))?;
    fs::write(output_path, format!("{encoded}\n")).map_err(|source| {
        CliError::io(format!("failed to write '{}'", output_path.display()), source)
    })
}

fn emit_structured_error(err: &CliError) {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!(
            "{{\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            err.code(),
            err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, parse_cli, parse_segment_args};
    use trajseg_core::{BudgetMode, ReproMode};
    use trajseg_offline::CostStorage;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn segment_args_have_expected_defaults() {
        let args = parse_segment_args(&tokens(&["--input", "signals.csv"]))
            .expect("minimal args should parse");
        assert_eq!(args.input.to_str(), Some("signals.csv"));
        assert_eq!(args.max_segments, 50);
        assert_eq!(args.budget_mode, BudgetMode::HardFail);
        assert_eq!(args.repro_mode, ReproMode::Balanced);
        assert_eq!(args.cost_storage, CostStorage::Dense);
        assert!(args.output.is_none());
        assert!(args.jobs.is_none());
    }

    #[test]
    fn segment_args_accept_inline_and_spaced_values() {
        let args = parse_segment_args(&tokens(&[
            "--input=signals.csv",
            "--output",
            "out.csv",
            "--summary=summary.json",
            "--max-segments",
            "12",
            "--jobs=4",
            "--time-budget-ms",
            "250",
            "--memory-budget-bytes=1048576",
            "--max-points",
            "5000",
            "--budget-mode",
            "soft",
            "--repro=strict",
            "--cost-storage",
            "on_demand",
        ]))
        .expect("full args should parse");

        assert_eq!(args.output.as_deref().and_then(|p| p.to_str()), Some("out.csv"));
        assert_eq!(args.summary.as_deref().and_then(|p| p.to_str()), Some("summary.json"));
        assert_eq!(args.max_segments, 12);
        assert_eq!(args.jobs, Some(4));
        let constraints = args.constraints();
        assert_eq!(constraints.time_budget_ms, Some(250));
        assert_eq!(constraints.memory_budget_bytes, Some(1_048_576));
        assert_eq!(constraints.max_points, Some(5000));
        assert_eq!(args.budget_mode, BudgetMode::SoftDegrade);
        assert_eq!(args.repro_mode, ReproMode::Strict);
        assert_eq!(args.cost_storage, CostStorage::OnDemand);
    }

    #[test]
    fn segment_args_reject_bad_values() {
        let cases: Vec<(Vec<&str>, &str)> = vec![
            (vec!["--max-segments", "3"], "requires --input"),
            (vec!["--input", "a.csv", "--max-segments", "0"], "--max-segments must be >= 1"),
            (vec!["--input", "a.csv", "--jobs", "0"], "--jobs must be >= 1"),
            (vec!["--input", "a.csv", "--max-segments", "-1"], "non-negative integer"),
            (vec!["--input", "a.csv", "--repro", "exact"], "invalid --repro"),
            (vec!["--input", "a.csv", "--budget-mode", "maybe"], "invalid --budget-mode"),
            (vec!["--input", "a.csv", "--cost-storage", "sparse"], "invalid --cost-storage"),
            (vec!["--input", "a.csv", "--frobnicate"], "unknown segment option"),
            (vec!["--input"], "requires a value"),
            (vec!["--input", "--output"], "requires a value, but got option"),
            (vec!["signals.csv"], "unexpected positional argument"),
        ];

        for (raw, expected) in cases {
            let err = parse_segment_args(&tokens(&raw)).expect_err("args should be rejected");
            assert_eq!(err.code(), "invalid_input");
            assert!(
                err.to_string().contains(expected),
                "args={raw:?}: '{err}' should mention '{expected}'"
            );
        }
    }

    #[test]
    fn unknown_commands_are_rejected() {
        let err = parse_cli(&tokens(&["detect", "--input", "a.csv"]))
            .err()
            .expect("unknown command should fail");
        assert!(err.to_string().contains("unknown command 'detect'"));

        let parsed = parse_cli(&tokens(&["segment", "--input", "a.csv"]))
            .expect("segment should parse")
            .expect("segment yields a command");
        let Command::Segment(args) = parsed;
        assert_eq!(args.input.to_str(), Some("a.csv"));
    }
}

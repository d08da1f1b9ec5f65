// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! CSV and JSON plumbing for the `trajseg` binary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use trajseg_core::{
    Diagnostics, ExecutionContext, SegError, SignalRecord, Trajectory, TrajectoryPoint,
    group_records,
};
use trajseg_offline::{SegmentedTrajectory, Segmenter, segment_batch};

pub const OUTPUT_HEADER: [&str; 9] = [
    "TripId",
    "TimeStep",
    "Speed",
    "Acceleration",
    "HeadingChange",
    "Latitude",
    "Longitude",
    "PMD",
    "StartOfSegment",
];

#[derive(Debug)]
pub enum CliError {
    Seg(SegError),
    Io {
        context: String,
        source: std::io::Error,
    },
    Csv {
        context: String,
        source: csv::Error,
    },
    Json {
        context: String,
        source: serde_json::Error,
    },
    InvalidInput(String),
}

impl CliError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Seg(err) => err.code(),
            Self::InvalidInput(_) => "invalid_input",
            Self::Io { .. } => "io_error",
            Self::Csv { .. } => "csv_error",
            Self::Json { .. } => "json_error",
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seg(err) => write!(f, "{err}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Csv { context, source } => write!(f, "{context}: {source}"),
            Self::Json { context, source } => write!(f, "{context}: {source}"),
            Self::InvalidInput(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Seg(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::InvalidInput(_) => None,
        }
    }
}

impl From<SegError> for CliError {
    fn from(value: SegError) -> Self {
        Self::Seg(value)
    }
}

/// One row of the signal file:
/// `TripId,TimeStep,ProbDissimilarity,Lat,Lng,Speed,Acceleration,Heading`.
#[derive(Debug, Deserialize)]
struct InputRow {
    #[serde(rename = "TripId")]
    trip_id: String,
    #[serde(rename = "TimeStep")]
    time_step: i64,
    #[serde(rename = "ProbDissimilarity")]
    signal: f64,
    #[serde(rename = "Lat")]
    lat: f64,
    #[serde(rename = "Lng")]
    lng: f64,
    #[serde(rename = "Speed")]
    speed: f64,
    #[serde(rename = "Acceleration")]
    acceleration: f64,
    #[serde(rename = "Heading")]
    heading: f64,
}

impl From<InputRow> for SignalRecord {
    fn from(row: InputRow) -> Self {
        Self {
            trajectory_id: row.trip_id,
            point: TrajectoryPoint {
                time_step: row.time_step,
                signal: row.signal,
                lat: row.lat,
                lng: row.lng,
                speed: row.speed,
                acceleration: row.acceleration,
                heading: row.heading,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    trip_id: &'a str,
    time_step: i64,
    speed: f64,
    acceleration: f64,
    heading_change: f64,
    latitude: f64,
    longitude: f64,
    pmd: f64,
    start_of_segment: u8,
}

/// Parses a signal CSV (with header) into ordered records.
pub fn read_signal_records<R: Read>(reader: R) -> Result<Vec<SignalRecord>, CliError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    reader
        .deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, row)| {
            row.map(SignalRecord::from)
                .map_err(|source| CliError::csv(format!("invalid input row {}", idx + 1), source))
        })
        .collect()
}

/// One trajectory of the input file: validated, or the reason it was rejected.
#[derive(Debug)]
pub struct InputTrajectory {
    pub id: String,
    pub n: usize,
    pub trajectory: Result<Trajectory, SegError>,
}

/// Segmentation outcome of one input trajectory.
#[derive(Debug)]
pub struct TrajectoryResult {
    pub id: String,
    pub n: usize,
    pub result: Result<SegmentedTrajectory, SegError>,
}

/// Parses a signal CSV and groups its rows into trajectories.
///
/// Malformed rows and interleaved trip ids fail the whole file; a trajectory
/// whose points do not validate is carried as a per-trajectory error.
pub fn read_trajectories<R: Read>(reader: R) -> Result<Vec<InputTrajectory>, CliError> {
    let records = read_signal_records(reader)?;
    let runs = group_records(records)?;
    Ok(runs
        .into_iter()
        .map(|run| {
            let id = run.trajectory_id.clone();
            let n = run.len();
            let trajectory = run.into_trajectory();
            if let Err(err) = &trajectory {
                tracing::warn!(trajectory = %id, code = err.code(), error = %err, "trajectory rejected");
            }
            InputTrajectory { id, n, trajectory }
        })
        .collect())
}

/// Segments every valid input trajectory and returns one result per input, in
/// input order. Rejected inputs keep their validation error.
pub fn segment_inputs(
    segmenter: &Segmenter,
    inputs: Vec<InputTrajectory>,
    ctx: &ExecutionContext<'_>,
    parallel: bool,
) -> Vec<TrajectoryResult> {
    let mut headers = Vec::with_capacity(inputs.len());
    let mut valid = Vec::with_capacity(inputs.len());
    for input in inputs {
        let rejected = match input.trajectory {
            Ok(trajectory) => {
                valid.push(trajectory);
                None
            }
            Err(err) => Some(err),
        };
        headers.push((input.id, input.n, rejected));
    }

    let mut segmented = segment_batch(segmenter, &valid, ctx, parallel).into_iter();
    headers
        .into_iter()
        .map(|(id, n, rejected)| {
            let result = match rejected {
                Some(err) => Err(err),
                None => segmented.next().unwrap_or_else(|| {
                    Err(SegError::invalid_input(format!(
                        "no segmentation result for trajectory '{id}'"
                    )))
                }),
            };
            TrajectoryResult { id, n, result }
        })
        .collect()
}

/// Wraps `writer` as a CSV sink and emits the output header.
pub fn output_writer<W: Write>(writer: W) -> Result<csv::Writer<W>, CliError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer
        .write_record(OUTPUT_HEADER)
        .map_err(|source| CliError::csv("failed to write output header", source))?;
    Ok(writer)
}

/// Writes one row per point of `segmented`, in time order.
pub fn write_segmented<W: Write>(
    writer: &mut csv::Writer<W>,
    segmented: &SegmentedTrajectory,
) -> Result<(), CliError> {
    for segmented_point in &segmented.points {
        let point = &segmented_point.point;
        writer
            .serialize(OutputRow {
                trip_id: &segmented.id,
                time_step: point.time_step,
                speed: point.speed,
                acceleration: point.acceleration,
                heading_change: point.heading,
                latitude: point.lat,
                longitude: point.lng,
                pmd: point.signal,
                start_of_segment: u8::from(segmented_point.segment_start),
            })
            .map_err(|source| {
                CliError::csv(
                    format!("failed to write rows for trajectory '{}'", segmented.id),
                    source,
                )
            })?;
    }
    Ok(())
}

/// Writes the header and the rows of every segmented trajectory to `sink`,
/// returning the flushed sink.
pub fn write_results<W: Write>(sink: W, results: &[TrajectoryResult]) -> Result<W, CliError> {
    let mut writer = output_writer(sink)?;
    for segmented in results.iter().filter_map(|entry| entry.result.as_ref().ok()) {
        write_segmented(&mut writer, segmented)?;
    }
    writer
        .into_inner()
        .map_err(|err| CliError::io("failed to flush segmented output", err.into_error()))
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrajectoryOutcome {
    Segmented { diagnostics: Box<Diagnostics> },
    Failed { code: String, message: String },
}

#[derive(Debug, Serialize)]
pub struct TrajectorySummary {
    pub id: String,
    pub n: usize,
    #[serde(flatten)]
    pub outcome: TrajectoryOutcome,
}

/// JSON summary of one `trajseg segment` run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub command: &'static str,
    pub input: String,
    pub trajectories: usize,
    pub segmented: usize,
    pub failed: usize,
    pub points: usize,
    pub results: Vec<TrajectorySummary>,
}

impl RunSummary {
    pub fn new(input: impl Into<String>, results: &[TrajectoryResult]) -> Self {
        let summaries: Vec<TrajectorySummary> = results
            .iter()
            .map(|entry| TrajectorySummary {
                id: entry.id.clone(),
                n: entry.n,
                outcome: match &entry.result {
                    Ok(segmented) => TrajectoryOutcome::Segmented {
                        diagnostics: Box::new(segmented.diagnostics.clone()),
                    },
                    Err(err) => TrajectoryOutcome::Failed {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    },
                },
            })
            .collect();
        let failed = results.iter().filter(|entry| entry.result.is_err()).count();

        Self {
            command: "segment",
            input: input.into(),
            trajectories: results.len(),
            segmented: results.len() - failed,
            failed,
            points: results.iter().map(|entry| entry.n).sum(),
            results: summaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        InputTrajectory, RunSummary, output_writer, read_trajectories, segment_inputs,
        write_results, write_segmented,
    };
    use trajseg_core::{Constraints, ExecutionContext, Trajectory};
    use trajseg_offline::{Segmenter, SegmenterConfig};

    const SAMPLE: &str = "\
TripId,TimeStep,ProbDissimilarity,Lat,Lng,Speed,Acceleration,Heading
T1,1,0,41.1,-8.6,10,0.5,0
T1,2,0,41.2,-8.7,11,0.5,5
T1,3,0,41.3,-8.8,12,0.5,10
T1,4,5,41.4,-8.9,13,0.5,15
T1,5,5,41.5,-9.0,14,0.5,20
T1,6,5,41.6,-9.1,15,0.5,25
T2,1,0.4,40.0,-8.0,3,0,0
";

    const MIXED: &str = "\
TripId,TimeStep,ProbDissimilarity,Lat,Lng,Speed,Acceleration,Heading
A,1,0.1,0,0,0,0,0
A,2,0.1,0,0,0,0,0
A,3,0.9,0,0,0,0,0
A,4,0.9,0,0,0,0,0
B,2,0.3,0,0,0,0,0
B,1,0.4,0,0,0,0,0
C,1,0.2,0,0,0,0,0
C,2,-0.5,0,0,0,0,0
D,1,0.3,0,0,0,0,0
D,2,0.3,0,0,0,0,0
D,3,0.6,0,0,0,0,0
";

    fn valid(inputs: &[InputTrajectory]) -> Vec<&Trajectory> {
        inputs
            .iter()
            .map(|input| input.trajectory.as_ref().expect("input should validate"))
            .collect()
    }

    fn segmenter(max_segments: usize) -> Segmenter {
        Segmenter::new(SegmenterConfig {
            max_segments,
            ..SegmenterConfig::default()
        })
        .expect("valid config")
    }

    #[test]
    fn reads_and_groups_trajectories() {
        let inputs = read_trajectories(SAMPLE.as_bytes()).expect("sample should parse");
        let trajectories = valid(&inputs);
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].id(), "T1");
        assert_eq!(trajectories[0].len(), 6);
        assert_eq!(trajectories[0].signal(), vec![0.0, 0.0, 0.0, 5.0, 5.0, 5.0]);
        assert_eq!(trajectories[0].points()[3].heading, 15.0);
        assert_eq!(trajectories[1].len(), 1);
    }

    #[test]
    fn rejects_interleaved_trip_ids() {
        let raw = "\
TripId,TimeStep,ProbDissimilarity,Lat,Lng,Speed,Acceleration,Heading
A,1,0.1,0,0,0,0,0
B,1,0.1,0,0,0,0,0
A,2,0.1,0,0,0,0,0
";
        let err = read_trajectories(raw.as_bytes()).expect_err("interleaving is invalid");
        assert_eq!(err.code(), "invalid_input");
        assert!(err.to_string().contains("non-contiguous"));
    }

    #[test]
    fn reports_malformed_rows() {
        let raw = "\
TripId,TimeStep,ProbDissimilarity,Lat,Lng,Speed,Acceleration,Heading
A,1,not-a-number,0,0,0,0,0
";
        let err = read_trajectories(raw.as_bytes()).expect_err("malformed signal");
        assert_eq!(err.code(), "csv_error");
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn invalid_trajectories_do_not_stop_valid_ones() {
        let inputs = read_trajectories(MIXED.as_bytes()).expect("file-level parse succeeds");
        let ids: Vec<&str> = inputs.iter().map(|input| input.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        assert!(inputs[0].trajectory.is_ok());
        assert!(inputs[1].trajectory.is_err());
        assert!(inputs[2].trajectory.is_err());
        assert!(inputs[3].trajectory.is_ok());

        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let results = segment_inputs(&segmenter(3), inputs, &ctx, false);
        assert_eq!(results.len(), 4);
        assert!(results[0].result.is_ok());
        assert!(results[3].result.is_ok());

        let bytes = write_results(Vec::new(), &results).expect("rows should write");
        let text = String::from_utf8(bytes).expect("output is utf-8");
        let trips: Vec<&str> = text
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').next())
            .collect();
        assert_eq!(trips, vec!["A", "A", "A", "A", "D", "D", "D"]);

        let summary = RunSummary::new("mixed.csv", &results);
        assert_eq!(summary.trajectories, 4);
        assert_eq!(summary.segmented, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.points, 11);

        let encoded = serde_json::to_value(&summary).expect("summary should serialize");
        assert_eq!(encoded["results"][1]["id"], "B");
        assert_eq!(encoded["results"][1]["status"], "failed");
        assert_eq!(encoded["results"][1]["code"], "invalid_input");
        assert_eq!(encoded["results"][2]["n"], 2);
        assert_eq!(encoded["results"][3]["status"], "segmented");
    }

    #[test]
    fn writes_original_column_layout() {
        let inputs = read_trajectories(SAMPLE.as_bytes()).expect("sample should parse");
        let trajectories = valid(&inputs);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let segmented = segmenter(3)
            .segment(trajectories[0], &ctx)
            .expect("segmentation should succeed");

        let mut writer = output_writer(Vec::new()).expect("header should write");
        write_segmented(&mut writer, &segmented).expect("rows should write");
        let bytes = writer.into_inner().expect("writer should flush");
        let text = String::from_utf8(bytes).expect("output is utf-8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "TripId,TimeStep,Speed,Acceleration,HeadingChange,Latitude,Longitude,PMD,StartOfSegment"
        );
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[1], "T1,1,10.0,0.5,0.0,41.1,-8.6,0.0,0");
        assert_eq!(lines[4], "T1,4,13.0,0.5,15.0,41.4,-8.9,5.0,1");
    }

    #[test]
    fn output_bytes_are_identical_across_runs_and_worker_modes() {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let segmenter = segmenter(5);
        let run = |parallel: bool| {
            let inputs = read_trajectories(SAMPLE.as_bytes()).expect("sample should parse");
            let results = segment_inputs(&segmenter, inputs, &ctx, parallel);
            write_results(Vec::new(), &results).expect("rows should write")
        };

        let first = run(false);
        assert_eq!(first, run(false));
        assert_eq!(first, run(true));
        assert_eq!(first, run(true));
        assert_eq!(String::from_utf8(first).expect("utf-8").lines().count(), 7);
    }

    #[test]
    fn summary_counts_failures() {
        let inputs = read_trajectories(SAMPLE.as_bytes()).expect("sample should parse");
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let results = segment_inputs(&segmenter(50), inputs, &ctx, false);

        let summary = RunSummary::new("sample.csv", &results);
        assert_eq!(summary.trajectories, 2);
        assert_eq!(summary.segmented, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.points, 7);

        let encoded = serde_json::to_value(&summary).expect("summary should serialize");
        assert_eq!(encoded["results"][0]["status"], "segmented");
        assert_eq!(encoded["results"][0]["diagnostics"]["selected_segments"], 2);
        assert_eq!(encoded["results"][1]["status"], "failed");
        assert_eq!(encoded["results"][1]["code"], "insufficient_data");
    }
}

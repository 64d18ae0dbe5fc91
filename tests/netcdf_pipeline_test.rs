use atmos_bench::benchmark::{compare_outputs, BenchmarkSuite};
use atmos_bench::config::{GeneratorConfig, RunConfig};
use atmos_bench::data_io::{DataReader, NetCDFReader};
use atmos_bench::fluxes::FluxMethod;
use atmos_bench::generator::generate;
use atmos_bench::isentropic::IsentropicMethod;
use atmos_bench::operations::{run_operation, Operation};
use atmos_bench::parallel::{ChunkShape, PipelineError};
use atmos_bench::slicing::SliceAxis;
use std::path::{Path, PathBuf};

fn generated_input(dir: &Path) -> PathBuf {
    let mut config = GeneratorConfig::new(30.0);
    config.directory = Some(dir.join("input"));
    config.nlev = 60;
    config.ntime = 6;
    config.seed = Some(5);
    generate(&config).unwrap()
}

fn run_config(input: &Path, out: &Path, chunks: ChunkShape) -> RunConfig {
    let mut config = RunConfig::new(input, chunks);
    config.output_dir = Some(out.to_path_buf());
    config
}

/// No variable in the file declares a fill value
fn assert_no_fill_values(path: &Path) {
    let file = netcdf::open(path).unwrap();
    for var in file.variables() {
        assert!(
            var.attribute("_FillValue").is_none(),
            "{} in {} has a _FillValue",
            var.name(),
            path.display()
        );
    }
}

#[test]
fn test_fluxes_chunked_file_matches_unchunked() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let out = dir.path().join("out");

    let op = Operation::Fluxes(FluxMethod::Broadcast);
    let whole = run_operation(&op, &run_config(&input, &out, ChunkShape::unchunked())).unwrap();
    let tiled = run_operation(&op, &run_config(&input, &out, ChunkShape::along_time(4))).unwrap();

    assert_eq!(whole.output, out.join("fluxes_broadcast0.nc"));
    assert_eq!(tiled.output, out.join("fluxes_broadcast4.nc"));
    assert_eq!(whole.stats.tiles, 1);
    assert_eq!(tiled.stats.tiles, 2);

    let fields = vec!["emf".to_string(), "ehf".to_string()];
    for cmp in compare_outputs(&whole.output, &tiled.output, &fields).unwrap() {
        assert!(cmp.passes(1e-5), "{}", cmp);
    }

    let reader = NetCDFReader::open(&whole.output).unwrap();
    let ehf = reader.read_field("ehf").unwrap();
    assert_eq!(ehf.shape(), &[6, 60, 6]);
    assert!(ehf.iter().all(|&x| x == 0.0));
    assert_no_fill_values(&whole.output);
    assert_no_fill_values(&tiled.output);
}

#[test]
fn test_isentropes_file_layout_and_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let out = dir.path().join("out");

    for method in [IsentropicMethod::Direct, IsentropicMethod::Transform] {
        let op = Operation::isentropes(method);
        let whole = run_operation(&op, &run_config(&input, &out, ChunkShape::unchunked())).unwrap();
        let chunks = ChunkShape { time: 1, lat: Some(4) };
        let tiled = run_operation(&op, &run_config(&input, &out, chunks)).unwrap();

        let reader = NetCDFReader::open(&whole.output).unwrap();
        let layout = reader.layout();
        assert_eq!(layout.dim_len("thlev"), Some(15));
        assert_eq!(layout.field_shape("p"), Some(vec![6, 15, 6, 12]));
        assert_eq!(layout.field_names(), vec!["p", "t", "u", "v"]);
        assert_no_fill_values(&tiled.output);

        for cmp in compare_outputs(&whole.output, &tiled.output, &[]).unwrap() {
            assert!(cmp.passes(1e-5), "{}: {}", method, cmp);
        }
    }
}

#[test]
fn test_direct_failure_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let out = dir.path().join("out");

    let op = Operation::Isentropes {
        method: IsentropicMethod::Direct,
        levels: vec![300.0, 5000.0],
    };
    let config = run_config(&input, &out, ChunkShape::along_time(2));
    assert!(run_operation(&op, &config).is_err());
    assert!(!out.join(op.output_name(&config.chunks)).exists());
}

#[test]
fn test_slice_rerun_produces_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let out = dir.path().join("out");

    let op = Operation::Slice {
        axis: SliceAxis::Time,
        count: 4,
    };
    let config = run_config(&input, &out, ChunkShape::along_time(3));
    let first = run_operation(&op, &config).unwrap();
    let layout_first = NetCDFReader::open(&first.output).unwrap().layout().clone();
    let second = run_operation(&op, &config).unwrap();
    let layout_second = NetCDFReader::open(&second.output).unwrap().layout().clone();

    assert_eq!(first.output, out.join("slice_time4_3.nc"));
    assert_eq!(layout_first.field_names(), layout_second.field_names());
    assert_eq!(layout_first.field_shape("u"), Some(vec![4, 60, 6, 12]));
    assert_eq!(layout_first.field_shape("u"), layout_second.field_shape("u"));
    assert_no_fill_values(&second.output);

    let source = NetCDFReader::open(&input).unwrap();
    for name in ["u", "v", "t"] {
        let sliced = NetCDFReader::open(&second.output).unwrap().read_field(name).unwrap();
        let full = source.read_field(name).unwrap();
        assert_eq!(sliced.as_slice().unwrap(), &full.as_slice().unwrap()[..sliced.len()]);
    }
}

#[test]
fn test_empty_slice_is_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let out = dir.path().join("out");

    for axis in [SliceAxis::Time, SliceAxis::Lat] {
        let op = Operation::Slice { axis, count: 0 };
        let config = run_config(&input, &out, ChunkShape::unchunked());
        let err = run_operation(&op, &config).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySlice(_)), "{}", err);
        assert!(!out.join(op.output_name(&config.chunks)).exists());
    }
}

#[test]
fn test_output_defaults_to_input_directory() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let config = RunConfig::new(&input, ChunkShape::unchunked());
    let outcome = run_operation(&Operation::Fluxes(FluxMethod::Rows), &config).unwrap();
    assert_eq!(outcome.output, dir.path().join("input").join("fluxes_rows0.nc"));
}

#[test]
fn test_benchmark_suite_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = generated_input(dir.path());
    let out = dir.path().join("bench");
    let mut config = run_config(&input, &out, ChunkShape::unchunked());
    config.threads = Some(2);

    let operations: Vec<Operation> = ["fluxes:rows", "slice:lat:2"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let suite = BenchmarkSuite::run_suite(&operations, &[0, 2], &config).unwrap();

    assert_eq!(suite.results.len(), 4);
    assert!(suite.results.iter().all(|r| r.output.exists()));
    assert!(suite.find_fastest_chunk("fluxes:rows").is_some());
    for result in &suite.results {
        match result.chunk {
            0 => assert!(result.max_diff.is_none()),
            _ => assert!(result.max_diff.unwrap() <= 1e-5, "{}", result.operation),
        }
    }
    let report = std::fs::read_to_string(out.join("benchmark_report.txt")).unwrap();
    assert!(report.contains("slice:lat:2"));
    assert!(report.contains("Threads: 2"));
}

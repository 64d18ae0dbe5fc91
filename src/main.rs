use atmos_bench::{
    benchmark::{compare_outputs, BenchmarkSuite},
    config::{GeneratorConfig, RunConfig},
    fluxes::FluxMethod,
    generator,
    isentropic::{parse_levels, IsentropicMethod},
    operations::{run_operation, Operation},
    slicing::SliceAxis,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use env_logger::Env;
use std::path::Path;

fn main() {
    let matches = build_cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match matches.subcommand() {
        Some(("generate", sub_matches)) => {
            if let Err(e) = run_generate(sub_matches) {
                eprintln!("Generation error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("fluxes", sub_matches)) => {
            if let Err(e) = run_fluxes(sub_matches) {
                eprintln!("Flux computation error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("isentropes", sub_matches)) => {
            if let Err(e) = run_isentropes(sub_matches) {
                eprintln!("Isentropic interpolation error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("slice", sub_matches)) => {
            if let Err(e) = run_slice(sub_matches) {
                eprintln!("Slicing error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("benchmark", sub_matches)) => {
            if let Err(e) = run_benchmark(sub_matches) {
                eprintln!("Benchmark error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("validate", sub_matches)) => {
            if let Err(e) = run_validation(sub_matches) {
                eprintln!("Validation error: {}", e);
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    }
}

fn run_generate(matches: &ArgMatches) -> Result<(), String> {
    let config = GeneratorConfig::from_matches(matches)?;
    let path = generator::generate(&config).map_err(|e| e.to_string())?;
    println!("Dataset written to: {}", path.display());
    Ok(())
}

fn run_fluxes(matches: &ArgMatches) -> Result<(), String> {
    let config = RunConfig::from_matches(matches, Some("chunk"))?;
    let method = parse_arg::<FluxMethod>(matches, "method")?;
    run_single(&Operation::Fluxes(method), &config)
}

fn run_isentropes(matches: &ArgMatches) -> Result<(), String> {
    let config = RunConfig::from_matches(matches, Some("chunk"))?;
    let method = parse_arg::<IsentropicMethod>(matches, "method")?;
    let operation = match matches.get_one::<String>("levels") {
        Some(list) => Operation::Isentropes {
            method,
            levels: parse_levels(list)?,
        },
        None => Operation::isentropes(method),
    };
    run_single(&operation, &config)
}

fn run_slice(matches: &ArgMatches) -> Result<(), String> {
    let config = RunConfig::from_matches(matches, Some("chunk"))?;
    let axis = parse_arg::<SliceAxis>(matches, "axis")?;
    let count = matches
        .get_one::<usize>("count")
        .copied()
        .ok_or_else(|| "Missing required argument: count".to_string())?;
    run_single(&Operation::Slice { axis, count }, &config)
}

fn run_single(operation: &Operation, config: &RunConfig) -> Result<(), String> {
    let outcome = run_operation(operation, config).map_err(|e| e.to_string())?;
    println!(
        "{}: {} tile(s) in {:.3}s",
        operation,
        outcome.stats.tiles,
        outcome.stats.total_time.as_secs_f64()
    );
    println!("Output written to: {}", outcome.output.display());
    Ok(())
}

fn run_benchmark(matches: &ArgMatches) -> Result<(), String> {
    let config = RunConfig::from_matches(matches, None)?;
    let operations = matches
        .get_one::<String>("operations")
        .map(|list| {
            list.split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<Operation>())
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    let chunks = matches
        .get_one::<String>("chunks")
        .map(|list| parse_usize_list(list))
        .transpose()?
        .unwrap_or_default();

    println!("Starting benchmark suite...");
    let suite = BenchmarkSuite::run_suite(&operations, &chunks, &config).map_err(|e| e.to_string())?;

    println!("\n=== Benchmark Results Summary ===");
    for result in &suite.results {
        println!(
            "{} chunk {}: {:.3}s ({} tiles)",
            result.operation,
            result.chunk,
            result.duration.as_secs_f64(),
            result.stats.tiles
        );
    }
    for operation in &operations {
        if let Some(chunk) = suite.find_fastest_chunk(&operation.to_string()) {
            println!("Fastest chunk for {}: {}", operation, chunk);
        }
    }
    println!("\nBenchmark completed! Results saved to: {}", config.output_dir().display());
    Ok(())
}

fn run_validation(matches: &ArgMatches) -> Result<(), String> {
    let reference = matches
        .get_one::<String>("reference")
        .ok_or_else(|| "Missing required argument: reference".to_string())?;
    let candidate = matches
        .get_one::<String>("candidate")
        .ok_or_else(|| "Missing required argument: candidate".to_string())?;
    let tolerance = matches.get_one::<f64>("tolerance").copied().unwrap_or(1e-5);
    let fields: Vec<String> = matches
        .get_one::<String>("fields")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    println!("Comparing {} against {} (tolerance {})...", candidate, reference, tolerance);
    let comparisons =
        compare_outputs(Path::new(reference), Path::new(candidate), &fields).map_err(|e| e.to_string())?;

    let mut failed = Vec::new();
    for cmp in &comparisons {
        let status = if cmp.passes(tolerance) { "OK" } else { "FAIL" };
        println!("  [{}] {}", status, cmp);
        if !cmp.passes(tolerance) {
            failed.push(cmp.field.clone());
        }
    }

    if failed.is_empty() {
        println!("All {} field(s) agree", comparisons.len());
        Ok(())
    } else {
        Err(format!("Fields outside tolerance: {}", failed.join(", ")))
    }
}

fn parse_arg<T: std::str::FromStr<Err = String>>(matches: &ArgMatches, id: &str) -> Result<T, String> {
    matches
        .get_one::<String>(id)
        .ok_or_else(|| format!("Missing required argument: {}", id))?
        .parse::<T>()
}

fn parse_usize_list(list: &str) -> Result<Vec<usize>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| format!("Invalid chunk parameter: {}", s)))
        .collect()
}

/// Arguments shared by every operation that reads an input dataset
fn with_run_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .help("Input NetCDF dataset")
                .required(true),
        )
        .arg(
            Arg::new("chunk-lat")
                .long("chunk-lat")
                .value_name("N")
                .help("Latitudes per tile when chunked (default: whole axis)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Output directory (default: the input file's directory)"),
        )
        .arg(
            Arg::new("prefetch")
                .long("prefetch")
                .value_name("N")
                .help("Tiles read ahead of the compute stage")
                .default_value("2")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .help("Output container: classic or netcdf4")
                .default_value("netcdf4"),
        )
}

fn chunk_arg() -> Arg {
    Arg::new("chunk")
        .value_name("CHUNK")
        .help("Time steps per tile; 0 processes whole arrays")
        .required(true)
        .value_parser(value_parser!(usize))
}

fn build_cli() -> Command {
    Command::new("atmos_bench")
        .version(clap::crate_version!())
        .about("Synthetic atmospheric datasets and chunked analysis benchmarks")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("threads")
                .short('j')
                .long("threads")
                .value_name("N")
                .help("Run on a dedicated pool of N worker threads")
                .global(true)
                .value_parser(value_parser!(usize)),
        )
        .subcommand(
            Command::new("generate")
                .about("Generate a synthetic (time, plev, lat, lon) dataset")
                .arg(
                    Arg::new("reso")
                        .value_name("DEGREES")
                        .help("Horizontal resolution in degrees")
                        .required(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .value_name("DIR")
                        .help("Output directory (default: <NLEV>lev)"),
                )
                .arg(
                    Arg::new("nlev")
                        .short('l')
                        .long("nlev")
                        .value_name("NLEV")
                        .help("Number of pressure levels")
                        .default_value("60")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("ntime")
                        .short('t')
                        .long("ntime")
                        .value_name("NTIME")
                        .help("Number of time steps")
                        .default_value("200")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_name("SEED")
                        .help("Seed for the wind noise (default: random)")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("chunk")
                        .long("chunk")
                        .value_name("N")
                        .help("Time steps generated per write; 0 writes everything at once")
                        .default_value("0")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output container: classic or netcdf4")
                        .default_value("classic"),
                ),
        )
        .subcommand(
            with_run_args(Command::new("fluxes").about("Zonal eddy momentum and heat fluxes"))
                .arg(chunk_arg())
                .arg(
                    Arg::new("method")
                        .long("method")
                        .value_name("METHOD")
                        .help("Array approach: broadcast or rows")
                        .default_value("broadcast"),
                ),
        )
        .subcommand(
            with_run_args(
                Command::new("isentropes").about("Interpolate p, t, u, v onto isentropic levels"),
            )
            .arg(chunk_arg())
            .arg(
                Arg::new("method")
                    .long("method")
                    .value_name("METHOD")
                    .help("Interpolation method: direct or transform")
                    .default_value("direct"),
            )
            .arg(
                Arg::new("levels")
                    .long("levels")
                    .value_name("K,K,..")
                    .help("Ascending potential temperature levels in K"),
            ),
        )
        .subcommand(
            with_run_args(Command::new("slice").about("Take a prefix along time or latitude"))
                .arg(
                    Arg::new("count")
                        .value_name("COUNT")
                        .help("Number of entries kept along the axis")
                        .required(true)
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("axis")
                        .long("axis")
                        .value_name("AXIS")
                        .help("Axis to slice: time or lat")
                        .default_value("time"),
                )
                .arg(
                    Arg::new("chunk")
                        .long("chunk")
                        .value_name("N")
                        .help("Time steps per tile; 0 processes whole arrays")
                        .default_value("0")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            with_run_args(
                Command::new("benchmark").about("Time operations across chunk parameters"),
            )
            .arg(
                Arg::new("operations")
                    .long("operations")
                    .value_name("OPS")
                    .help("Comma-separated operations, e.g. fluxes:rows,isentropes:transform,slice:lat:10")
                    .default_value("fluxes,isentropes,slice"),
            )
            .arg(
                Arg::new("chunks")
                    .long("chunks")
                    .value_name("CHUNKS")
                    .help("Comma-separated time chunk parameters to test")
                    .default_value("0,1,10"),
            ),
        )
        .subcommand(
            Command::new("validate")
                .about("Compare fields of two output files")
                .arg(
                    Arg::new("reference")
                        .long("reference")
                        .value_name("FILE")
                        .help("Reference NetCDF file")
                        .required(true),
                )
                .arg(
                    Arg::new("candidate")
                        .long("candidate")
                        .value_name("FILE")
                        .help("Candidate NetCDF file")
                        .required(true),
                )
                .arg(
                    Arg::new("fields")
                        .long("fields")
                        .value_name("FIELDS")
                        .help("Comma-separated fields to compare (default: all)"),
                )
                .arg(
                    Arg::new("tolerance")
                        .long("tolerance")
                        .value_name("FLOAT")
                        .help("Maximum scaled difference")
                        .default_value("1e-5")
                        .value_parser(value_parser!(f64)),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_chunk_list_parsing() {
        assert_eq!(parse_usize_list("0, 1,10").unwrap(), vec![0, 1, 10]);
        assert!(parse_usize_list("0,x").is_err());
    }

    #[test]
    fn test_fluxes_arguments() {
        let matches = build_cli()
            .try_get_matches_from(["atmos_bench", "fluxes", "data.nc", "10", "--method", "rows"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<usize>("chunk"), Some(&10));
        assert_eq!(parse_arg::<FluxMethod>(sub, "method").unwrap(), FluxMethod::Rows);
    }
}

use crate::data_io::NcFormat;
use crate::parallel::ChunkShape;
use clap::ArgMatches;
use std::path::{Path, PathBuf};

/// Default number of vertical levels for generated datasets
pub const DEFAULT_NLEV: usize = 60;
/// Default number of time steps for generated datasets
pub const DEFAULT_NTIME: usize = 200;
/// Default number of tiles buffered ahead of the compute stage
pub const DEFAULT_PREFETCH_DEPTH: usize = 2;

/// Physical and generator constants
#[derive(Clone, Debug, PartialEq)]
pub struct Constants {
    /// Reference pressure for potential temperature (hPa)
    pub p0: f64,
    /// Poisson constant R/cp for dry air
    pub kappa: f64,
    /// Upper bound of the generated pressure partition (hPa)
    pub pressure_surface: f64,
    /// Pressure used when a single vertical level is requested (hPa)
    pub single_level_pressure: f64,

    // Synthetic temperature: t_base + t_pressure_slope * p - t_polar_drop * |lat| / 90
    pub t_base: f64,
    pub t_pressure_slope: f64,
    pub t_polar_drop: f64,

    /// Time values are `k / time_step_divisor` days
    pub time_step_divisor: f64,

    /// Relative tolerance of the isentropic Newton solve
    pub newton_tolerance: f64,
    /// Iteration cap of the isentropic Newton solve
    pub newton_max_iterations: usize,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            p0: 1000.0,
            kappa: 0.285629847,
            pressure_surface: 1013.25,
            single_level_pressure: 500.0,

            t_base: 255.0,
            t_pressure_slope: 0.06,
            t_polar_drop: 60.0,

            time_step_divisor: 2.0,

            newton_tolerance: 1e-6,
            newton_max_iterations: 50,
        }
    }
}

/// Settings for one synthetic dataset
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Latitude and longitude spacing (degrees)
    pub resolution: f64,
    /// Output directory; `None` means `<nlev>lev`
    pub directory: Option<PathBuf>,
    pub nlev: usize,
    pub ntime: usize,
    /// Seed for the wind noise; drawn at random when absent
    pub seed: Option<u64>,
    /// Time steps generated and written per block; 0 writes everything at once
    pub chunk: usize,
    pub format: NcFormat,
    /// Size of a dedicated thread pool; `None` uses the global pool
    pub threads: Option<usize>,
    pub constants: Constants,
}

impl GeneratorConfig {
    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            directory: None,
            nlev: DEFAULT_NLEV,
            ntime: DEFAULT_NTIME,
            seed: None,
            chunk: 0,
            format: NcFormat::Classic,
            threads: None,
            constants: Constants::default(),
        }
    }

    /// Build from the `generate` subcommand arguments
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let resolution = required::<f64>(matches, "reso")?;
        let format = match matches.get_one::<String>("format") {
            Some(s) => s.parse::<NcFormat>()?,
            None => NcFormat::Classic,
        };

        let config = Self {
            resolution,
            directory: matches.get_one::<String>("dir").map(PathBuf::from),
            nlev: matches.get_one::<usize>("nlev").copied().unwrap_or(DEFAULT_NLEV),
            ntime: matches.get_one::<usize>("ntime").copied().unwrap_or(DEFAULT_NTIME),
            seed: matches.get_one::<u64>("seed").copied(),
            chunk: matches.get_one::<usize>("chunk").copied().unwrap_or(0),
            format,
            threads: matches.get_one::<usize>("threads").copied(),
            constants: Constants::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Directory the dataset is written into
    pub fn output_dir(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}lev", self.nlev)))
    }

    /// Validate generator parameters before any work starts
    pub fn validate(&self) -> Result<(), String> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(format!(
                "Resolution must be a positive number of degrees, got {}",
                self.resolution
            ));
        }
        if self.resolution > 180.0 {
            return Err(format!(
                "Resolution must not exceed 180 degrees, got {}",
                self.resolution
            ));
        }
        if self.nlev == 0 {
            return Err("Number of vertical levels must be at least 1".to_string());
        }
        if self.ntime == 0 {
            return Err("Number of time steps must be at least 1".to_string());
        }
        if self.threads == Some(0) {
            return Err("Thread count must be positive".to_string());
        }
        Ok(())
    }
}

/// Settings shared by every benchmark operation
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input: PathBuf,
    /// Output directory; `None` means the input file's directory
    pub output_dir: Option<PathBuf>,
    pub chunks: ChunkShape,
    /// Size of a dedicated thread pool; `None` uses the global pool
    pub threads: Option<usize>,
    pub prefetch_depth: usize,
    /// Container variant of the output file
    pub format: NcFormat,
}

impl RunConfig {
    pub fn new(input: impl AsRef<Path>, chunks: ChunkShape) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output_dir: None,
            chunks,
            threads: None,
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
            format: NcFormat::Netcdf4,
        }
    }

    /// Build from a benchmark subcommand; `chunk_id` names the time chunk
    /// argument, if the subcommand has one
    pub fn from_matches(matches: &ArgMatches, chunk_id: Option<&str>) -> Result<Self, String> {
        let input = required::<String>(matches, "input")?;
        let format = match matches.get_one::<String>("format") {
            Some(s) => s.parse::<NcFormat>()?,
            None => NcFormat::Netcdf4,
        };
        let chunks = ChunkShape {
            time: chunk_id
                .and_then(|id| matches.get_one::<usize>(id).copied())
                .unwrap_or(0),
            lat: matches.get_one::<usize>("chunk-lat").copied(),
        };

        let config = Self {
            input: PathBuf::from(input),
            output_dir: matches.get_one::<String>("output-dir").map(PathBuf::from),
            chunks,
            threads: matches.get_one::<usize>("threads").copied(),
            prefetch_depth: matches
                .get_one::<usize>("prefetch")
                .copied()
                .unwrap_or(DEFAULT_PREFETCH_DEPTH),
            format,
        };
        config.validate()?;
        Ok(config)
    }

    /// Directory outputs are written into
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !self.input.exists() {
            return Err(format!("Input file does not exist: {}", self.input.display()));
        }
        if !self.input.is_file() {
            return Err(format!("Input path is not a file: {}", self.input.display()));
        }
        if self.chunks.lat == Some(0) {
            return Err("Latitude chunk extent must be positive".to_string());
        }
        if self.threads == Some(0) {
            return Err("Thread count must be positive".to_string());
        }
        if self.prefetch_depth == 0 {
            return Err("Prefetch depth must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Fetch a required argument, reporting its id when absent
pub fn required<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    id: &str,
) -> Result<T, String> {
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| format!("Missing required argument: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_defaults() {
        let config = GeneratorConfig::new(2.0);
        assert!(config.validate().is_ok());
        assert_eq!(config.output_dir(), PathBuf::from("60lev"));
        assert_eq!(config.format, NcFormat::Classic);
    }

    #[test]
    fn test_generator_rejects_bad_arguments() {
        assert!(GeneratorConfig::new(0.0).validate().is_err());
        assert!(GeneratorConfig::new(-1.0).validate().is_err());
        assert!(GeneratorConfig::new(f64::NAN).validate().is_err());
        assert!(GeneratorConfig::new(200.0).validate().is_err());

        let mut config = GeneratorConfig::new(2.0);
        config.nlev = 0;
        assert!(config.validate().unwrap_err().contains("vertical levels"));

        let mut config = GeneratorConfig::new(2.0);
        config.ntime = 0;
        assert!(config.validate().unwrap_err().contains("time steps"));

        let mut config = GeneratorConfig::new(2.0);
        config.threads = Some(0);
        assert!(config.validate().unwrap_err().contains("Thread count"));
    }

    #[test]
    fn test_run_config_validation_nonexistent_input() {
        let config = RunConfig::new("nonexistent_input_12345.nc", ChunkShape::unchunked());
        assert!(config.validate().unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_run_config_output_dir_defaults_to_input_parent() {
        let config = RunConfig::new("data/60lev/dataN0090T200_3.nc", ChunkShape::along_time(10));
        assert_eq!(config.output_dir(), PathBuf::from("data/60lev"));

        let config = RunConfig::new("input.nc", ChunkShape::unchunked());
        assert_eq!(config.output_dir(), PathBuf::from(""));
    }

    #[test]
    fn test_run_config_rejects_zero_extents() {
        let mut config = RunConfig::new("Cargo.toml", ChunkShape::unchunked());
        assert!(config.validate().is_ok());
        config.threads = Some(0);
        assert!(config.validate().is_err());
        config.threads = None;
        config.chunks.lat = Some(0);
        assert!(config.validate().is_err());
    }
}

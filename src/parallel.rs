use crate::data_io::{DataReader, DataWriter, DatasetLayout, ReaderError, WriteError};
use crate::math::InterpolationError;
use crossbeam_channel::{self, Receiver, Sender};
use ndarray::ArrayD;
use std::ops::Range;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Read error: {0}")]
    Read(#[from] ReaderError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Slice along {0} must keep at least one entry")]
    EmptySlice(String),

    #[error("Failed to create thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Reader thread panicked")]
    ReaderPanicked,
}

/// Named field blocks travelling through the pipeline
pub type FieldBlocks = Vec<(String, ArrayD<f32>)>;

/// Chunk extents along the tiled axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkShape {
    /// Time steps per tile; 0 disables chunking entirely
    pub time: usize,
    /// Latitudes per tile when chunked; `None` keeps latitude whole
    pub lat: Option<usize>,
}

impl ChunkShape {
    pub fn unchunked() -> Self {
        Self { time: 0, lat: None }
    }

    pub fn along_time(time: usize) -> Self {
        Self { time, lat: None }
    }

    pub fn is_chunked(&self) -> bool {
        self.time > 0
    }
}

/// One partition of the (time, lat) domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub index: usize,
    pub time: Range<usize>,
    pub lat: Range<usize>,
}

impl Tile {
    /// Index ranges of a field over this tile. `time` and `lat` follow the
    /// tile, every other dimension is taken whole.
    pub fn ranges(&self, dims: &[String], layout: &DatasetLayout) -> Result<Vec<Range<usize>>, PipelineError> {
        dims.iter()
            .map(|dim| match dim.as_str() {
                "time" => Ok(self.time.clone()),
                "lat" => Ok(self.lat.clone()),
                other => layout
                    .dim_len(other)
                    .map(|n| 0..n)
                    .ok_or_else(|| PipelineError::InvalidInput(format!("unknown dimension {}", other))),
            })
            .collect()
    }

    /// Offsets of a field block produced for this tile
    pub fn offsets(&self, dims: &[String]) -> Vec<usize> {
        dims.iter()
            .map(|dim| match dim.as_str() {
                "time" => self.time.start,
                "lat" => self.lat.start,
                _ => 0,
            })
            .collect()
    }
}

/// Partition of the (time, lat) domain into tiles, time-major
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub tiles: Vec<Tile>,
}

impl ChunkPlan {
    pub fn new(ntime: usize, nlat: usize, chunks: &ChunkShape) -> Self {
        if ntime == 0 || nlat == 0 {
            return Self { tiles: Vec::new() };
        }
        if !chunks.is_chunked() {
            return Self {
                tiles: vec![Tile {
                    index: 0,
                    time: 0..ntime,
                    lat: 0..nlat,
                }],
            };
        }

        let lat_step = chunks.lat.unwrap_or(nlat).clamp(1, nlat);
        let mut tiles = Vec::new();
        for t0 in (0..ntime).step_by(chunks.time) {
            for j0 in (0..nlat).step_by(lat_step) {
                tiles.push(Tile {
                    index: tiles.len(),
                    time: t0..(t0 + chunks.time).min(ntime),
                    lat: j0..(j0 + lat_step).min(nlat),
                });
            }
        }
        Self { tiles }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// A transform applied tile by tile between a source and a sink
pub trait TileTransform: Sync {
    /// Short name used in logs and reports
    fn name(&self) -> String;

    /// Fields read from the source for every tile
    fn input_fields(&self, input: &DatasetLayout) -> Vec<String>;

    /// Layout of the output, derived from the input layout alone
    fn output_layout(&self, input: &DatasetLayout) -> Result<DatasetLayout, PipelineError>;

    /// Extents of the tiled (time, lat) domain
    fn domain(&self, input: &DatasetLayout) -> Result<(usize, usize), PipelineError> {
        match (input.dim_len("time"), input.dim_len("lat")) {
            (Some(nt), Some(ny)) => Ok((nt, ny)),
            _ => Err(PipelineError::InvalidInput(
                "input needs time and lat dimensions".to_string(),
            )),
        }
    }

    /// Whole-dataset checks run once before any output is produced
    fn check_source(
        &self,
        _source: &dyn DataReader,
        _plan: &ChunkPlan,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Compute output blocks for one tile
    fn apply(
        &self,
        input: &DatasetLayout,
        tile: &Tile,
        fields: FieldBlocks,
    ) -> Result<FieldBlocks, PipelineError>;
}

/// Timing breakdown of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub tiles: usize,
    pub read_time: Duration,
    pub compute_time: Duration,
    pub write_time: Duration,
    pub total_time: Duration,
}

/// Read the named fields of one tile
pub fn read_tile<R: DataReader + ?Sized>(
    source: &R,
    layout: &DatasetLayout,
    fields: &[String],
    tile: &Tile,
) -> Result<FieldBlocks, PipelineError> {
    let mut blocks = Vec::with_capacity(fields.len());
    for name in fields {
        let spec = layout
            .field(name)
            .ok_or_else(|| ReaderError::MissingVariable(name.clone()))?;
        let ranges = tile.ranges(&spec.dims, layout)?;
        blocks.push((name.clone(), source.read_block(name, &ranges)?));
    }
    Ok(blocks)
}

/// Write output blocks of one tile at their offsets
pub fn write_tile<W: DataWriter + ?Sized>(
    sink: &mut W,
    layout: &DatasetLayout,
    tile: &Tile,
    blocks: &FieldBlocks,
) -> Result<(), PipelineError> {
    for (name, block) in blocks {
        let spec = layout
            .field(name)
            .ok_or_else(|| WriteError::MissingVariable(name.clone()))?;
        sink.write_block(name, &tile.offsets(&spec.dims), block.view())?;
    }
    Ok(())
}

/// Run a transform from a source to a sink.
///
/// Unchunked, the whole domain is one tile read, transformed and written
/// on the calling thread. Chunked, a scoped reader thread opens its own
/// source and prefetches up to `prefetch_depth` tiles over a bounded
/// channel while the calling thread transforms and writes them in order.
/// Compute inside a tile runs on the current rayon pool. The finished sink
/// is handed back with the timings.
pub fn run_pipeline<R, F, T, W, C>(
    open_source: F,
    transform: &T,
    chunks: &ChunkShape,
    prefetch_depth: usize,
    create_sink: C,
) -> Result<(PipelineStats, W), PipelineError>
where
    R: DataReader,
    F: Fn() -> Result<R, ReaderError> + Sync,
    T: TileTransform + ?Sized,
    W: DataWriter,
    C: FnOnce(&DatasetLayout) -> Result<W, WriteError>,
{
    let start = Instant::now();
    let source = open_source()?;
    let input_layout = source.layout().clone();
    let fields = transform.input_fields(&input_layout);
    for name in &fields {
        if input_layout.field(name).is_none() {
            return Err(ReaderError::MissingVariable(name.clone()).into());
        }
    }

    let output_layout = transform.output_layout(&input_layout)?;
    let (ntime, nlat) = transform.domain(&input_layout)?;
    let plan = ChunkPlan::new(ntime, nlat, chunks);
    transform.check_source(&source, &plan)?;

    log::info!(
        "{}: {} tile(s) over time={} lat={} (chunks {:?})",
        transform.name(),
        plan.len(),
        ntime,
        nlat,
        chunks
    );

    let mut sink = create_sink(&output_layout)?;
    let mut stats = PipelineStats {
        tiles: plan.len(),
        ..PipelineStats::default()
    };

    if !chunks.is_chunked() {
        for tile in &plan.tiles {
            let t0 = Instant::now();
            let blocks = read_tile(&source, &input_layout, &fields, tile)?;
            let t1 = Instant::now();
            let out = transform.apply(&input_layout, tile, blocks)?;
            let t2 = Instant::now();
            write_tile(&mut sink, &output_layout, tile, &out)?;
            stats.read_time += t1 - t0;
            stats.compute_time += t2 - t1;
            stats.write_time += t2.elapsed();
        }
    } else {
        drop(source);
        let depth = prefetch_depth.max(1);
        let open_source = &open_source;
        let tiles = &plan.tiles;
        let layout = &input_layout;
        let field_names = &fields;

        let read_time = std::thread::scope(|scope| -> Result<Duration, PipelineError> {
            let (tx, rx): (Sender<(Tile, FieldBlocks)>, Receiver<(Tile, FieldBlocks)>) =
                crossbeam_channel::bounded(depth);

            let reader = scope.spawn(move || -> Result<Duration, PipelineError> {
                let source = open_source()?;
                let mut elapsed = Duration::ZERO;
                for tile in tiles {
                    let t0 = Instant::now();
                    let blocks = read_tile(&source, layout, field_names, tile)?;
                    elapsed += t0.elapsed();
                    log::debug!("Prefetched tile {} ({:?}, {:?})", tile.index, tile.time, tile.lat);
                    if tx.send((tile.clone(), blocks)).is_err() {
                        break;
                    }
                }
                Ok(elapsed)
            });

            let mut outcome: Result<(), PipelineError> = Ok(());
            for (tile, blocks) in rx.iter() {
                let t0 = Instant::now();
                let result = transform
                    .apply(layout, &tile, blocks)
                    .and_then(|out| {
                        let t1 = Instant::now();
                        stats.compute_time += t1 - t0;
                        write_tile(&mut sink, &output_layout, &tile, &out)?;
                        stats.write_time += t1.elapsed();
                        Ok(())
                    });
                if let Err(e) = result {
                    outcome = Err(e);
                    break;
                }
            }
            // Unblocks the reader if compute stopped early
            drop(rx);

            let read_outcome = reader.join().map_err(|_| PipelineError::ReaderPanicked)?;
            outcome?;
            read_outcome
        })?;
        stats.read_time = read_time;
    }

    sink.finish()?;
    stats.total_time = start.elapsed();
    log::info!(
        "{}: done in {:.3}s (read {:.3}s, compute {:.3}s, write {:.3}s)",
        transform.name(),
        stats.total_time.as_secs_f64(),
        stats.read_time.as_secs_f64(),
        stats.compute_time.as_secs_f64(),
        stats.write_time.as_secs_f64()
    );
    Ok((stats, sink))
}

/// Build a dedicated rayon pool
pub fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()
}

/// Run `op` on a dedicated pool of `threads` workers, or on the global pool
pub fn with_threads<OP, T, E>(threads: Option<usize>, op: OP) -> Result<T, E>
where
    OP: FnOnce() -> Result<T, E> + Send,
    T: Send,
    E: Send + From<rayon::ThreadPoolBuildError>,
{
    match threads {
        Some(n) => {
            let pool = build_pool(n)?;
            log::debug!("Using a dedicated pool of {} threads", n);
            pool.install(op)
        }
        None => op(),
    }
}

//! Background geometry regeneration with a render-thread swap point.
//!
//! A single worker thread turns [`GenerationRequest`]s into cube lattices in
//! submission order. Finished geometry comes back over a channel that the
//! render thread drains once per frame in [`RegenerationPipeline::poll`],
//! which is the only place the active [`CubeSet`] is replaced.

use std::fmt;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use cubefield_mesh::{GridFactor, LayoutStrategy, VertexAttributeSet, generate_cube_grid};
use cubefield_render::{
    CubeSet, ErrorHandler, ErrorType, GpuBufferApi, RenderError, StorageStrategy,
};
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;

const STATUS_BACKLOG: usize = 64;

/// A request to regenerate the lattice, optionally flipping a strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub grid_factor: GridFactor,
    pub toggle_vbos: bool,
    pub toggle_stride: bool,
}

impl GenerationRequest {
    /// Regenerate at `grid_factor` without changing strategies.
    pub fn resize(grid_factor: GridFactor) -> Self {
        Self {
            grid_factor,
            toggle_vbos: false,
            toggle_stride: false,
        }
    }
}

/// Geometry produced by the worker for one request.
#[derive(Debug)]
pub struct GeneratedGeometry {
    pub request: GenerationRequest,
    pub attributes: VertexAttributeSet,
}

/// Coarse pipeline state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing queued, nothing waiting to be swapped in.
    Idle,
    /// Requests are queued, running, or finished but not yet swapped in.
    Generating,
    /// The render thread is inside [`RegenerationPipeline::poll`] replacing
    /// the active cube set. Visible through a [`PipelineMonitor`] held by
    /// another thread or by the error handler.
    Swapping,
}

/// Shareable, read-only view of a pipeline's progress.
#[derive(Clone, Debug)]
pub struct PipelineMonitor {
    in_flight: Arc<AtomicUsize>,
    swapping: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    results: crossbeam_channel::Receiver<GeneratedGeometry>,
}

impl PipelineMonitor {
    pub fn state(&self) -> PipelineState {
        if self.swapping.load(Ordering::Acquire) {
            PipelineState::Swapping
        } else if self.in_flight.load(Ordering::Acquire) > 0 || !self.results.is_empty() {
            PipelineState::Generating
        } else {
            PipelineState::Idle
        }
    }

    /// Requests queued or running on the worker.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Requests the worker discarded because their geometry could not be
    /// generated.
    pub fn dropped_requests(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }
}

/// Storage and layout in use after a successful swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyStatus {
    pub grid_factor: GridFactor,
    pub storage: StorageStrategy,
    pub layout: LayoutStrategy,
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{n}x{n}x{n} cubes, VBOs {}, stride {}",
            if self.storage.uses_vbos() { "on" } else { "off" },
            if self.layout.uses_stride() { "on" } else { "off" },
            n = self.grid_factor,
        )
    }
}

/// Counters for completed swaps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapStats {
    pub succeeded: u64,
    pub failed: u64,
}

/// Single-worker regeneration queue owning the active cube set.
pub struct RegenerationPipeline {
    task_sender: Option<crossbeam_channel::Sender<GenerationRequest>>,
    result_receiver: crossbeam_channel::Receiver<GeneratedGeometry>,
    worker: Option<JoinHandle<()>>,
    monitor: PipelineMonitor,
    coalesce: bool,
    storage: StorageStrategy,
    layout: LayoutStrategy,
    actual_grid_factor: Option<GridFactor>,
    active: Option<CubeSet>,
    error_handler: Arc<dyn ErrorHandler>,
    status_sender: crossbeam_channel::Sender<StrategyStatus>,
    status_receiver: crossbeam_channel::Receiver<StrategyStatus>,
    stats: SwapStats,
}

impl RegenerationPipeline {
    /// Spawn the worker thread.
    ///
    /// `storage` and `layout` are the choices the first request toggles
    /// against. With `coalesce` set, all results drained in one poll are
    /// folded into a single swap.
    pub fn new(
        storage: StorageStrategy,
        layout: LayoutStrategy,
        coalesce: bool,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self, PipelineError> {
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<GenerationRequest>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let (status_tx, status_rx) = crossbeam_channel::bounded(STATUS_BACKLOG);
        let monitor = PipelineMonitor {
            in_flight: Arc::new(AtomicUsize::new(0)),
            swapping: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            results: result_rx.clone(),
        };

        let flight = Arc::clone(&monitor.in_flight);
        let dropped = Arc::clone(&monitor.dropped);
        let worker = std::thread::Builder::new()
            .name("cubefield-generator".to_string())
            .spawn(move || {
                while let Ok(request) = task_rx.recv() {
                    let grid_factor = request.grid_factor;
                    match panic::catch_unwind(move || generate_cube_grid(grid_factor)) {
                        Ok(Ok(attributes)) => {
                            debug!(%grid_factor, "Generated cube lattice");
                            let _ = result_tx.send(GeneratedGeometry {
                                request,
                                attributes,
                            });
                        }
                        Ok(Err(e)) => {
                            error!(%grid_factor, "Dropping request: {e}");
                            dropped.fetch_add(1, Ordering::AcqRel);
                        }
                        Err(_) => {
                            error!(%grid_factor, "Generation panicked, dropping request");
                            dropped.fetch_add(1, Ordering::AcqRel);
                        }
                    }
                    // Decrement only after the result is queued, so the
                    // pipeline never reads as idle with a result in transit.
                    flight.fetch_sub(1, Ordering::AcqRel);
                }
                debug!("Generator thread exiting");
            })
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            task_sender: Some(task_tx),
            result_receiver: result_rx,
            worker: Some(worker),
            monitor,
            coalesce,
            storage,
            layout,
            actual_grid_factor: None,
            active: None,
            error_handler,
            status_sender: status_tx,
            status_receiver: status_rx,
            stats: SwapStats::default(),
        })
    }

    /// Queue a request. Returns `false` once the pipeline has shut down.
    pub fn submit(&self, request: GenerationRequest) -> bool {
        let Some(sender) = &self.task_sender else {
            return false;
        };
        let in_flight = &self.monitor.in_flight;
        in_flight.fetch_add(1, Ordering::AcqRel);
        if sender.send(request).is_err() {
            in_flight.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        debug!(?request, "Queued generation request");
        true
    }

    /// Always `Idle` or `Generating` from the owning thread, since
    /// `Swapping` only holds inside [`poll`](Self::poll).
    pub fn state(&self) -> PipelineState {
        self.monitor.state()
    }

    /// Requests queued or running on the worker.
    pub fn in_flight_count(&self) -> usize {
        self.monitor.in_flight_count()
    }

    /// A handle other threads can use to watch progress.
    pub fn monitor(&self) -> PipelineMonitor {
        self.monitor.clone()
    }

    /// Swap in every finished generation. Call once per frame on the render
    /// thread, before drawing. Returns the number of successful swaps.
    pub fn poll(&mut self, gpu: &mut dyn GpuBufferApi) -> usize {
        let results: Vec<GeneratedGeometry> = self.result_receiver.try_iter().collect();
        if results.is_empty() {
            return 0;
        }

        self.monitor.swapping.store(true, Ordering::Release);
        let swapped = if self.coalesce {
            let toggle_vbos = results.iter().filter(|g| g.request.toggle_vbos).count() % 2 == 1;
            let toggle_stride =
                results.iter().filter(|g| g.request.toggle_stride).count() % 2 == 1;
            let drained = results.len();
            let newest = results.into_iter().last();
            if drained > 1 {
                debug!(drained, "Coalescing finished generations into one swap");
            }
            newest.map_or(0, |geometry| {
                usize::from(self.swap(gpu, &geometry.attributes, toggle_vbos, toggle_stride))
            })
        } else {
            let mut swapped = 0;
            for geometry in results {
                let request = geometry.request;
                if self.swap(
                    gpu,
                    &geometry.attributes,
                    request.toggle_vbos,
                    request.toggle_stride,
                ) {
                    swapped += 1;
                }
            }
            swapped
        };
        self.monitor.swapping.store(false, Ordering::Release);
        swapped
    }

    fn swap(
        &mut self,
        gpu: &mut dyn GpuBufferApi,
        attributes: &VertexAttributeSet,
        toggle_vbos: bool,
        toggle_stride: bool,
    ) -> bool {
        if let Some(mut previous) = self.active.take() {
            previous.release(gpu);
        }

        let storage = if toggle_vbos {
            self.storage.toggled()
        } else {
            self.storage
        };
        let layout = if toggle_stride {
            self.layout.toggled()
        } else {
            self.layout
        };

        match CubeSet::build(gpu, attributes, layout, storage) {
            Ok(cubes) => {
                self.active = Some(cubes);
                self.storage = storage;
                self.layout = layout;
                self.actual_grid_factor = Some(attributes.grid_factor());
                self.stats.succeeded += 1;

                let status = StrategyStatus {
                    grid_factor: attributes.grid_factor(),
                    storage,
                    layout,
                };
                info!("{status}");
                // Unread updates are dropped once the backlog is full.
                let _ = self.status_sender.try_send(status);
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                if let RenderError::BufferCreation { .. } = e {
                    self.error_handler
                        .handle_error(ErrorType::BufferCreationError, &e.to_string());
                }
                if e.is_out_of_memory() {
                    error!("Out of memory building cube set: {e}");
                } else {
                    error!("Failed to build cube set: {e}");
                }
                false
            }
        }
    }

    /// Draw the active cube set, if any.
    pub fn render(&self, gpu: &mut dyn GpuBufferApi) {
        if let Some(cubes) = &self.active {
            cubes.render(gpu);
        }
    }

    pub fn active(&self) -> Option<&CubeSet> {
        self.active.as_ref()
    }

    /// Storage choice of the last successful swap.
    pub fn storage(&self) -> StorageStrategy {
        self.storage
    }

    /// Layout choice of the last successful swap.
    pub fn layout(&self) -> LayoutStrategy {
        self.layout
    }

    /// Grid factor of the last successful swap.
    pub fn actual_grid_factor(&self) -> Option<GridFactor> {
        self.actual_grid_factor
    }

    pub fn coalesces(&self) -> bool {
        self.coalesce
    }

    /// Takes effect from the next poll.
    pub fn set_coalescing(&mut self, coalesce: bool) {
        self.coalesce = coalesce;
    }

    pub fn stats(&self) -> SwapStats {
        self.stats
    }

    /// Receiver of [`StrategyStatus`] updates, one per successful swap. At
    /// most 64 unread updates are kept; later ones are dropped until drained.
    pub fn status_updates(&self) -> crossbeam_channel::Receiver<StrategyStatus> {
        self.status_receiver.clone()
    }

    /// Release the active cube set. Must run on the render thread before the
    /// GPU context goes away.
    pub fn release_active(&mut self, gpu: &mut dyn GpuBufferApi) {
        if let Some(mut cubes) = self.active.take() {
            cubes.release(gpu);
        }
    }

    /// Close the task queue and join the worker. Queued requests still run.
    pub fn shutdown(&mut self) {
        self.task_sender.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("Generator thread panicked");
        }
    }
}

impl Drop for RegenerationPipeline {
    fn drop(&mut self) {
        self.shutdown();
        if self.active.as_ref().is_some_and(|c| !c.buffer_handles().is_empty()) {
            warn!("Dropping pipeline with GPU buffers still allocated");
        }
    }
}

//! Background footprint loading with platform-specific implementations

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;

use super::osm::{BuildingCandidate, BuildingId, OsmData, resolve_buildings};
use crate::map::rect::GeoRect;

/// Supplies the OSM graph for an area. Implementations do the network or
/// disk work; they are called off the main thread on native targets.
pub trait FootprintSource: Send + Sync {
    fn fetch(&self, area: &GeoRect) -> anyhow::Result<OsmData>;
}

/// A fixed extract, returned for every area
impl FootprintSource for OsmData {
    fn fetch(&self, _area: &GeoRect) -> anyhow::Result<OsmData> {
        Ok(self.clone())
    }
}

/// Extract stored as JSON on disk
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FootprintSource for JsonFileSource {
    fn fetch(&self, _area: &GeoRect) -> anyhow::Result<OsmData> {
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("invalid OSM data in {}", self.path.display()))
    }
}

/// Resolved buildings waiting to be baked, shared between the loader and
/// the manager
#[derive(Clone, Default)]
pub struct PendingQueue(Arc<Mutex<VecDeque<BuildingCandidate>>>);

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BuildingCandidate>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_all(&self, candidates: impl IntoIterator<Item = BuildingCandidate>) {
        self.lock().extend(candidates);
    }

    pub fn pop(&self) -> Option<BuildingCandidate> {
        self.lock().pop_front()
    }

    pub fn contains(&self, id: &BuildingId) -> bool {
        self.lock().iter().any(|c| &c.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Outcome of one area request
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Loaded {
        request: u64,
        buildings: usize,
        /// Buildings seen without all of their nodes or member ways
        unresolved: Vec<BuildingId>,
    },
    Failed { request: u64, error: String },
}

impl LoadResult {
    pub fn request(&self) -> u64 {
        match self {
            LoadResult::Loaded { request, .. } | LoadResult::Failed { request, .. } => *request,
        }
    }
}

#[derive(Debug, Clone)]
struct AreaRequest {
    id: u64,
    area: GeoRect,
}

fn load_area(
    source: &dyn FootprintSource,
    request: &AreaRequest,
    queue: &PendingQueue,
) -> LoadResult {
    match source.fetch(&request.area) {
        Ok(data) => {
            let found = resolve_buildings(&data);
            let buildings = found.buildings.len();
            queue.push_all(found.buildings);
            log::debug!(
                "Request {} resolved {} buildings, {} incomplete",
                request.id,
                buildings,
                found.unresolved.len()
            );
            LoadResult::Loaded { request: request.id, buildings, unresolved: found.unresolved }
        }
        Err(e) => {
            log::warn!("Building request {} failed: {:#}", request.id, e);
            LoadResult::Failed { request: request.id, error: format!("{e:#}") }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
type ResultReceiver = std::sync::mpsc::Receiver<LoadResult>;
#[cfg(target_arch = "wasm32")]
type ResultReceiver = VecDeque<LoadResult>;

/// Fetches areas from a `FootprintSource` and feeds the pending queue
pub struct BuildingLoader {
    queue: PendingQueue,
    result_rx: ResultReceiver,
    #[cfg(not(target_arch = "wasm32"))]
    request_tx: std::sync::mpsc::Sender<AreaRequest>,
    #[cfg(target_arch = "wasm32")]
    source: Arc<dyn FootprintSource>,
    pending: HashSet<u64>,
    next_request: u64,
    #[cfg(not(target_arch = "wasm32"))]
    _worker_handle: Option<std::thread::JoinHandle<()>>,
}

impl BuildingLoader {
    pub fn new(source: Arc<dyn FootprintSource>, queue: PendingQueue) -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let (request_tx, request_rx) = std::sync::mpsc::channel::<AreaRequest>();
            let (result_tx, result_rx) = std::sync::mpsc::channel::<LoadResult>();

            let _worker_handle = {
                let queue = queue.clone();
                Some(std::thread::spawn(move || {
                    Self::worker_thread(source, request_rx, result_tx, queue);
                }))
            };

            Self {
                queue,
                result_rx,
                request_tx,
                pending: HashSet::new(),
                next_request: 0,
                _worker_handle,
            }
        }

        // no threads: requests are served inline
        #[cfg(target_arch = "wasm32")]
        {
            Self {
                queue,
                result_rx: VecDeque::new(),
                source,
                pending: HashSet::new(),
                next_request: 0,
            }
        }
    }

    /// Queue a fetch of `area`, returning its request id
    pub fn request(&mut self, area: GeoRect) -> u64 {
        let request = AreaRequest { id: self.next_request, area };
        self.next_request += 1;

        #[cfg(not(target_arch = "wasm32"))]
        {
            let id = request.id;
            if self.request_tx.send(request).is_ok() {
                self.pending.insert(id);
            } else {
                log::warn!("Building loader worker is gone, dropping request {}", id);
            }
            id
        }

        #[cfg(target_arch = "wasm32")]
        {
            self.pending.insert(request.id);
            let result = load_area(self.source.as_ref(), &request, &self.queue);
            self.result_rx.push_back(result);
            request.id
        }
    }

    /// Poll for finished requests
    pub fn poll(&mut self) -> Option<LoadResult> {
        #[cfg(not(target_arch = "wasm32"))]
        let result = self.result_rx.try_recv().ok();
        #[cfg(target_arch = "wasm32")]
        let result = self.result_rx.pop_front();

        if let Some(result) = &result {
            self.pending.remove(&result.request());
        }
        result
    }

    pub fn is_loading(&self, request: u64) -> bool {
        self.pending.contains(&request)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn worker_thread(
        source: Arc<dyn FootprintSource>,
        request_rx: std::sync::mpsc::Receiver<AreaRequest>,
        result_tx: std::sync::mpsc::Sender<LoadResult>,
        queue: PendingQueue,
    ) {
        while let Ok(request) = request_rx.recv() {
            let result = load_area(source.as_ref(), &request, &queue);
            if result_tx.send(result).is_err() {
                break; // loader dropped
            }
        }
    }
}

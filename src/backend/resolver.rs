//! Backend resolution: decide which runtime to use and load it, degrading
//! tier by tier until something works.
//!
//! ```text
//! Unresolved ──▶ Resolving ──▶ Loaded(kind)
//!                    │
//!                    └──────▶ Exhausted (placeholder handle)
//! ```
//!
//! Candidates come from, in order of precedence: an explicit backend
//! override (pins a single candidate), the model path's extension, and
//! finally probing the platform and the runtimes against the well-known
//! model locations. Every candidate load failure is logged and skipped;
//! only a pinned override surfaces its failure to the caller.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::handle::ModelHandle;
use crate::backend::{
    AcceleratorSdk, BackendAvailability, BackendKind, KernelDriverSdk, SystemAvailability,
};
use crate::config::{EchoConfig, SearchConfig};
use crate::deploy::DeploymentManifest;
use crate::error::{EchoError, Result};
use crate::platform::HostInfo;

/// What the caller knows about the model it wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Explicit backend; pins the only candidate.
    pub backend: Option<BackendKind>,
    pub model_path: Option<PathBuf>,
}

impl ResolveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }
}

/// A tentative `(kind, path)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub kind: BackendKind,
    pub path: PathBuf,
}

impl Candidate {
    fn new(kind: BackendKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Ordered candidates for one resolution; earlier entries are preferred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateList {
    pub candidates: Vec<Candidate>,
    /// Set when an explicit override produced the list.
    pub pinned: bool,
}

impl CandidateList {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.candidates.iter().map(|c| c.kind).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Loaded(BackendKind),
    /// No candidate loaded; the handle is the placeholder.
    Exhausted,
}

/// A candidate that was tried and failed.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    pub candidate: Candidate,
    pub reason: String,
}

/// Outcome of a resolution.
#[derive(Debug)]
pub struct Resolution {
    pub handle: ModelHandle,
    pub state: ResolutionState,
    pub candidates: CandidateList,
    pub failures: Vec<CandidateFailure>,
}

impl Resolution {
    pub fn kind(&self) -> BackendKind {
        self.handle.kind()
    }
}

/// Chooses and loads one backend from the available possibilities.
pub struct BackendResolver {
    host: HostInfo,
    availability: Arc<dyn BackendAvailability>,
    accelerator: Arc<dyn AcceleratorSdk>,
    search: SearchConfig,
    dummy_output_len: usize,
}

impl BackendResolver {
    /// Resolver for the current host, the compiled-in runtimes and the
    /// kernel driver SDK.
    pub fn from_config(config: &EchoConfig) -> Self {
        let accelerator: Arc<dyn AcceleratorSdk> =
            Arc::new(KernelDriverSdk::from_config(&config.accelerator));
        Self {
            host: HostInfo::current(),
            availability: Arc::new(SystemAvailability::new(accelerator.clone())),
            accelerator,
            search: config.search.clone(),
            dummy_output_len: config.fallback.dummy_output_len,
        }
    }

    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    pub fn with_availability(mut self, availability: impl BackendAvailability + 'static) -> Self {
        self.availability = Arc::new(availability);
        self
    }

    /// Replace the accelerator SDK. Availability keeps its own view; use
    /// [`with_availability`](Self::with_availability) to change what the
    /// probe reports.
    pub fn with_accelerator_sdk(mut self, sdk: impl AcceleratorSdk + 'static) -> Self {
        self.accelerator = Arc::new(sdk);
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Derive the ordered candidate list for `request`. Pure apart from
    /// filesystem lookups; identical inputs give identical lists.
    pub fn candidates(&self, request: &ResolveRequest) -> CandidateList {
        let mut list = CandidateList::default();

        // 1. Explicit override
        if let Some(kind) = request.backend {
            list.pinned = true;
            if kind == BackendKind::Dummy {
                return list;
            }
            let path = request
                .model_path
                .clone()
                .or_else(|| self.discover(kind));
            if let Some(path) = path {
                list.push(Candidate::new(kind, path));
            }
            return list;
        }

        // 2. Extension hint
        if let Some(path) = &request.model_path {
            match BackendKind::from_extension(path) {
                Some(kind) => list.push(Candidate::new(kind, path)),
                None => {
                    debug!(
                        path = %path.display(),
                        "Unrecognized model extension, trying available CPU runtimes"
                    );
                    for kind in BackendKind::CPU_PREFERENCE {
                        if self.availability.probe(kind) {
                            list.push(Candidate::new(kind, path));
                        }
                    }
                }
            }
            return list;
        }

        // 3. Platform + availability probing
        if !self.host.supports_accelerator() {
            debug!(
                os = %self.host.os,
                arch = %self.host.arch,
                "Accelerator not supported on this host"
            );
        } else if !self.availability.probe(BackendKind::Accelerator) {
            debug!("Accelerator SDK not available");
        } else if let Some(path) = self.discover(BackendKind::Accelerator) {
            list.push(Candidate::new(BackendKind::Accelerator, path));
        }
        for kind in BackendKind::CPU_PREFERENCE {
            if !self.availability.probe(kind) {
                continue;
            }
            if let Some(path) = self.discover(kind) {
                list.push(Candidate::new(kind, path));
            }
        }
        list
    }

    /// Resolve `request` to a loaded handle.
    ///
    /// Only fails for a pinned override: the override's load failure, or no
    /// model found for it. Otherwise an exhausted cascade yields the
    /// placeholder handle.
    pub fn resolve(&self, request: &ResolveRequest) -> Result<Resolution> {
        let mut state = ResolutionState::Unresolved;
        debug!(?state, ?request, "Starting backend resolution");

        let candidates = self.candidates(request);
        state = ResolutionState::Resolving;
        info!(
            ?state,
            candidates = ?candidates.kinds(),
            pinned = candidates.pinned,
            "Backend candidates derived"
        );

        if request.backend == Some(BackendKind::Dummy) {
            info!("Dummy backend requested explicitly");
            return Ok(Resolution {
                handle: ModelHandle::dummy(self.dummy_output_len),
                state: ResolutionState::Loaded(BackendKind::Dummy),
                candidates,
                failures: Vec::new(),
            });
        }

        if candidates.pinned && candidates.is_empty() {
            if let Some(kind) = request.backend {
                return Err(EchoError::NoModelFound { kind });
            }
        }

        let mut failures = Vec::new();
        let ordered = candidates.candidates.clone();
        for candidate in &ordered {
            match self.load(candidate) {
                Ok(handle) => {
                    state = ResolutionState::Loaded(candidate.kind);
                    info!(
                        ?state,
                        backend = %candidate.kind,
                        path = %candidate.path.display(),
                        "Backend loaded"
                    );
                    return Ok(Resolution {
                        handle,
                        state,
                        candidates,
                        failures,
                    });
                }
                Err(e) if candidates.pinned => {
                    warn!(
                        backend = %candidate.kind,
                        error = %e,
                        "Requested backend failed to load"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        backend = %candidate.kind,
                        path = %candidate.path.display(),
                        error = %e,
                        "Candidate failed to load, trying next"
                    );
                    failures.push(CandidateFailure {
                        candidate: candidate.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        state = ResolutionState::Exhausted;
        warn!(
            ?state,
            tried = failures.len(),
            "No model could be loaded, using dummy inference"
        );
        Ok(Resolution {
            handle: ModelHandle::dummy(self.dummy_output_len),
            state,
            candidates,
            failures,
        })
    }

    /// Construct the runtime object for one candidate. Panics inside a
    /// runtime are contained and reported as load failures.
    fn load(&self, candidate: &Candidate) -> Result<ModelHandle> {
        let kind = candidate.kind;
        let path = candidate.path.as_path();

        if !self.availability.probe(kind) {
            return Err(EchoError::load_failure(kind, path, "runtime not available"));
        }
        if !path.is_file() {
            return Err(EchoError::load_failure(kind, path, "model file not found"));
        }

        panic::catch_unwind(AssertUnwindSafe(|| self.construct(kind, path))).unwrap_or_else(
            |payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "runtime panicked".to_string());
                Err(EchoError::load_failure(kind, path, reason))
            },
        )
    }

    fn construct(&self, kind: BackendKind, path: &Path) -> Result<ModelHandle> {
        match kind {
            BackendKind::Accelerator => {
                let model = self.accelerator.load(path)?;
                Ok(ModelHandle::accelerator(model, path))
            }
            #[cfg(feature = "onnx")]
            BackendKind::Onnx => {
                let plan = crate::backend::tract::load_onnx(path)
                    .map_err(|e| EchoError::load_failure(kind, path, format!("{e:#}")))?;
                Ok(ModelHandle::onnx(plan, path))
            }
            #[cfg(feature = "tflite")]
            BackendKind::Tflite => {
                let plan = crate::backend::tract::load_tflite(path)
                    .map_err(|e| EchoError::load_failure(kind, path, format!("{e:#}")))?;
                Ok(ModelHandle::tflite(plan, path))
            }
            #[allow(unreachable_patterns)]
            BackendKind::Onnx | BackendKind::Tflite => Err(EchoError::load_failure(
                kind,
                path,
                "runtime not compiled into this build",
            )),
            BackendKind::Dummy => Ok(ModelHandle::dummy(self.dummy_output_len)),
        }
    }

    /// First existing model of `kind` in the well-known locations.
    fn discover(&self, kind: BackendKind) -> Option<PathBuf> {
        if kind == BackendKind::Accelerator {
            if let Some(path) = self.search.accelerator_models.iter().find(|p| p.is_file()) {
                return Some(path.clone());
            }
        }

        match DeploymentManifest::load(&self.search.manifest) {
            Ok(manifest) => {
                if let Some(record) = manifest.records_for(kind).find(|r| r.path.is_file()) {
                    debug!(id = %record.id, backend = %kind, "Model found in deployment manifest");
                    return Some(record.path.clone());
                }
            }
            Err(e) => warn!(error = %e, "Ignoring unreadable deployment manifest"),
        }

        self.search
            .model_dirs
            .iter()
            .find_map(|dir| first_model_in(dir, kind))
    }
}

/// Lexicographically first file in `dir` carrying one of `kind`'s extensions.
fn first_model_in(dir: &Path, kind: BackendKind) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && BackendKind::from_extension(path) == Some(kind))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

//! Resolution cascade against stub availability and a stub accelerator SDK.

use std::fs;
use std::path::{Path, PathBuf};

use echo_infer::backend::{
    AcceleratorDevice, AcceleratorModel, AcceleratorSdk, BackendKind, BackendResolver,
    FixedAvailability, ResolutionState, ResolveRequest,
};
use echo_infer::config::{EchoConfig, SearchConfig};
use echo_infer::error::{EchoError, Result};
use echo_infer::platform::HostInfo;
use echo_infer::tensor::Tensor;
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum Behavior {
    Load,
    Fail,
    Panic,
}

struct StubSdk(Behavior);

struct Negate;

impl AcceleratorModel for Negate {
    fn predict(&mut self, input: &Tensor) -> Result<Tensor> {
        let values = input.as_slice().iter().map(|v| -v).collect();
        Tensor::from_shape_vec(input.shape(), values)
    }
}

impl AcceleratorSdk for StubSdk {
    fn is_present(&self) -> bool {
        true
    }

    fn devices(&self) -> Result<Vec<AcceleratorDevice>> {
        Ok(vec![AcceleratorDevice {
            name: "akida0".to_string(),
            path: PathBuf::from("/dev/akida0"),
        }])
    }

    fn load(&self, path: &Path) -> Result<Box<dyn AcceleratorModel>> {
        match self.0 {
            Behavior::Load => Ok(Box::new(Negate)),
            Behavior::Fail => Err(EchoError::ModelLoadFailure {
                kind: BackendKind::Accelerator,
                path: path.to_path_buf(),
                reason: "device busy".to_string(),
            }),
            Behavior::Panic => panic!("driver fault"),
        }
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        fs::create_dir_all(dir.path().join("runtime/models")).unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn touch(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::write(&path, b"\x00\x01 not a real model").unwrap();
        path
    }

    fn resolver(
        &self,
        host: HostInfo,
        availability: FixedAvailability,
        sdk: Behavior,
    ) -> BackendResolver {
        let search = SearchConfig {
            accelerator_models: vec![
                self.path("build/demo_model.ez"),
                self.path("runtime/models/demo_model.ez"),
            ],
            model_dirs: vec![self.path("build"), self.path("runtime/models")],
            manifest: self.path("runtime/manifest.json"),
        };
        BackendResolver::from_config(&EchoConfig::default())
            .with_host(host)
            .with_availability(availability)
            .with_accelerator_sdk(StubSdk(sdk))
            .with_search(search)
    }
}

fn pi5() -> HostInfo {
    HostInfo::new("linux", "aarch64")
}

fn laptop() -> HostInfo {
    HostInfo::new("macos", "x86_64")
}

#[test]
fn test_nothing_available_resolves_to_dummy() {
    let ws = Workspace::new();
    let resolver = ws.resolver(laptop(), FixedAvailability::none(), Behavior::Load);
    let request = ResolveRequest::new().with_model_path(ws.path("missing/weights.xyz"));

    let resolution = resolver.resolve(&request).unwrap();
    assert_eq!(resolution.state, ResolutionState::Exhausted);
    assert_eq!(resolution.kind(), BackendKind::Dummy);
    assert!(resolution.candidates.is_empty());

    let mut handle = resolution.handle;
    let out = handle.predict(&Tensor::zeros(&[1, 128])).unwrap();
    assert_eq!(out.shape(), &[10]);
    assert!(out.as_slice().iter().all(|v| (0.0..1.0).contains(v)));
}

#[test]
fn test_accelerator_preferred_on_supported_host() {
    let ws = Workspace::new();
    let ez = ws.touch("runtime/models/demo_model.ez");
    ws.touch("build/model.onnx");
    let resolver = ws.resolver(pi5(), FixedAvailability::all(), Behavior::Load);

    let resolution = resolver.resolve(&ResolveRequest::new()).unwrap();
    assert_eq!(resolution.state, ResolutionState::Loaded(BackendKind::Accelerator));
    assert_eq!(resolution.handle.source(), Some(ez.as_path()));
    assert_eq!(
        resolution.candidates.kinds(),
        vec![BackendKind::Accelerator, BackendKind::Onnx]
    );

    let mut handle = resolution.handle;
    let input = Tensor::from_shape_vec(&[1, 2], vec![1.0, -2.0]).unwrap();
    assert_eq!(handle.predict(&input).unwrap().as_slice(), &[-1.0, 2.0]);
}

#[test]
fn test_accelerator_skipped_on_unsupported_host() {
    let ws = Workspace::new();
    ws.touch("build/demo_model.ez");
    ws.touch("build/model.tflite");
    let resolver = ws.resolver(laptop(), FixedAvailability::all(), Behavior::Load);

    let list = resolver.candidates(&ResolveRequest::new());
    assert_eq!(list.kinds(), vec![BackendKind::Tflite]);
}

#[test]
fn test_cascade_records_every_failure() {
    let ws = Workspace::new();
    ws.touch("build/demo_model.ez");
    ws.touch("build/broken.onnx");
    ws.touch("runtime/models/broken.tflite");
    let resolver = ws.resolver(pi5(), FixedAvailability::all(), Behavior::Fail);

    let resolution = resolver.resolve(&ResolveRequest::new()).unwrap();
    assert_eq!(resolution.state, ResolutionState::Exhausted);
    assert!(resolution.handle.is_dummy());
    let failed: Vec<BackendKind> = resolution
        .failures
        .iter()
        .map(|f| f.candidate.kind)
        .collect();
    assert_eq!(
        failed,
        vec![BackendKind::Accelerator, BackendKind::Onnx, BackendKind::Tflite]
    );
    assert!(resolution.failures[0].reason.contains("device busy"));
}

#[test]
fn test_panicking_sdk_is_contained() {
    let ws = Workspace::new();
    ws.touch("build/demo_model.ez");
    let resolver = ws.resolver(pi5(), FixedAvailability::all(), Behavior::Panic);

    let resolution = resolver.resolve(&ResolveRequest::new()).unwrap();
    assert_eq!(resolution.state, ResolutionState::Exhausted);
    assert_eq!(resolution.failures.len(), 1);
    assert!(resolution.failures[0].reason.contains("driver fault"));
}

#[test]
fn test_forced_onnx_unloadable_does_not_fall_through() {
    let ws = Workspace::new();
    ws.touch("build/demo_model.ez");
    let broken = ws.touch("build/broken.onnx");
    let resolver = ws.resolver(pi5(), FixedAvailability::all(), Behavior::Load);

    let request = ResolveRequest::new()
        .with_backend(BackendKind::Onnx)
        .with_model_path(&broken);
    let err = resolver.resolve(&request).unwrap_err();
    match err {
        EchoError::ModelLoadFailure { kind, path, .. } => {
            assert_eq!(kind, BackendKind::Onnx);
            assert_eq!(path, broken);
        }
        other => panic!("expected ModelLoadFailure, got {other:?}"),
    }
}

#[test]
fn test_forced_backend_without_model_errors() {
    let ws = Workspace::new();
    let resolver = ws.resolver(pi5(), FixedAvailability::all(), Behavior::Load);

    let err = resolver
        .resolve(&ResolveRequest::new().with_backend(BackendKind::Accelerator))
        .unwrap_err();
    assert!(matches!(
        err,
        EchoError::NoModelFound {
            kind: BackendKind::Accelerator
        }
    ));
}

#[test]
fn test_forced_accelerator_discovers_model() {
    let ws = Workspace::new();
    let ez = ws.touch("build/demo_model.ez");
    // Even on an unsupported host an explicit override is honored.
    let resolver = ws.resolver(laptop(), FixedAvailability::all(), Behavior::Load);

    let resolution = resolver
        .resolve(&ResolveRequest::new().with_backend(BackendKind::Accelerator))
        .unwrap();
    assert_eq!(resolution.state, ResolutionState::Loaded(BackendKind::Accelerator));
    assert_eq!(resolution.handle.source(), Some(ez.as_path()));
}

#[test]
fn test_extension_hint_routes_to_accelerator() {
    let ws = Workspace::new();
    let fbz = ws.touch("kws.fbz");
    let resolver = ws.resolver(laptop(), FixedAvailability::all(), Behavior::Load);

    let resolution = resolver
        .resolve(&ResolveRequest::new().with_model_path(&fbz))
        .unwrap();
    assert_eq!(resolution.kind(), BackendKind::Accelerator);
}

#[test]
fn test_candidates_are_deterministic() {
    let ws = Workspace::new();
    ws.touch("build/demo_model.ez");
    ws.touch("build/b.onnx");
    ws.touch("build/a.onnx");
    ws.touch("runtime/models/c.lite");
    let resolver = ws.resolver(pi5(), FixedAvailability::all(), Behavior::Load);

    let first = resolver.candidates(&ResolveRequest::new());
    let second = resolver.candidates(&ResolveRequest::new());
    assert_eq!(first, second);
    assert_eq!(first.candidates[1].path, ws.path("build/a.onnx"));
    assert_eq!(first.candidates[2].path, ws.path("runtime/models/c.lite"));
}

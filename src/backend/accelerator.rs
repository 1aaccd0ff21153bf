//! BrainChip Akida access.
//!
//! The SDK is opaque to the resolver: it is asked whether it is present, to
//! list devices, and to load a compiled program. `KernelDriverSdk` talks to
//! the `akida_pcie` kernel module through its character devices
//! (`/dev/akida0`, ...): the program blob is written once at load time, then
//! each inference writes the input and reads the output back.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::BackendKind;
use crate::config::AcceleratorConfig;
use crate::error::{EchoError, Result};
use crate::tensor::Tensor;

/// One accelerator device node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceleratorDevice {
    pub name: String,
    pub path: PathBuf,
}

/// Entry points of the accelerator SDK.
pub trait AcceleratorSdk: Send + Sync {
    /// Whether the SDK can be used on this host. Must not fail.
    fn is_present(&self) -> bool;

    /// Enumerate attached devices.
    fn devices(&self) -> Result<Vec<AcceleratorDevice>>;

    /// Load a compiled program onto a device.
    fn load(&self, path: &Path) -> Result<Box<dyn AcceleratorModel>>;
}

/// A program resident on the accelerator.
pub trait AcceleratorModel: Send {
    fn predict(&mut self, input: &Tensor) -> Result<Tensor>;
}

/// SDK backed by the kernel driver's character devices.
#[derive(Debug, Clone)]
pub struct KernelDriverSdk {
    device_dir: PathBuf,
    device_prefix: String,
    output_len: usize,
}

impl KernelDriverSdk {
    pub fn new(
        device_dir: impl Into<PathBuf>,
        device_prefix: impl Into<String>,
        output_len: usize,
    ) -> Self {
        Self {
            device_dir: device_dir.into(),
            device_prefix: device_prefix.into(),
            output_len,
        }
    }

    pub fn from_config(config: &AcceleratorConfig) -> Self {
        Self::new(&config.device_dir, &config.device_prefix, config.output_len)
    }
}

impl AcceleratorSdk for KernelDriverSdk {
    fn is_present(&self) -> bool {
        match self.devices() {
            Ok(devices) => !devices.is_empty(),
            Err(e) => {
                debug!(error = %e, "Accelerator device scan failed");
                false
            }
        }
    }

    fn devices(&self) -> Result<Vec<AcceleratorDevice>> {
        let mut devices: Vec<AcceleratorDevice> = fs::read_dir(&self.device_dir)?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.starts_with(&self.device_prefix).then(|| AcceleratorDevice {
                    path: entry.path(),
                    name,
                })
            })
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    fn load(&self, path: &Path) -> Result<Box<dyn AcceleratorModel>> {
        let kind = BackendKind::Accelerator;
        let program = fs::read(path).map_err(|e| EchoError::load_failure(kind, path, e))?;
        if program.is_empty() {
            return Err(EchoError::load_failure(kind, path, "model file is empty"));
        }

        let device = self
            .devices()
            .map_err(|e| EchoError::load_failure(kind, path, e))?
            .into_iter()
            .next()
            .ok_or_else(|| EchoError::load_failure(kind, path, "no accelerator device found"))?;

        let mut handle = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device.path)
            .map_err(|e| {
                EchoError::load_failure(kind, path, format!("{}: {e}", device.path.display()))
            })?;
        handle
            .write_all(&program)
            .map_err(|e| {
                EchoError::load_failure(kind, path, format!("program upload failed: {e}"))
            })?;

        info!(device = %device.name, bytes = program.len(), "Accelerator program loaded");
        Ok(Box::new(KernelDriverModel {
            device: handle,
            output_len: self.output_len,
        }))
    }
}

struct KernelDriverModel {
    device: File,
    output_len: usize,
}

impl AcceleratorModel for KernelDriverModel {
    fn predict(&mut self, input: &Tensor) -> Result<Tensor> {
        let failure = |reason: String| EchoError::InferenceFailure {
            kind: BackendKind::Accelerator,
            reason,
        };

        let payload: Vec<u8> = input.as_slice().iter().flat_map(|v| v.to_le_bytes()).collect();
        self.device
            .write_all(&payload)
            .map_err(|e| failure(format!("input write failed: {e}")))?;

        let mut raw = vec![0u8; self.output_len * 4];
        let read = self
            .device
            .read(&mut raw)
            .map_err(|e| failure(format!("output read failed: {e}")))?;

        let values: Vec<f32> = raw[..read - read % 4]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Tensor::from_shape_vec(&[1, values.len()], values)
    }
}

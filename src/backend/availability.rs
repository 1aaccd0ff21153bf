//! Runtime availability probes.
//!
//! CPU runtimes are linked at build time, so their availability is the Cargo
//! feature set. The accelerator is a runtime property of the host and is
//! asked of the SDK. Probes never fail: any error or panic reads as "absent".

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::backend::{AcceleratorSdk, BackendKind};

/// Answers whether a backend's runtime can be used.
pub trait BackendAvailability: Send + Sync {
    fn probe(&self, kind: BackendKind) -> bool;
}

/// Availability of the real host and build.
pub struct SystemAvailability {
    accelerator: Arc<dyn AcceleratorSdk>,
}

impl SystemAvailability {
    pub fn new(accelerator: Arc<dyn AcceleratorSdk>) -> Self {
        Self { accelerator }
    }
}

impl BackendAvailability for SystemAvailability {
    fn probe(&self, kind: BackendKind) -> bool {
        let available = match kind {
            BackendKind::Accelerator => {
                panic::catch_unwind(AssertUnwindSafe(|| self.accelerator.is_present()))
                    .unwrap_or(false)
            }
            BackendKind::Onnx => cfg!(feature = "onnx"),
            BackendKind::Tflite => cfg!(feature = "tflite"),
            BackendKind::Dummy => true,
        };
        debug!(backend = %kind, available, "Probed backend availability");
        available
    }
}

/// Fixed answers, for forcing each branch of the resolution cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAvailability {
    pub accelerator: bool,
    pub onnx: bool,
    pub tflite: bool,
}

impl FixedAvailability {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            accelerator: true,
            onnx: true,
            tflite: true,
        }
    }
}

impl BackendAvailability for FixedAvailability {
    fn probe(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Accelerator => self.accelerator,
            BackendKind::Onnx => self.onnx,
            BackendKind::Tflite => self.tflite,
            BackendKind::Dummy => true,
        }
    }
}

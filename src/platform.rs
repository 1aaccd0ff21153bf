//! Host detection for the accelerator.
//!
//! The accelerator ships as an M.2 card for Linux ARM boards (Raspberry Pi 5),
//! so the only signal used for resolution is the OS family plus the machine
//! architecture string.

use std::fs;

use serde::Serialize;
use tracing::debug;

const ARM_MARKERS: [&str; 2] = ["arm", "aarch64"];

/// OS name and machine architecture of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
}

impl HostInfo {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The host this process runs on.
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn supports_accelerator(&self) -> bool {
        supports_accelerator(&self.os, &self.arch)
    }

    /// Board model from the device tree (`Raspberry Pi 5 Model B Rev 1.0`),
    /// if the host exposes one. Diagnostic only.
    pub fn board_model() -> Option<String> {
        let model = fs::read_to_string("/sys/firmware/devicetree/base/model").ok()?;
        let model = model.trim_end_matches('\0').trim().to_string();
        debug!(%model, "Detected board model");
        Some(model)
    }
}

/// True only for the Linux family on an ARM/AArch64 machine.
pub fn supports_accelerator(os: &str, arch: &str) -> bool {
    let arch = arch.to_lowercase();
    os.eq_ignore_ascii_case("linux") && ARM_MARKERS.iter().any(|m| arch.contains(m))
}

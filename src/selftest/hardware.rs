use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use tracing::{info, warn};

use crate::backend::AcceleratorSdk;
use crate::platform::HostInfo;
use crate::selftest::{ComponentResult, TestStatus};

/// Check whether the host OS/architecture can take the accelerator card.
pub fn check_platform(host: &HostInfo) -> ComponentResult {
    info!(os = %host.os, arch = %host.arch, "Detected platform");

    if host.supports_accelerator() {
        ComponentResult {
            component: "Platform".to_string(),
            status: TestStatus::Pass,
            details: format!("{} / {} (accelerator supported)", host.os, host.arch),
            remediation: None,
        }
    } else {
        ComponentResult {
            component: "Platform".to_string(),
            status: TestStatus::Skipped,
            details: format!(
                "{} / {} (accelerator only supported on Linux ARM)",
                host.os, host.arch
            ),
            remediation: Some("CPU-only mode is used for development on this host.".to_string()),
        }
    }
}

/// Report the board model from the device tree, when the host has one.
pub fn check_board() -> Result<ComponentResult> {
    let Some(model) = HostInfo::board_model() else {
        return Ok(ComponentResult {
            component: "Board".to_string(),
            status: TestStatus::Skipped,
            details: "No device tree model (not an embedded board)".to_string(),
            remediation: None,
        });
    };
    info!("Detected hardware model: {}", model);

    let status = if model.contains("Raspberry Pi 5") {
        TestStatus::Pass
    } else {
        TestStatus::Warning
    };
    let remediation = if matches!(status, TestStatus::Warning) {
        Some("The accelerator M.2 card is validated on Raspberry Pi 5.".to_string())
    } else {
        None
    };

    Ok(ComponentResult {
        component: "Board".to_string(),
        status,
        details: format!("Model: {}", model),
        remediation,
    })
}

/// SDK presence with panics contained.
pub fn sdk_present(sdk: &dyn AcceleratorSdk) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| sdk.is_present())).unwrap_or_else(|_| {
        warn!("Accelerator SDK panicked while probing");
        false
    })
}

pub fn check_accelerator_sdk(host: &HostInfo, present: bool) -> ComponentResult {
    match (host.supports_accelerator(), present) {
        (_, true) => ComponentResult {
            component: "Accelerator SDK".to_string(),
            status: TestStatus::Pass,
            details: "Kernel driver loaded".to_string(),
            remediation: None,
        },
        (true, false) => ComponentResult {
            component: "Accelerator SDK".to_string(),
            status: TestStatus::Fail,
            details: "Accelerator SDK not found".to_string(),
            remediation: Some(
                "Install the BrainChip driver package for ARM64 and load the akida_pcie module."
                    .to_string(),
            ),
        },
        (false, false) => ComponentResult {
            component: "Accelerator SDK".to_string(),
            status: TestStatus::Skipped,
            details: "Not applicable on this platform".to_string(),
            remediation: None,
        },
    }
}

/// List attached accelerator devices.
pub fn check_accelerator_devices(
    host: &HostInfo,
    sdk: &dyn AcceleratorSdk,
    present: bool,
) -> Result<ComponentResult> {
    if !present {
        let details = if host.supports_accelerator() {
            "Skipped: accelerator SDK not available"
        } else {
            "Skipped: platform not supported"
        };
        return Ok(ComponentResult {
            component: "Accelerator Devices".to_string(),
            status: TestStatus::Skipped,
            details: details.to_string(),
            remediation: None,
        });
    }

    let devices = sdk.devices()?;
    if devices.is_empty() {
        return Ok(ComponentResult {
            component: "Accelerator Devices".to_string(),
            status: TestStatus::Fail,
            details: "SDK present but no devices detected".to_string(),
            remediation: Some(
                "Check the M.2 card is seated and the PCIe slot is enabled in config.txt."
                    .to_string(),
            ),
        });
    }

    let names: Vec<String> = devices.iter().map(|d| d.name.clone()).collect();
    info!(count = devices.len(), "Accelerator device(s) detected");
    Ok(ComponentResult {
        component: "Accelerator Devices".to_string(),
        status: TestStatus::Pass,
        details: format!("{} device(s): {}", devices.len(), names.join(", ")),
        remediation: None,
    })
}

//! CPU runtime and media decoder checks.

use crate::preprocess::{AudioDecoder, VisionDecoder};
use crate::selftest::{ComponentResult, TestStatus};

fn runtime_result(
    component: &str,
    available: bool,
    engine: &str,
    feature: &str,
) -> ComponentResult {
    if available {
        ComponentResult {
            component: component.to_string(),
            status: TestStatus::Pass,
            details: format!("{engine} compiled in"),
            remediation: None,
        }
    } else {
        ComponentResult {
            component: component.to_string(),
            status: TestStatus::Fail,
            details: format!("{engine} not compiled into this build"),
            remediation: Some(format!("Rebuild with `--features {feature}`.")),
        }
    }
}

pub fn check_onnx() -> ComponentResult {
    runtime_result(
        "ONNX Runtime",
        cfg!(feature = "onnx"),
        "tract ONNX",
        "onnx",
    )
}

pub fn check_tflite() -> ComponentResult {
    runtime_result(
        "TFLite Runtime",
        cfg!(feature = "tflite"),
        "tract TFLite",
        "tflite",
    )
}

fn decoder_result<'a>(
    component: &str,
    names: impl Iterator<Item = (&'a str, bool)>,
    remediation: &str,
) -> ComponentResult {
    let mut missing = Vec::new();
    for (name, available) in names {
        if available {
            let details = if missing.is_empty() {
                format!("{name} available")
            } else {
                format!("{name} available (fallback; missing: {})", missing.join(", "))
            };
            return ComponentResult {
                component: component.to_string(),
                status: TestStatus::Pass,
                details,
                remediation: None,
            };
        }
        missing.push(name);
    }
    ComponentResult {
        component: component.to_string(),
        status: TestStatus::Fail,
        details: format!("No decoder available (tried: {})", missing.join(", ")),
        remediation: Some(remediation.to_string()),
    }
}

pub fn check_image_decoder(decoders: &[Box<dyn VisionDecoder>]) -> ComponentResult {
    decoder_result(
        "Image Decoder",
        decoders.iter().map(|d| (d.name(), d.is_available())),
        "Build with the `vision` feature or install ffmpeg.",
    )
}

pub fn check_audio_decoder(decoders: &[Box<dyn AudioDecoder>]) -> ComponentResult {
    decoder_result(
        "Audio Decoder",
        decoders.iter().map(|d| (d.name(), d.is_available())),
        "Build with the `audio` feature.",
    )
}

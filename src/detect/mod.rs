mod backend;
mod backends;
pub mod postprocess;
mod result;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{Detection, DetectionResult};

/// Detector backends selectable at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!(
                "unknown detector backend '{}'; expected 'stub' or 'tract'",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stub => write!(f, "stub"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Load the detector once at start-up.
///
/// Model-backed kinds require `model_path` to exist.
pub fn load_backend(
    kind: BackendKind,
    model_path: &Path,
    input_size: u32,
) -> Result<Box<dyn DetectorBackend>> {
    match kind {
        BackendKind::Stub => Ok(Box::new(StubBackend::new())),
        BackendKind::Tract => {
            if !model_path.exists() {
                return Err(anyhow!(
                    "model file not found at {}",
                    model_path.display()
                ));
            }
            load_tract(model_path, input_size)
        }
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(model_path: &Path, input_size: u32) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = TractBackend::new(model_path, input_size)?;
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_model_path: &Path, _input_size: u32) -> Result<Box<dyn DetectorBackend>> {
    anyhow::bail!("the tract detector requires the backend-tract feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_kinds() -> Result<()> {
        assert_eq!("stub".parse::<BackendKind>()?, BackendKind::Stub);
        assert_eq!(" Tract ".parse::<BackendKind>()?, BackendKind::Tract);
        assert_eq!("onnx".parse::<BackendKind>()?, BackendKind::Tract);
        assert!("yolo-cloud".parse::<BackendKind>().is_err());
        Ok(())
    }

    #[test]
    fn missing_model_file_is_fatal() {
        let err = load_backend(
            BackendKind::Tract,
            Path::new("/nonexistent/weights/best.onnx"),
            640,
        )
        .err()
        .expect("missing model must fail");
        assert!(err.to_string().contains("model file not found"));
    }

    #[test]
    fn stub_backend_needs_no_model() -> Result<()> {
        let backend = load_backend(BackendKind::Stub, Path::new("unused.onnx"), 640)?;
        assert_eq!(backend.name(), "stub");
        Ok(())
    }
}

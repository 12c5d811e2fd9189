use std::fmt;
use thiserror::Error;

/// Resources acquired once at startup. Failing to acquire any of them is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Window,
    Gpu,
    Shader,
    Model,
    Image,
    Capture,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Window => "window",
            Self::Gpu => "gpu",
            Self::Shader => "shader",
            Self::Model => "face model",
            Self::Image => "overlay image",
            Self::Capture => "capture device",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SmileyError {
    #[error("failed to initialize {resource}: {reason}")]
    StartupResource { resource: Resource, reason: String },

    #[error("capture device unavailable: {0}")]
    Capture(String),

    #[error("face detector invoked before its model was loaded")]
    DetectorNotReady,

    #[error("gpu failure: {0}")]
    Gpu(String),

    #[error("renderer cannot {action} while {state}")]
    RenderState { action: &'static str, state: String },
}

impl SmileyError {
    pub fn startup(resource: Resource, reason: impl fmt::Display) -> Self {
        Self::StartupResource {
            resource,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SmileyError>;

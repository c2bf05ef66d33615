use passconfig::ConfigError;

/// Failures surfaced by the pass pipeline.
///
/// Missing uniform locations and malformed uniform arities are deliberately
/// absent: both are tolerated silently while uploading.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to allocate {what}: {detail}")]
    Allocation { what: &'static str, detail: String },
    #[error("invalid pass configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("no surface view is attached for the final image pass")]
    MissingSurface,
    #[error("sampler unit {unit} has no texture bound")]
    UnboundUnit { unit: u32 },
    #[error("buffer {0} has no descriptor or no GPU resources")]
    UnknownBuffer(usize),
    #[error("texture handle {0} does not name a live texture")]
    UnknownTexture(u32),
    #[error("render target handle {0} does not name a live target")]
    UnknownTarget(u32),
    #[error("no program is registered for pass {0}")]
    UnknownProgram(usize),
    #[error("failed to build the pipeline for pass {pass}: {detail}")]
    Pipeline { pass: usize, detail: String },
}

impl RenderError {
    pub fn allocation(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Allocation {
            what,
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

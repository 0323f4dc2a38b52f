use std::fmt;

/// Run states. `Skipped`, `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Checking,
    Skipped,
    Downloading,
    Transforming,
    Partitioning,
    Uploading,
    Materializing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Done | Self::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Checking, Skipped)
            | (Checking, Downloading)
            | (Downloading, Transforming)
            | (Transforming, Partitioning)
            | (Partitioning, Uploading)
            | (Uploading, Materializing)
            | (Uploading, Done)
            | (Materializing, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "CHECKING",
            Self::Skipped => "SKIPPED",
            Self::Downloading => "DOWNLOADING",
            Self::Transforming => "TRANSFORMING",
            Self::Partitioning => "PARTITIONING",
            Self::Uploading => "UPLOADING",
            Self::Materializing => "MATERIALIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

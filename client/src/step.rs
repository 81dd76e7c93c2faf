//! Pollable units of asynchronous work
//!
//! Every wait inside a map transition (network disconnect, asset download,
//! scene load, map root lookup) is represented by an [`AsyncStep`]. Steps
//! backed by an external collaborator wrap an [`Operation`] and pull their
//! status from it; the remaining steps are driven by the controller itself.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStepKind {
    Disconnect,
    Download,
    SceneLoad,
    ObjectResolve,
    Generic,
}

impl fmt::Display for AsyncStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AsyncStepKind::Disconnect => "disconnect",
            AsyncStepKind::Download => "download",
            AsyncStepKind::SceneLoad => "scene load",
            AsyncStepKind::ObjectResolve => "object resolve",
            AsyncStepKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Status reported by an external operation each time it is polled
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Pending { progress: f32 },
    Done,
    Failed { error: String },
}

/// Work owned by a collaborator (download, scene load) that the controller
/// can only observe by polling.
pub trait Operation {
    fn poll(&mut self) -> OperationStatus;
}

pub struct AsyncStep {
    kind: AsyncStepKind,
    progress: f32,
    done: bool,
    error: Option<String>,
    operation: Option<Box<dyn Operation>>,
}

impl AsyncStep {
    /// Creates a step whose completion is reported by the controller.
    pub fn driven(kind: AsyncStepKind) -> Self {
        Self {
            kind,
            progress: 0.0,
            done: false,
            error: None,
            operation: None,
        }
    }

    /// Creates a step that follows an external operation.
    pub fn from_operation(kind: AsyncStepKind, operation: Box<dyn Operation>) -> Self {
        Self {
            operation: Some(operation),
            ..Self::driven(kind)
        }
    }

    pub fn kind(&self) -> AsyncStepKind {
        self.kind
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pulls the latest status from the backing operation, if any, and
    /// returns whether the step is done. A failed operation counts as done
    /// with its error recorded.
    pub fn poll(&mut self) -> bool {
        if self.done {
            return true;
        }

        let status = match self.operation.as_mut() {
            Some(operation) => operation.poll(),
            None => return false,
        };

        match status {
            OperationStatus::Pending { progress } => self.report_progress(progress),
            OperationStatus::Done => self.complete(),
            OperationStatus::Failed { error } => self.fail(error),
        }

        self.done
    }

    /// Progress never moves backwards within a step.
    pub fn report_progress(&mut self, progress: f32) {
        if self.done || progress.is_nan() {
            return;
        }
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
    }

    pub fn complete(&mut self) {
        self.progress = 1.0;
        self.done = true;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.done = true;
    }
}

impl fmt::Debug for AsyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStep")
            .field("kind", &self.kind)
            .field("progress", &self.progress)
            .field("done", &self.done)
            .field("error", &self.error)
            .field("external", &self.operation.is_some())
            .finish()
    }
}

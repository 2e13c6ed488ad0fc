//! Root signatures and pipeline state objects.
//!
//! Compilation happens outside the frame graph; these types wrap the native
//! handles so compiled objects can be imported into a graph and resolved from
//! pass callbacks like any other resource.

use std::sync::Arc;

use crate::backend::NativeHandle;

/// Binding layout shared by pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSignature {
    label: Option<String>,
    raw: NativeHandle,
    parameter_count: u32,
}

impl RootSignature {
    /// Wrap a compiled root signature.
    pub fn new(raw: NativeHandle, parameter_count: u32) -> Self {
        Self {
            label: None,
            raw,
            parameter_count,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn raw(&self) -> NativeHandle {
        self.raw
    }

    pub fn parameter_count(&self) -> u32 {
        self.parameter_count
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Pipeline kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// A compiled pipeline state object.
#[derive(Debug, Clone)]
pub struct PipelineState {
    label: Option<String>,
    raw: NativeHandle,
    kind: PipelineKind,
    root_signature: Arc<RootSignature>,
}

impl PipelineState {
    /// Wrap a compiled pipeline built against `root_signature`.
    pub fn new(raw: NativeHandle, kind: PipelineKind, root_signature: Arc<RootSignature>) -> Self {
        Self {
            label: None,
            raw,
            kind,
            root_signature,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn raw(&self) -> NativeHandle {
        self.raw
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn root_signature(&self) -> &Arc<RootSignature> {
        &self.root_signature
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

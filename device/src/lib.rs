//! Collaborator interface for fused GEMM + epilogue libraries.
//!
//! Provides the descriptor, backend and timing-event traits consumed by the
//! plan cache and tuner in `fusetune-runtime`, plus a host reference backend.
//!
//! # Resource Ownership
//!
//! Descriptors and timing events are plain owned values; the backend
//! releases the underlying handles when they are dropped.

pub mod backend;
pub mod descriptor;
pub mod epilogue;
pub mod error;
pub mod host;
pub mod sync;

#[cfg(test)]
pub mod test;

pub use backend::{MatmulBackend, MatmulPreference, Workspace};
pub use descriptor::{LayoutAttr, LayoutDescriptor, MatmulAttr, MatmulDescriptor, Transpose};
pub use epilogue::{Activation, BiasGradient, Epilogue};
pub use error::*;
pub use host::{HostAlgo, HostBackend, HostMatmulDesc, HostMatrixLayout, HostOperands, HostStream, HostWorkspace};
pub use sync::{HostEvent, TimingEvent};

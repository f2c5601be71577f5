//! Workspace-scoped file tool suite.
//!
//! Six operations over the current workspace root: read, write, edit, list,
//! glob and grep. Results and operational failures are always text; only
//! schema-invalid arguments surface as protocol errors.

pub mod edit;
pub mod paths;
pub mod read;
pub mod search;
pub mod tools;
pub mod write;

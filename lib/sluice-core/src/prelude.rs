//! Prelude module for convenient imports.
//!
//! ```
//! use sluice_core::prelude::*;
//! ```

pub use crate::{
    Adapter, Auth, ByteRange, Error, ErrorKind, Exchange, HttpErrors, Method, Options,
    RequestBody, RequestContext, ResponseContext, Result, Retry, Step, StepResult, StepRunner,
};

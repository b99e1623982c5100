//! Prelude module for convenient imports.
//!
//! ```
//! use sluice::prelude::*;
//! ```

pub use crate::{
    Auth, ByteRange, Client, ClientBuilder, Error, ErrorKind, Exchange, HttpErrors, HyperAdapter,
    Method, Options, RequestBody, ResponseContext, Result, Retry, RetryDelay, Step, StepResult,
};

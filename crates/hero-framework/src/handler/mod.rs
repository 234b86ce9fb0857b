//! Handler and service system.
//!
//! - **Handler** ([`traits`]): the [`Handler`] trait adapting async
//!   functions with extracted parameters, plus [`HandlerResponse`] for their
//!   return values.
//! - **Service** ([`service`]): [`HandlerService`] and the panic-catching
//!   layer, erased into the [`BoxedService`] stored by commands and
//!   listeners.
//!
//! ```text
//! async fn kick(args: Args) -> String
//!     └─ HandlerService      (extract, call, process response)
//!         └─ CatchPanic      (panic → CommandError::Panicked)
//!             └─ BoxedService
//! ```

pub mod service;
pub mod traits;

pub use service::{BoxedService, CatchPanic, CatchPanicLayer, HandlerService, into_service};
pub use traits::{Handler, HandlerResponse};

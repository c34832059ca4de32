//! Server-side handling of chunked recordings
//!
//! - [`UploadRegistry`] - opens upload sessions and writes chunks to temporary storage
//! - [`Finalizer`] - assembles chunks by index, stores the result, cleans up

pub mod layout;
mod finalize;
mod upload;

pub use finalize::{FinalizeRequest, FinalizeResponse, Finalizer};
pub use upload::{IncomingChunk, MediaUploadSession, UploadRegistry};

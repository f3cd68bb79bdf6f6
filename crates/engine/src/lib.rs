//! # Pivotfeed Engine
//!
//! The engine turns a declarative data-source description into a merged,
//! uniform record set. A source's stored body template may encode one
//! logical request or several; the engine classifies it, fans out into
//! concurrent HTTP requests where needed, tags each record with the
//! parameters that produced it, and concatenates everything back in
//! definition order for downstream pivoting.
//!
//! ## Architecture
//!
//! - **`body`**: request-body analysis, single vs. multi classification
//!   and derivation of per-request dispatch units
//! - **`fields`**: derivation of `request*` tag keys from parameter names
//! - **`normalize`**: record extraction from the backend's varying
//!   response envelopes
//! - **`dispatch`**: concurrent fan-out, tagging, and ordered merge
//! - **`catalog`**: the source-catalog collaborator boundary
//! - **`client`**: cached fetch/preload surface consumed by the app

pub mod body;
pub mod catalog;
pub mod client;
pub mod dispatch;
pub mod fields;
pub mod normalize;

pub use body::{DispatchUnit, build_dispatch_units};
pub use catalog::{RpcSourceCatalog, SourceCatalog};
pub use client::RemoteSourceClient;
pub use dispatch::dispatch;
pub use fields::{apply_request_fields, request_field_key};
pub use normalize::extract_records;

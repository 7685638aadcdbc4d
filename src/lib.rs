#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # HMS
//!
//! Hospital appointment records held as self-contained JSON documents in an
//! embedded document store, with a fixed catalog of read-only queries and
//! aggregation pipelines over them.
//!
//! ## Crate Organization
//!
//! | Crate | Description |
//! |-------|-------------|
//! | [`hms-document`] | Embedded document engine: filters, projections, pipelines |
//! | `hms` | Typed records, seed data, query catalog, configuration, CLI |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hms::{config::Config, records::HospitalRecords};
//!
//! let records = HospitalRecords::open(&Config::default())?;
//! for doc in records.run("find-04")? {
//!     println!("{}", doc);
//! }
//! ```
//!
//! [`hms-document`]: hms_document

pub mod catalog;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod model;
pub mod records;
pub mod telemetry;

pub use hms_document::document;

pub use error::{HmsError, Result};

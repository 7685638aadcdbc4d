#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! # hms-document
//!
//! Embedded JSON document store with MongoDB-style filters, projections and
//! aggregation pipelines

pub mod document;

#![doc = "flashcat-upload-core: core logic library for flashcat-upload."]

//! This crate holds everything needed to upload mapping and symbol files to
//! Flashcat except the HTTP transport and the command line, which live in the
//! `flashcat-upload` crate.
//!
//! # Usage
//! Build an [`upload_task::UploadTaskConfig`], pick implementations of the
//! [`contract`] traits and call [`upload_task::run_upload_task`].

pub mod artifact;
pub mod config;
pub mod contract;
pub mod error;
pub mod repository;
pub mod site;
pub mod upload_task;

pub use error::{BoxError, ConfigurationError, UploadTaskError};
pub use site::FlashcatSite;

//! Trackmap - Media container demuxer
//!
//! This library crate exposes the CLI's configuration and report
//! rendering for integration testing.

pub mod config;
pub mod report;

//! Shared fixtures for the warehouse and network tests
//!
//! Builders for decoded source rows in the layouts the legacy exports use,
//! and a small reference geography.

#![allow(dead_code, unused_imports)]

pub mod fixtures;

pub use fixtures::{
    admission, equipment, establishment, locations, row, service_line, write_json_lines,
};

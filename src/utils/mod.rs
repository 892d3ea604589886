//! Utility functions and types

pub mod data_loader;

pub use data_loader::{
    default_target, frame_to_records, numeric_values, preview, string_values, DataLoader, DataSaver,
    Record,
};

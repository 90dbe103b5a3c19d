// Adapters layer: concrete implementations of the domain ports (base model, storage, CSV files).

pub mod context_classifier;
pub mod csv_io;
pub mod storage;

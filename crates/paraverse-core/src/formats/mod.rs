//! Dataset file formats.

pub mod openke;

pub use openke::OpenKeDataset;

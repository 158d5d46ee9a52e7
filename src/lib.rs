//! # nredux
//!
//! Reduction of MIEZE neutron spin-echo data recorded with CASCADE detectors.
//!
//! Files are read by a [`file_loader::FileLoader`], a region of interest of every selected
//! channel is summed into a time-binned signal, a sine is fitted to it and the fitted contrasts
//! are combined and collated over batches of files by [`reduction::structure::ReductionStructure`].
pub mod beam_center;
pub mod constants;
pub mod data_path;
pub mod file_loader;
pub mod fitting;
pub mod instrument;
pub mod metadata;
pub mod nredux_errors;
pub mod raw_data;
pub mod reduction;
pub mod roi;
pub mod sine_fit;
pub mod uncertainty;

//! # Constants and type definitions for nredux
//!
//! This module centralizes the **detector geometry**, the **MIEZE modulation constants**, and the
//! **common type definitions** used throughout the `nredux` library.
//!
//! ## Overview
//!
//! - CASCADE detector geometry (pixels, time bins, foils)
//! - Array shapes of the two coexisting binary payload formats
//! - MIEZE angular frequency (one acquisition period = 16 time bins)
//! - Core type aliases used across the crate
//!
//! These values describe the instrument hardware and are never mutated at runtime. Per-run
//! settings (channel selection, metadata filters, array overrides) are injected through
//! [`LoaderSettings`](crate::instrument::LoaderSettings) instead.

// -------------------------------------------------------------------------------------------------
// Mathematical constants
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-6;

/// Relative tolerance used when collapsing per-run parameters to a scalar
pub const CLOSE_RTOL: f64 = 1e-5;

/// Absolute tolerance used when collapsing per-run parameters to a scalar
pub const CLOSE_ATOL: f64 = 1e-8;

// -------------------------------------------------------------------------------------------------
// CASCADE detector geometry
// -------------------------------------------------------------------------------------------------

/// Pixels along each side of the CASCADE detector
pub const DETECTOR_PIXELS: usize = 128;

/// Time bins recorded per foil in one MIEZE period
pub const TIME_BINS: usize = 16;

/// Number of foils (detection channels) stored in a time-resolved payload
pub const FOILS: usize = 8;

/// Shape of a single-frame detector image (`.pad`)
pub const IMAGE_SHAPE: [usize; 2] = [DETECTOR_PIXELS, DETECTOR_PIXELS];

/// Shape of a time-resolved acquisition (`.tof`): foil × time bin × pixel × pixel
pub const TOF_SHAPE: [usize; 4] = [FOILS, TIME_BINS, DETECTOR_PIXELS, DETECTOR_PIXELS];

/// Element count of a single-frame image
pub const IMAGE_LEN: usize = DETECTOR_PIXELS * DETECTOR_PIXELS;

/// Element count of a time-resolved acquisition
pub const TOF_LEN: usize = FOILS * TIME_BINS * DETECTOR_PIXELS * DETECTOR_PIXELS;

// -------------------------------------------------------------------------------------------------
// MIEZE signal
// -------------------------------------------------------------------------------------------------

/// Fixed angular frequency of the MIEZE signal: one period spans [`TIME_BINS`] bins
pub const MIEZE_OMEGA: f64 = DPI / TIME_BINS as f64;

/// Metadata key holding the MIEZE echo time in detector headers
pub const ECHO_TIME_KEY: &str = "tau";

/// Alias under which the echo time is reported by
/// [`ReductionStructure::analyze`](crate::reduction::structure::ReductionStructure::analyze)
pub const ECHO_TIME_ALIAS: &str = "tau_M";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Raw neutron count as stored on disk (4-byte signed integer)
pub type Count = i32;

/// Number identifying a measurement file
pub type FileNumber = u64;

/// Index of a detection channel (foil) inside a payload
pub type FoilIndex = usize;

/// Name of a metadata section
pub type SectionName = String;

/// Name of a metadata key inside a section
pub type MetaKey = String;

//! AGATA - Automated Glucose dATa Analysis
//!
//! AGATA computes the metrics used to analyze continuous glucose monitoring
//! (CGM) traces in research settings: time in ranges, glycemic variability,
//! risk indices, glycemic transformation indices and glycemic events. Traces
//! can be read from commercial CGM exports, inspected, retimed and imputed,
//! analyzed one at a time or as study arms, and compared between arms.
//!
//! ## Modules
//!
//! - **Analysis**: [`Agata`] facade over the metric modules
//! - **Readers**: Dexcom, Eversense and FreeStyle Libre CSV exports
//! - **Processing**: retiming, imputation and detrending of traces
//! - **Accuracy**: agreement of a trace with a reference trace

pub mod accuracy;
pub mod config;
pub mod error;
pub mod events;
pub mod glycemic_transformation;
pub mod inspection;
pub mod pipeline;
pub mod processing;
pub mod readers;
pub mod report;
pub mod risk;
pub mod stats;
pub mod time_in_ranges;
pub mod types;
pub mod validation;
pub mod variability;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::AnalysisConfig;
pub use error::AgataError;
pub use pipeline::{analyze_glucose_profile_json, compare_two_arms_json, Agata};
pub use readers::{CgmDevice, CgmReader};
pub use report::{AnalysisReport, ReportEncoder};
pub use types::{GlucoseProfile, GlucoseSample, GlycemicTarget, ProfileAnalysis};

/// AGATA version embedded in all reports
pub const AGATA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "agata";

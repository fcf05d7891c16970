//! Fire-probability forecasting from presence points and environmental rasters.
//!
//! Pipeline:
//!   load raster stacks → sample background candidates → exclusion join →
//!   assemble training set → fit MaxEnt → score the forecast stack.
//!
//! Every stage is a pure function of its inputs; [`pipeline::run`] chains them.

pub mod config;
pub mod coords;
pub mod error;
pub mod exclusion;
pub mod loader;
pub mod maxent;
pub mod pipeline;
pub mod points;
pub mod raster;
pub mod region;
pub mod sampler;
pub mod training;

pub use config::RunConfig;
pub use error::{ErrorKind, FirecastError, PipelineError, Result, Stage};
pub use loader::{InMemoryCatalog, PointCatalog, RasterCatalog, StackInput};
pub use maxent::{FittedModel, MaxentConfig};
pub use pipeline::{run, PipelineOutput, RunReport};
pub use points::{Label, Point};
pub use raster::{GridSpec, Raster, RasterStack};
pub use region::Region;

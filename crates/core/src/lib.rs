//! # Terrabox Core
//!
//! Core types, traits and I/O for the terrabox raster toolbox.
//!
//! This crate provides:
//! - `Raster`: in-memory grid store with NoData and reflected edge policies
//! - `RasterHeader`: the persisted `.dep` header model
//! - Reading and writing the `.dep`/`.tas` raster pair
//! - Neighborhood, backlink and ring offset tables
//! - The `Algorithm` trait and the plugin host contract

pub mod error;
pub mod host;
pub mod io;
pub mod raster;

pub use error::{Error, ErrorKind, Result};
pub use host::{run_plugin, LogHost, NullHost, PluginHost, ProgressReporter, ReturnData};
pub use raster::{
    Access, ByteOrder, Connectivity, DataScale, DataType, EdgePolicy, Extent, Raster,
    RasterHeader,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::host::{PluginHost, ProgressReporter, ReturnData};
    pub use crate::raster::{
        Access, Connectivity, DataScale, DataType, EdgePolicy, Extent, Raster, RasterHeader,
    };
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in terrabox.
///
/// Algorithms transform input rasters according to parameters, reporting
/// progress and polling for cancellation through the supplied reporter.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters and no host
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default(), &mut ProgressReporter::silent())
    }
}

//! # Terrabox Algorithms
//!
//! Region-growing engine and the raster procedures built on it.
//!
//! ## Modules
//!
//! - **region**: explicit-stack flood fill and lazy-deletion priority
//!   propagation
//! - **clump**: connected-component labeling
//! - **allocation**: Euclidean allocation and distance
//! - **cost_distance**: accumulated cost, backlinks and cost allocation
//! - **oto**: removal of off-terrain objects from DEMs
//! - **focal**: Laplacian, deviation from mean and ring mean filters
//! - **new_raster**: blank rasters shaped like an existing one

pub mod allocation;
pub mod clump;
pub mod cost_distance;
pub mod focal;
pub mod new_raster;
pub mod oto;
pub mod region;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::allocation::{
        euclidean_allocation, euclidean_distance, EuclideanAllocation, EuclideanOutputs,
    };
    pub use crate::clump::{clump, Clump, ClumpParams};
    pub use crate::cost_distance::{
        cost_allocation, cost_distance, CostAllocation, CostDistance, CostDistanceOutputs,
    };
    pub use crate::focal::{
        deviation_from_mean, laplacian, ring_mean, Focal, FocalFilter, FocalParams,
        LaplacianKernel,
    };
    pub use crate::new_raster::{new_raster_from_base, FillValue, NewRasterFromBase, NewRasterParams};
    pub use crate::oto::{remove_off_terrain_objects, OtoParams, RemoveOffTerrainObjects};
    pub use crate::region::{flood_fill, shortest_paths, PriorityPropagation};
    pub use terrabox_core::prelude::*;
}

//! Create a new persisted raster shaped like an existing one

use std::path::{Path, PathBuf};

use terrabox_core::raster::{Access, DataType, Raster};
use terrabox_core::{Algorithm, Error, ProgressReporter, Result};

/// Initial value of every cell in the new raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    NoData,
    Constant(f64),
}

/// Parameters for creating a raster from a base
#[derive(Debug, Clone)]
pub struct NewRasterParams {
    pub data_type: DataType,
    pub fill: FillValue,
    /// NoData value of the new raster; the base's when `None`
    pub nodata: Option<f64>,
}

impl Default for NewRasterParams {
    fn default() -> Self {
        Self {
            data_type: DataType::Float,
            fill: FillValue::Constant(0.0),
            nodata: None,
        }
    }
}

/// New raster from base algorithm. Input is `(base, output)` paths.
#[derive(Debug, Clone, Default)]
pub struct NewRasterFromBase;

impl Algorithm for NewRasterFromBase {
    type Input = (PathBuf, PathBuf);
    type Output = Raster;
    type Params = NewRasterParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "New Raster From Base"
    }

    fn description(&self) -> &'static str {
        "Create a raster with the extent and resolution of an existing one"
    }

    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Self::Output> {
        let (base, output) = input;
        new_raster_from_base(&base, &output, &params, progress)
    }
}

/// Create `output` with the grid, units and palette of the raster at `base`,
/// every cell set to the fill value. The new raster is flushed before it is
/// returned.
pub fn new_raster_from_base(
    base: &Path,
    output: &Path,
    params: &NewRasterParams,
    progress: &mut ProgressReporter<'_>,
) -> Result<Raster> {
    let base = Raster::open(base, Access::ReadOnly)?;
    let nodata = params.nodata.unwrap_or_else(|| base.nodata());
    let fill = match params.fill {
        FillValue::NoData => nodata,
        FillValue::Constant(v) => v,
    };

    progress.set_label("Creating raster");
    let mut raster = Raster::create_like(output, base.header(), params.data_type, nodata, fill)?;
    raster.set_preferred_palette(&base.header().preferred_palette);
    raster.set_z_units(&base.header().z_units);
    raster.add_metadata_entry(&format!("Created by the {} tool", NewRasterFromBase.name()));
    raster.flush()?;
    progress.update(100);
    Ok(raster)
}

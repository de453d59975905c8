//! Flood-fill simulators over the terrain state.

pub mod irradiance;
pub mod light;
pub mod occlusion;
pub mod scanner;
pub mod water;

pub use irradiance::{update_irradiance, IrradianceConv};
pub use light::{LightConfig, LightSimulation};
pub use occlusion::{update_occlusion, MAX_OCCLUSION, OCCLUSION_STEP};
pub use scanner::ColumnScanner;
pub use water::{update_water, MAX_WATER};

//! # Strata Light
//!
//! Scene light storage for renderers built on [strata]. Lights of all kinds share one [LightDescriptor](light::LightDescriptor)
//! layout and live in a single [DynamicStorage](strata::storage::DynamicStorage).
//!
//! ```ignore
//! let lights = LightStorage::new(&ctx, LightStorageConfig::default())?;
//! let sun = lights.allocate_directional_light(DirectionalLight::new(color, 1000.0, 1.5e8, 7e5, dir))?;
//! //each frame
//! lights.update(&mut recorder);
//! lights.clear_active_ll(&mut recorder);
//! ```

pub mod light;
pub mod shape;
mod storage;

pub use light::{
    DirectionalLight, LightDescriptor, LightKind, ShapedLight, SphereLight, VirtualLight,
};
pub use storage::{ACTIVE_LL_STRIDE, LightStorage, LightStorageConfig};

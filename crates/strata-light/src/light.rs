use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;
use strata::storage::StoredResource;

///Luminance below which a light is considered to not contribute anymore. Used to derive the effective range of lights.
pub const MIN_LUMINANCE: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightKind {
    Sphere = 0,
    ///Like a sphere light, but without a visible emitter.
    Virtual = 1,
    Directional = 2,
    Shaped = 3,
}

impl LightKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(LightKind::Sphere),
            1 => Some(LightKind::Virtual),
            2 => Some(LightKind::Directional),
            3 => Some(LightKind::Shaped),
            _ => None,
        }
    }
}

///GPU layout of a single light. One of those lives in each slot of the light storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightDescriptor {
    pub position: [f32; 3],
    pub radius: f32,
    ///Color premultiplied by luminance.
    pub emittance: [f32; 3],
    pub effective_range: f32,
    pub direction: [f32; 3],
    pub kind: u32,
    ///Shadow cascade slot of directional lights, `u32::MAX` for all other lights.
    pub cascade_idx: u32,
    ///First point of a shaped light's polygon in the shape point buffer.
    pub shape_offset: u32,
    pub shape_count: u32,
    pub _pad: u32,
}

impl LightDescriptor {
    pub const NO_CASCADE: u32 = u32::MAX;

    fn new(kind: LightKind, color: [f32; 3], luminance: f32) -> Self {
        LightDescriptor {
            emittance: color.map(|c| c * luminance),
            kind: kind as u32,
            cascade_idx: Self::NO_CASCADE,
            ..Zeroable::zeroed()
        }
    }

    pub fn light_kind(&self) -> Option<LightKind> {
        LightKind::from_raw(self.kind)
    }
}

//distance at which an inverse-square falloff drops below MIN_LUMINANCE
fn effective_range(radius: f32, luminance: f32) -> f32 {
    radius + (luminance.max(0.0) / MIN_LUMINANCE).sqrt()
}

///Spherical emitter.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub luminance: f32,
}

impl SphereLight {
    pub fn new(color: [f32; 3], luminance: f32, position: [f32; 3], radius: f32) -> Self {
        SphereLight {
            position,
            radius,
            color,
            luminance,
        }
    }

    pub fn effective_range(&self) -> f32 {
        effective_range(self.radius, self.luminance)
    }
}

impl StoredResource for SphereLight {
    type Descriptor = LightDescriptor;
    fn descriptor(&self) -> LightDescriptor {
        LightDescriptor {
            position: self.position,
            radius: self.radius,
            effective_range: self.effective_range(),
            ..LightDescriptor::new(LightKind::Sphere, self.color, self.luminance)
        }
    }
}

///Point light without a visible emitter. It only contributes lighting.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub luminance: f32,
}

impl VirtualLight {
    pub fn new(color: [f32; 3], luminance: f32, position: [f32; 3], radius: f32) -> Self {
        VirtualLight {
            position,
            radius,
            color,
            luminance,
        }
    }
}

impl StoredResource for VirtualLight {
    type Descriptor = LightDescriptor;
    fn descriptor(&self) -> LightDescriptor {
        LightDescriptor {
            position: self.position,
            radius: self.radius,
            effective_range: effective_range(self.radius, self.luminance),
            ..LightDescriptor::new(LightKind::Virtual, self.color, self.luminance)
        }
    }
}

///Light infinitely far away (or far enough), like the sun. Directional lights cast cascaded shadows, therefore each one
/// occupies one of the storage's cascade slots.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    ///Direction the light travels in.
    pub direction: [f32; 3],
    ///Distance of the emitter, together with `radius` this determines the emitter's angular size.
    pub distance: f32,
    pub radius: f32,
    pub color: [f32; 3],
    pub luminance: f32,
    cascade_idx: Option<u32>,
}

impl DirectionalLight {
    pub fn new(
        color: [f32; 3],
        luminance: f32,
        distance: f32,
        radius: f32,
        direction: [f32; 3],
    ) -> Self {
        DirectionalLight {
            direction,
            distance,
            radius,
            color,
            luminance,
            cascade_idx: None,
        }
    }

    ///The cascade slot assigned by the light storage.
    pub fn cascade_idx(&self) -> Option<u32> {
        self.cascade_idx
    }

    pub(crate) fn set_cascade_idx(&mut self, idx: u32) {
        self.cascade_idx = Some(idx);
    }
}

impl StoredResource for DirectionalLight {
    type Descriptor = LightDescriptor;
    fn descriptor(&self) -> LightDescriptor {
        LightDescriptor {
            position: self.direction.map(|d| -d * self.distance),
            radius: self.radius,
            direction: self.direction,
            effective_range: f32::INFINITY,
            cascade_idx: self.cascade_idx.unwrap_or(LightDescriptor::NO_CASCADE),
            ..LightDescriptor::new(LightKind::Directional, self.color, self.luminance)
        }
    }
}

///Planar polygonal emitter. The polygon's points are kept in the light storage's shape point buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapedLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub luminance: f32,
    points: SmallVec<[[f32; 3]; 8]>,
    shape: Range<u32>,
}

impl ShapedLight {
    ///Creates a polygonal light. `points` are relative to `position`.
    pub fn polygon(
        color: [f32; 3],
        luminance: f32,
        position: [f32; 3],
        points: impl IntoIterator<Item = [f32; 3]>,
    ) -> Self {
        ShapedLight {
            position,
            color,
            luminance,
            points: points.into_iter().collect(),
            shape: 0..0,
        }
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    ///Range of this light's points in the shape point buffer. Empty until the light is stored.
    pub fn shape_range(&self) -> Range<u32> {
        self.shape.clone()
    }

    pub(crate) fn set_shape_range(&mut self, range: Range<u32>) {
        self.shape = range;
    }

    ///Radius of the bounding sphere of the polygon around `position`.
    pub fn radius(&self) -> f32 {
        self.points
            .iter()
            .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
            .fold(0.0, f32::max)
    }
}

impl StoredResource for ShapedLight {
    type Descriptor = LightDescriptor;
    fn descriptor(&self) -> LightDescriptor {
        let radius = self.radius();
        LightDescriptor {
            position: self.position,
            radius,
            effective_range: effective_range(radius, self.luminance),
            shape_offset: self.shape.start,
            shape_count: self.shape.end - self.shape.start,
            ..LightDescriptor::new(LightKind::Shaped, self.color, self.luminance)
        }
    }
}

use std::sync::Arc;

use strata::{
    ResourceError, StorageError,
    allocator::{Allocator, DefaultPolicy, MemoryUsage, SparsePolicy},
    ash::vk,
    context::{Ctx, QueueSelector},
    recorder::CommandRecorder,
    resources::{BufDesc, Buffer, DeviceResource},
    storage::{
        BoundedPool, DynamicStorage, GrowthCoalescer, StorageConfig, StorageHandle, StorageKey,
        StoredResource,
    },
};

use crate::{
    light::{DirectionalLight, LightDescriptor, ShapedLight, SphereLight, VirtualLight},
    shape::ShapePointStorage,
};

///Size of one entry of the active light list.
pub const ACTIVE_LL_STRIDE: u64 = std::mem::size_of::<u32>() as u64;

#[derive(Clone, Debug)]
pub struct LightStorageConfig {
    ///Maximum number of lights in the storage at once.
    pub max_lights: usize,
    ///Lights that cast shadows in a single frame, excluding directional lights.
    pub max_active_lights_per_frame: usize,
    ///Also the number of cascade slots, and therefore the maximum number of directional lights.
    pub max_active_directional_lights_per_frame: usize,
    ///Upper bound of the active light list buffer in bytes.
    pub max_ll_buffer_size: u64,
    pub max_shape_points: usize,
    ///Family that initially owns all buffers. Has to support sparse binding.
    pub queue: QueueSelector,
}

impl Default for LightStorageConfig {
    fn default() -> Self {
        LightStorageConfig {
            max_lights: 4096,
            max_active_lights_per_frame: 24,
            max_active_directional_lights_per_frame: 4,
            max_ll_buffer_size: 64 * 1024 * 1024,
            max_shape_points: 16 * 1024,
            queue: QueueSelector::Capabilities(vk::QueueFlags::SPARSE_BINDING),
        }
    }
}

impl LightStorageConfig {
    pub fn total_max_active_lights_per_frame(&self) -> usize {
        self.max_active_lights_per_frame + self.max_active_directional_lights_per_frame
    }
}

///Scene lights on top of a [DynamicStorage] of [LightDescriptor]s.
///
/// Next to the light buffer, the storage maintains the active light list (a sparse buffer of light indices filled by
/// culling on the GPU, together with its counter), the polygon points of shaped lights, and the cascade slots of
/// directional lights. The active light list grows together with the light buffer.
pub struct LightStorage {
    config: LightStorageConfig,
    lights: DynamicStorage<LightDescriptor>,
    active_ll: DeviceResource<Buffer>,
    active_ll_counter: DeviceResource<Buffer>,
    ll_growth: GrowthCoalescer,
    cascades: Arc<BoundedPool>,
    shape_points: ShapePointStorage,
}

impl LightStorage {
    pub fn new<A: Allocator + Send + Sync + 'static>(
        ctx: &Ctx<A>,
        config: LightStorageConfig,
    ) -> Result<Self, ResourceError> {
        let lights = DynamicStorage::new(
            ctx,
            StorageConfig {
                name: "lights",
                max_slots: config.max_lights,
                usage: vk::BufferUsageFlags::STORAGE_BUFFER,
                queue: config.queue,
            },
        )?;

        let active_ll = DeviceResource::new(
            ctx,
            config.queue,
            BufDesc::sparse_storage(config.max_ll_buffer_size),
            MemoryUsage::GpuOnly,
            &SparsePolicy,
            Some("active light list"),
        )?;
        let active_ll_counter = DeviceResource::new(
            ctx,
            config.queue,
            BufDesc::storage(ACTIVE_LL_STRIDE),
            MemoryUsage::GpuOnly,
            &DefaultPolicy,
            Some("active light list counter"),
        )?;
        let shape_points = ShapePointStorage::new(ctx, config.queue, config.max_shape_points)?;

        Ok(LightStorage {
            cascades: Arc::new(BoundedPool::new(
                "directional light cascades",
                config.max_active_directional_lights_per_frame,
            )),
            config,
            lights,
            active_ll,
            active_ll_counter,
            ll_growth: GrowthCoalescer::new(),
            shape_points,
        })
    }

    fn allocate<R: StoredResource<Descriptor = LightDescriptor>>(
        &self,
        light: R,
    ) -> Result<StorageHandle<R>, StorageError> {
        let handle = self.lights.allocate_resource(light)?;
        self.ll_growth.request_growth();
        Ok(handle)
    }

    pub fn allocate_sphere_light(
        &self,
        light: SphereLight,
    ) -> Result<StorageHandle<SphereLight>, StorageError> {
        self.allocate(light)
    }

    pub fn allocate_virtual_light(
        &self,
        light: VirtualLight,
    ) -> Result<StorageHandle<VirtualLight>, StorageError> {
        self.allocate(light)
    }

    ///Allocates a directional light and assigns it a free cascade slot. The slot is given back when the light is erased.
    ///
    /// Fails with [StorageError::SlotExhausted] if all cascade slots are taken. In that case the light storage is not touched.
    pub fn allocate_directional_light(
        &self,
        mut light: DirectionalLight,
    ) -> Result<StorageHandle<DirectionalLight>, StorageError> {
        let reservation = self.cascades.reserve()?;
        light.set_cascade_idx(reservation.index() as u32);
        let mut handle = self.allocate(light)?;
        reservation.commit(&mut handle);
        Ok(handle)
    }

    ///Allocates a shaped light and uploads its polygon to the shape point buffer.
    pub fn allocate_shaped_light(
        &self,
        mut light: ShapedLight,
    ) -> Result<StorageHandle<ShapedLight>, StorageError> {
        let range = self.shape_points.push(light.points())?;
        light.set_shape_range(range);
        self.allocate(light)
    }

    ///Erases `light` from the storage. Returns false if it was already erased or lives in another storage.
    pub fn erase_light<R: StoredResource<Descriptor = LightDescriptor>>(
        &self,
        light: &StorageHandle<R>,
    ) -> bool {
        self.lights.erase(light)
    }

    ///Records the reset of the active light list counter. Has to happen before culling fills the list.
    pub fn clear_active_ll(&self, recorder: &mut CommandRecorder) {
        recorder.fill_buffer(self.active_ll_counter.inner, 0, ACTIVE_LL_STRIDE, 0);
    }

    ///Per-frame update. Records the growth of the active light list and the light buffer, followed by all descriptor
    /// and shape point uploads.
    pub fn update(&self, recorder: &mut CommandRecorder) {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.ll_growth.record_growth(
            recorder,
            self.active_ll.inner,
            ACTIVE_LL_STRIDE,
            self.config.max_ll_buffer_size,
            || self.lights.size() as u64,
        );
        self.lights.update(recorder);
        self.shape_points.update(recorder);
    }

    pub fn config(&self) -> &LightStorageConfig {
        &self.config
    }

    pub fn lights(&self) -> &DynamicStorage<LightDescriptor> {
        &self.lights
    }

    pub fn active_ll(&self) -> &DeviceResource<Buffer> {
        &self.active_ll
    }

    pub fn active_ll_counter(&self) -> &DeviceResource<Buffer> {
        &self.active_ll_counter
    }

    pub fn shape_points(&self) -> &ShapePointStorage {
        &self.shape_points
    }

    pub fn cascades(&self) -> &BoundedPool {
        &self.cascades
    }

    ///Directional lights that currently occupy a cascade slot.
    pub fn active_directional_lights(&self) -> impl Iterator<Item = (usize, StorageKey)> + '_ {
        self.cascades.occupants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use strata::{
        allocator::HeadlessAllocator,
        context::HeadlessConfig,
        recorder::Command,
    };

    const DESC_SIZE: u64 = std::mem::size_of::<LightDescriptor>() as u64;

    fn light_storage() -> LightStorage {
        let ctx = Ctx::<HeadlessAllocator>::headless(HeadlessConfig::default());
        LightStorage::new(&ctx, LightStorageConfig::default()).unwrap()
    }

    fn sphere(i: usize) -> SphereLight {
        SphereLight::new([1.0; 3], 100.0, [i as f32, 0.0, 0.0], 0.25)
    }

    fn sun() -> DirectionalLight {
        DirectionalLight::new([1.0, 0.9, 0.8], 1000.0, 1.5e8, 7e5, [0.0, -1.0, 0.0])
    }

    fn binds_of(recorder: &CommandRecorder, buffer: vk::Buffer) -> Vec<std::ops::Range<u64>> {
        recorder
            .sparse_binds()
            .filter(|(b, _)| *b == buffer)
            .map(|(_, r)| r.clone())
            .collect()
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(LightStorage: Send, Sync);
    }

    #[test]
    fn frame_of_lights() {
        let storage = light_storage();
        let spheres: Vec<_> = (0..24)
            .map(|i| storage.allocate_sphere_light(sphere(i)).unwrap())
            .collect();
        let directional: Vec<_> = (0..4)
            .map(|_| storage.allocate_directional_light(sun()).unwrap())
            .collect();

        let mut cascades: Vec<_> = directional
            .iter()
            .map(|l| l.cascade_idx().unwrap())
            .collect();
        cascades.sort();
        assert_eq!(cascades, vec![0, 1, 2, 3]);

        let mut recorder = CommandRecorder::new(0);
        storage.update(&mut recorder);
        assert_eq!(
            binds_of(&recorder, storage.lights().buffer().inner),
            vec![0..28 * DESC_SIZE]
        );
        assert_eq!(
            binds_of(&recorder, storage.active_ll().inner),
            vec![0..28 * ACTIVE_LL_STRIDE]
        );

        //nothing changed
        let mut recorder = CommandRecorder::new(0);
        storage.update(&mut recorder);
        assert_eq!(recorder.sparse_binds().count(), 0);
        assert!(recorder.is_empty());

        //all cascades taken
        assert!(matches!(
            storage.allocate_directional_light(sun()),
            Err(StorageError::SlotExhausted {
                pool: "directional light cascades",
                capacity: 4
            })
        ));
        assert_eq!(storage.lights().size(), 28);
        assert_eq!(storage.lights().live_count(), 28);
        assert_eq!(storage.cascades().occupied(), 4);

        //freed cascade slot is reused
        let freed = directional[1].cascade_idx().unwrap();
        assert!(storage.erase_light(&directional[1]));
        assert_eq!(storage.cascades().occupied(), 3);
        let reused = storage.allocate_directional_light(sun()).unwrap();
        assert_eq!(reused.cascade_idx(), Some(freed));
        assert_eq!(
            storage.lights().descriptor(reused.key()).unwrap().cascade_idx,
            freed
        );
        assert_eq!(storage.lights().size(), 28);

        let mut recorder = CommandRecorder::new(0);
        storage.update(&mut recorder);
        assert!(binds_of(&recorder, storage.lights().buffer().inner).is_empty());
        drop(spheres);
    }

    #[test]
    fn dropping_directional_light_frees_cascade() {
        let storage = light_storage();
        let light = storage.allocate_directional_light(sun()).unwrap();
        assert_eq!(storage.active_directional_lights().count(), 1);
        assert_eq!(
            storage.active_directional_lights().next(),
            Some((0, light.key()))
        );
        drop(light);
        assert_eq!(storage.cascades().occupied(), 0);
        assert_eq!(storage.lights().live_count(), 0);
    }

    #[test]
    fn erasing_by_key_frees_cascade() {
        let storage = light_storage();
        let light = storage.allocate_directional_light(sun()).unwrap();
        let point = storage.allocate_sphere_light(sphere(0)).unwrap();

        assert!(storage.lights().erase_key(point.key()));
        assert_eq!(storage.cascades().occupied(), 1);

        assert!(storage.lights().erase_key(light.key()));
        assert!(!light.is_valid());
        assert_eq!(storage.cascades().occupied(), 0);
        assert_eq!(storage.active_directional_lights().count(), 0);

        let next = storage.allocate_directional_light(sun()).unwrap();
        assert_eq!(next.cascade_idx(), Some(0));
        //the stale handle must not free the slot of the new light
        drop(light);
        assert_eq!(storage.cascades().occupied(), 1);
    }

    #[test]
    fn shaped_light_points_are_uploaded() {
        let storage = light_storage();
        let square = [
            [-1.0, 0.0, -1.0],
            [1.0, 0.0, -1.0],
            [1.0, 0.0, 1.0],
            [-1.0, 0.0, 1.0],
        ];
        let a = storage
            .allocate_shaped_light(ShapedLight::polygon([1.0; 3], 5.0, [0.0; 3], square))
            .unwrap();
        let b = storage
            .allocate_shaped_light(ShapedLight::polygon([1.0; 3], 5.0, [0.0; 3], square))
            .unwrap();
        assert_eq!(a.shape_range(), 0..4);
        assert_eq!(b.shape_range(), 4..8);
        assert_eq!(storage.lights().descriptor(b.key()).unwrap().shape_offset, 4);

        let mut recorder = CommandRecorder::new(0);
        storage.update(&mut recorder);
        let point_uploads = recorder
            .commands()
            .iter()
            .filter(|c| {
                matches!(c, Command::UpdateBuffer { buffer, .. } if *buffer == storage.shape_points().raw_buffer())
            })
            .count();
        assert_eq!(point_uploads, 1);
    }

    #[test]
    fn clear_records_counter_reset() {
        let storage = light_storage();
        let mut recorder = CommandRecorder::new(0);
        storage.clear_active_ll(&mut recorder);
        assert_eq!(
            recorder.commands(),
            &[Command::FillBuffer {
                buffer: storage.active_ll_counter().inner,
                offset: 0,
                size: ACTIVE_LL_STRIDE,
                data: 0
            }]
        );
    }

    #[test]
    fn total_active_lights() {
        assert_eq!(
            LightStorageConfig::default().total_max_active_lights_per_frame(),
            28
        );
    }
}

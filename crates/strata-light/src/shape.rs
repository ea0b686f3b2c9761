use std::{ops::Range, sync::Mutex};

use strata::{
    StorageError,
    allocator::{Allocator, DefaultPolicy, MemoryUsage},
    ash::vk,
    context::{Ctx, QueueSelector},
    recorder::CommandRecorder,
    resources::{BufDesc, Buffer, DeviceResource},
};

///Size of one point in the shape point buffer. Points are padded to a `vec4`.
pub const POINT_STRIDE: u64 = std::mem::size_of::<[f32; 4]>() as u64;

struct PointList {
    points: Vec<[f32; 4]>,
    uploaded: usize,
}

///Append-only list of polygon points of shaped lights.
///
/// Points are never reclaimed. Erasing a shaped light leaves its points in place.
pub struct ShapePointStorage {
    list: Mutex<PointList>,
    max_points: usize,
    buffer: DeviceResource<Buffer>,
}

impl ShapePointStorage {
    pub fn new<A: Allocator + Send + Sync + 'static>(
        ctx: &Ctx<A>,
        queue: QueueSelector,
        max_points: usize,
    ) -> Result<Self, strata::ResourceError> {
        let buffer = DeviceResource::new(
            ctx,
            queue,
            BufDesc::storage((max_points as u64 * POINT_STRIDE).max(POINT_STRIDE)),
            MemoryUsage::GpuOnly,
            &DefaultPolicy,
            Some("light shape points"),
        )?;
        Ok(ShapePointStorage {
            list: Mutex::new(PointList {
                points: Vec::new(),
                uploaded: 0,
            }),
            max_points,
            buffer,
        })
    }

    ///Appends `points` and returns their range in the point buffer.
    pub fn push(&self, points: &[[f32; 3]]) -> Result<Range<u32>, StorageError> {
        let mut list = self.list.lock().unwrap_or_else(|e| e.into_inner());
        let start = list.points.len();
        if start + points.len() > self.max_points {
            #[cfg(feature = "logging")]
            log::warn!(
                "Shape point buffer is full, can not add {} points to {} of {}",
                points.len(),
                start,
                self.max_points
            );
            return Err(StorageError::SlotExhausted {
                pool: "light shape points",
                capacity: self.max_points,
            });
        }

        list.points
            .extend(points.iter().map(|p| [p[0], p[1], p[2], 0.0]));
        Ok(start as u32..list.points.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.list.lock().unwrap_or_else(|e| e.into_inner()).points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn buffer(&self) -> &DeviceResource<Buffer> {
        &self.buffer
    }

    pub fn raw_buffer(&self) -> vk::Buffer {
        self.buffer.inner
    }

    ///Uploads all points pushed since the last update.
    pub fn update(&self, recorder: &mut CommandRecorder) {
        let mut list = self.list.lock().unwrap_or_else(|e| e.into_inner());
        if list.uploaded == list.points.len() {
            return;
        }
        let offset = list.uploaded as u64 * POINT_STRIDE;
        recorder.update_buffer(
            self.buffer.inner,
            offset,
            bytemuck::cast_slice(&list.points[list.uploaded..]),
        );
        list.uploaded = list.points.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata::{
        allocator::HeadlessAllocator, context::HeadlessConfig, recorder::Command,
    };

    fn points(max: usize) -> ShapePointStorage {
        let ctx = Ctx::<HeadlessAllocator>::headless(HeadlessConfig::default());
        ShapePointStorage::new(&ctx, QueueSelector::Family(0), max).unwrap()
    }

    #[test]
    fn ranges_are_appended() {
        let storage = points(8);
        assert_eq!(storage.push(&[[0.0; 3]; 3]).unwrap(), 0..3);
        assert_eq!(storage.push(&[[1.0; 3]; 4]).unwrap(), 3..7);
        assert!(matches!(
            storage.push(&[[2.0; 3]; 2]),
            Err(StorageError::SlotExhausted { capacity: 8, .. })
        ));
        assert_eq!(storage.len(), 7);
    }

    #[test]
    fn uploads_only_new_points() {
        let storage = points(16);
        let mut recorder = CommandRecorder::new(0);
        storage.update(&mut recorder);
        assert!(recorder.is_empty());

        storage.push(&[[1.0, 2.0, 3.0]; 2]).unwrap();
        storage.update(&mut recorder);
        storage.push(&[[4.0, 5.0, 6.0]]).unwrap();
        storage.update(&mut recorder);

        let uploads: Vec<_> = recorder
            .commands()
            .iter()
            .map(|c| match c {
                Command::UpdateBuffer { offset, data, .. } => (*offset, data.len()),
                other => panic!("unexpected command {:?}", other),
            })
            .collect();
        assert_eq!(uploads, vec![(0, 32), (32, 16)]);
    }
}

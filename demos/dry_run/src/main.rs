//! Drives a light storage on the headless device for a couple of frames and prints the recorded commands.

use std::sync::Arc;

use anyhow::Result;
use strata::{
    allocator::HeadlessAllocator,
    context::{Ctx, HeadlessConfig},
    recorder::{Command, CommandRecorder},
};
use strata_light::{DirectionalLight, LightStorage, LightStorageConfig, ShapedLight, SphereLight};

const GRAPHICS_FAMILY: u32 = 0;
const COMPUTE_FAMILY: u32 = 1;

fn print_commands(frame: usize, recorder: &mut CommandRecorder) {
    for cmd in recorder.take_commands() {
        match cmd {
            Command::UpdateBuffer {
                buffer,
                offset,
                data,
            } => log::info!(
                "[{}] update {:?} @ {}, {} bytes",
                frame,
                buffer,
                offset,
                data.len()
            ),
            other => log::info!("[{}] {:?}", frame, other),
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()?;

    let ctx = Ctx::<HeadlessAllocator>::headless(HeadlessConfig::default());
    let lights = Arc::new(LightStorage::new(&ctx, LightStorageConfig::default())?);

    let sun = lights.allocate_directional_light(DirectionalLight::new(
        [1.0, 0.95, 0.9],
        1000.0,
        1.5e8,
        7e5,
        [0.3, -1.0, 0.1],
    ))?;
    log::info!("sun uses cascade {:?}", sun.cascade_idx());

    let _panel = lights.allocate_shaped_light(ShapedLight::polygon(
        [0.8, 0.8, 1.0],
        50.0,
        [0.0, 4.0, 0.0],
        [
            [-1.0, 0.0, -1.0],
            [1.0, 0.0, -1.0],
            [1.0, 0.0, 1.0],
            [-1.0, 0.0, 1.0],
        ],
    ))?;

    let mut recorder = CommandRecorder::new(GRAPHICS_FAMILY);
    let mut spheres = Vec::new();
    for frame in 0..4 {
        //scene streaming threads
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let lights = lights.clone();
                std::thread::spawn(move || {
                    (0..8)
                        .map(|i| {
                            lights.allocate_sphere_light(SphereLight::new(
                                [1.0, 0.5, 0.2],
                                20.0,
                                [t as f32, frame as f32, i as f32],
                                0.1,
                            ))
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        for worker in workers {
            let handles = worker
                .join()
                .map_err(|_| anyhow::anyhow!("light worker panicked"))??;
            spheres.extend(handles);
        }

        //throw away some of the older lights
        if frame > 1 {
            spheres.drain(..16).for_each(drop);
        }

        lights.update(&mut recorder);
        lights.clear_active_ll(&mut recorder);
        log::info!(
            "frame {}: {} lights live, {} slots, {} backed",
            frame,
            lights.lights().live_count(),
            lights.lights().size(),
            lights.lights().capacity()
        );
        print_commands(frame, &mut recorder);
    }

    //hand the light buffer to async compute for culling, and back again
    let mut compute = CommandRecorder::new(COMPUTE_FAMILY);
    let buffer = lights.lights().buffer();
    for (src, dst) in [(GRAPHICS_FAMILY, COMPUTE_FAMILY), (COMPUTE_FAMILY, GRAPHICS_FAMILY)] {
        let (releasing, acquiring) = if src == GRAPHICS_FAMILY {
            (&mut recorder, &mut compute)
        } else {
            (&mut compute, &mut recorder)
        };
        buffer.transfer_to(dst, releasing, acquiring)?;
        log::info!(
            "light buffer moved from {} to {}, {} barrier(s) on the source",
            src,
            buffer.current_owner(),
            releasing.barriers().buffers.len()
        );
    }
    print_commands(4, &mut recorder);
    print_commands(4, &mut compute);

    Ok(())
}

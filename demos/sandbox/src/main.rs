// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Reflex Sandbox
// Drives the resource manager through a scripted session on a simulated clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use image::{DynamicImage, RgbaImage};
use reflex_control::{ManagerConfig, ManagerPorts, ResourceManager};
use reflex_core::platform::{
    DeviceCapabilities, DeviceTier, ForegroundExecution, PlatformSignal, SystemProbe,
    SystemSample, ThermalState,
};
use reflex_core::ManualClock;
use reflex_data::{ImagePriority, ObjectPool};
use reflex_infra::SysinfoProbe;

const FRAME_TIME: Duration = Duration::from_millis(10);
const SESSION_SECONDS: u32 = 12;

/// Real process readings plus a synthetic ballast the script ramps up.
struct BallastProbe {
    inner: SysinfoProbe,
    ballast_mb: AtomicU64,
}

impl BallastProbe {
    fn set_ballast(&self, mb: u64) {
        self.ballast_mb.store(mb, Ordering::Relaxed);
    }
}

impl SystemProbe for BallastProbe {
    fn sample(&self) -> SystemSample {
        let mut sample = self.inner.sample();
        sample.memory_usage_mb += self.ballast_mb.load(Ordering::Relaxed) as f64;
        sample
    }

    fn thermal_state(&self) -> ThermalState {
        self.inner.thermal_state()
    }
}

fn stock_cache(manager: &ResourceManager) {
    let cache = manager.image_cache();
    let mut cache = cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    for i in 0..12 {
        let priority = match i % 3 {
            0 => ImagePriority::Low,
            1 => ImagePriority::Normal,
            _ => ImagePriority::High,
        };
        let image = DynamicImage::ImageRgba8(RgbaImage::new(256, 256));
        cache.cache_image(format!("thumbnail-{i}"), image, priority);
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let clock = Arc::new(ManualClock::new());
    let probe = Arc::new(BallastProbe {
        inner: SysinfoProbe::new(),
        ballast_mb: AtomicU64::new(0),
    });
    log::info!("Host thermal state: {:?}", probe.thermal_state());

    let mut manager = ResourceManager::new(
        ManagerConfig::default(),
        DeviceCapabilities {
            max_refresh_rate: 120,
            tier: DeviceTier::High,
        },
        ManagerPorts {
            probe: probe.clone(),
            background: Arc::new(ForegroundExecution),
            clock: clock.clone(),
        },
    );
    let events = manager.subscribe();

    let scratch = manager.register_pool(
        ObjectPool::new("scratch-buffers", 32, || Vec::<u8>::with_capacity(16 * 1024))
            .with_reset(|buffer: &mut Vec<u8>| buffer.clear()),
    )?;
    stock_cache(&manager);

    let signals = manager.signal_sender();
    let mut held = Vec::new();

    for second in 0..SESSION_SECONDS {
        match second {
            2 => {
                manager.register_effect("particles");
                manager.register_effect("parallax");
                manager
                    .monitor_mut()
                    .register_effects((0..40).map(|i| format!("shimmer-{i}")));
            }
            4 => probe.set_ballast(600),
            5 => {
                // OS notifications arrive on their own thread.
                let signals = signals.clone();
                thread::spawn(move || {
                    let _ = signals.send(PlatformSignal::ThermalStateChanged(ThermalState::Serious));
                })
                .join()
                .map_err(|_| anyhow::anyhow!("signal thread panicked"))?;
            }
            7 => probe.set_ballast(900),
            8 => signals
                .send(PlatformSignal::LowMemory)
                .map_err(|e| anyhow::anyhow!("signal channel closed: {e}"))?,
            9 => {
                probe.set_ballast(0);
                for i in 0..40 {
                    manager.unregister_effect(&format!("shimmer-{i}"));
                }
            }
            _ => {}
        }

        let frames = Duration::from_secs(1).as_millis() / FRAME_TIME.as_millis();
        for frame in 0..frames {
            clock.advance(FRAME_TIME);
            manager.on_frame();

            if frame % 10 == 0 {
                let mut pool = scratch.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let buffer = pool.acquire();
                if held.len() < 4 {
                    held.push(buffer);
                } else {
                    pool.release(buffer);
                }
            }
        }
        manager.tick();
    }

    if manager.is_cleaning_up() {
        manager.wait_for_cleanup(Duration::from_secs(1));
    }

    println!("--- events ---");
    for event in events.try_iter() {
        println!("{}", serde_json::to_string(&event)?);
    }

    println!("--- performance ---");
    println!(
        "{}",
        serde_json::to_string_pretty(&manager.performance_metrics())?
    );
    println!("--- memory ---");
    println!("{}", serde_json::to_string_pretty(&manager.memory_metrics())?);

    let mut pool = scratch.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    for buffer in held.drain(..) {
        pool.release(buffer);
    }
    log::info!("Scratch pool: {:?}", pool.stats());

    Ok(())
}

//! Process-wide engine instance.
//!
//! One lock guards every access. Calls are not re-entrant: calling back into this module from
//! inside [`with_engine`] deadlocks.

use std::sync::{Mutex, MutexGuard};

use crate::{
    engine::api::Engine,
    foundation::config::EngineConfig,
    foundation::error::{RestoreError, RestoreResult},
    graphics::device::GraphicsDevice,
};

/// Device type held by the process-wide engine.
pub type SharedDevice = Box<dyn GraphicsDevice + Send>;

static ENGINE: Mutex<Option<Engine<SharedDevice>>> = Mutex::new(None);

fn lock() -> RestoreResult<MutexGuard<'static, Option<Engine<SharedDevice>>>> {
    ENGINE
        .lock()
        .map_err(|_| RestoreError::invariant("global engine lock poisoned"))
}

/// Install the process-wide engine. Fails if one is already installed.
pub fn init(device: SharedDevice, config: EngineConfig) -> RestoreResult<()> {
    let mut slot = lock()?;
    if slot.is_some() {
        return Err(RestoreError::Other(anyhow::anyhow!(
            "global engine is already initialized"
        )));
    }
    *slot = Some(Engine::new(device, config));
    tracing::debug!("global engine initialized");
    Ok(())
}

/// Tear down the process-wide engine, returning its device. `None` if nothing was installed.
pub fn shutdown() -> RestoreResult<Option<SharedDevice>> {
    let engine = lock()?.take();
    if engine.is_some() {
        tracing::debug!("global engine shut down");
    }
    Ok(engine.map(Engine::into_device))
}

pub fn is_initialized() -> bool {
    ENGINE.lock().map(|slot| slot.is_some()).unwrap_or(false)
}

/// Run `f` against the process-wide engine.
pub fn with_engine<R>(
    f: impl FnOnce(&mut Engine<SharedDevice>) -> RestoreResult<R>,
) -> RestoreResult<R> {
    let mut slot = lock()?;
    let engine = slot.as_mut().ok_or_else(|| {
        RestoreError::Other(anyhow::anyhow!("global engine is not initialized"))
    })?;
    f(engine)
}

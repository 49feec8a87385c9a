//! Deferred deallocation for retired voices.
//!
//! Voices travel to the audio thread as `basedrop::Owned`, so dropping one
//! there (removal, or an add that finds the mixer full) only pushes a
//! pointer onto the collector's queue. A background thread sweeps that
//! queue and runs the real destructors where latency does not matter.

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// Sweep cadence. Retired voices are small, so reclaiming them within a
/// tenth of a second is plenty.
const GC_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Allocation handle for `Owned<T>` voices. Spawns the collector thread on
/// first use; cheap to clone after that.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(spawn_collector).clone()
}

fn spawn_collector() -> Handle {
    // Collector is !Sync, so the sweep thread owns it outright and only a
    // Handle crosses back over the channel.
    let (handle_tx, handle_rx) = mpsc::channel();

    thread::Builder::new()
        .name("sonor-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            if handle_tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("voice collector running");
            sweep_forever(&mut collector);
        })
        .expect("failed to spawn voice collector thread");

    handle_rx
        .recv()
        .expect("voice collector thread died before handing out its handle")
}

fn sweep_forever(collector: &mut Collector) {
    loop {
        collector.collect();
        thread::sleep(GC_INTERVAL);
    }
}

/*!
 * Mempool - Synthetic Frame Workload
 *
 * Drives an arena the way a frame-processing pipeline does:
 * - Image buffers in the catch-all range, one per frame
 * - Scratch arrays of mixed sizes, freed out of order
 * - One header record per frame, shared by every amplifier segment
 *
 * Finishes with a merge pass and prints the statistics report.
 */

use astro_mempool::core::limits::WORKLOAD_SLAB_SIZE;
use astro_mempool::{init_tracing, span_phase, Arena, ArenaConfig, DefragMode, MemoryResult};
use std::ptr::NonNull;
use tracing::{info, warn};

const FRAMES: usize = 8;
const IMAGE_SIDE: usize = 256;
const SCRATCH_PER_FRAME: usize = 24;
const AMPLIFIERS: usize = 4;
const HEADER_RECORD_BYTES: usize = 720;

/// Deterministic scratch sizes, so runs are comparable
struct SizeStream(u64);

impl SizeStream {
    fn next(&mut self) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        16 + (self.0 >> 33) as usize % 6000
    }
}

fn main() -> miette::Result<()> {
    init_tracing();

    let mut config = ArenaConfig::from_env()?;
    if config.minimum_slab_size == 0 {
        config.minimum_slab_size = WORKLOAD_SLAB_SIZE;
    }
    info!(
        minimum_slab_size = config.minimum_slab_size,
        serial_threshold = ?config.serial_threshold,
        "Mempool workload starting"
    );

    let mut arena = Arena::from_config(&config)?;
    let mut sizes = SizeStream(0x5EED);
    for frame in 0..FRAMES {
        process_frame(&mut arena, frame, &mut sizes)?;
    }

    let leaked = arena.live_blocks();
    if !leaked.is_empty() {
        warn!(count = leaked.len(), "blocks still live after workload");
    }
    arena.check_all()?;

    let report = {
        let _phase = span_phase("defragment");
        arena.defragment(DefragMode::Merge)?
    };
    info!(
        absorbed = report.absorbed,
        reattached = report.reattached,
        "Workload complete"
    );

    println!("{}", arena.stats());
    Ok(())
}

fn process_frame(arena: &mut Arena, frame: usize, sizes: &mut SizeStream) -> MemoryResult<()> {
    let phase = span_phase("frame");
    let _entered = phase.enter();

    let pixels = IMAGE_SIDE * IMAGE_SIDE;
    let image = arena.allocate_zeroed(pixels, std::mem::size_of::<u16>())?;
    let header = arena.allocate(HEADER_RECORD_BYTES)?;

    if let Some(header) = header {
        arena.payload_mut(header)?.fill(frame as u8);
        // Every amplifier segment holds the header until it is done
        for _ in 0..AMPLIFIERS {
            arena.reference(header)?;
        }
    }

    let mut scratch: Vec<Option<NonNull<u8>>> = (0..SCRATCH_PER_FRAME)
        .map(|_| arena.allocate(sizes.next()))
        .collect::<MemoryResult<_>>()?;

    if let Some(image) = image {
        let buffer = arena.payload_mut(image)?;
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let checksum: u64 = arena.payload(image)?.iter().map(|&b| b as u64).sum();
        info!(frame, checksum, "image buffer filled");
    }

    // Odd scratch arrays first, then the rest
    for index in (1..scratch.len()).step_by(2) {
        arena.release(scratch[index].take())?;
    }
    for _ in 0..AMPLIFIERS {
        arena.unreference(header)?;
    }
    for ptr in scratch {
        arena.release(ptr)?;
    }
    arena.release(header)?;
    arena.release(image)?;

    phase.record_blocks(SCRATCH_PER_FRAME + 2);
    Ok(())
}

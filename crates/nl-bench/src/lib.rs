//! Seeded allocation workloads for benchmarking the nl runtime.
//!
//! - [`generate`]: deterministic mix of object/slice allocations and
//!   releases, driven by a ChaCha8 RNG.
//! - [`replay`]: run a workload against any [`RuntimeAllocator`].

#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use nl_runtime::{AllocError, ObjectRef, RawHeap, RuntimeAllocator, SliceRef};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// One allocation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// `allocate_object(size)`.
    Object {
        /// Size in bytes.
        size: usize,
    },
    /// `allocate_slice(length, element_size)`.
    Slice {
        /// Element count.
        length: usize,
        /// Bytes per element.
        element_size: usize,
    },
}

/// One step of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Allocate and keep the block live.
    Allocate(Request),
    /// Release the live block at this index (modulo the live count).
    Release(usize),
}

/// Shape of a generated workload.
#[derive(Clone, Debug)]
pub struct WorkloadShape {
    /// Number of steps.
    pub steps: usize,
    /// Upper bound on simultaneously live blocks.
    pub max_live: usize,
    /// Largest object size in bytes.
    pub max_object_size: usize,
    /// Largest slice length.
    pub max_length: usize,
    /// Largest element size in bytes.
    pub max_element_size: usize,
    /// Share of allocations that are slices.
    pub slice_ratio: f64,
    /// Chance of releasing when both allocating and releasing are possible.
    pub release_ratio: f64,
}

impl WorkloadShape {
    /// Mostly small slices of short strings and word arrays, as compiled
    /// programs produce.
    pub fn compiler_like(steps: usize) -> Self {
        Self {
            steps,
            max_live: 256,
            max_object_size: 64,
            max_length: 64,
            max_element_size: 8,
            slice_ratio: 0.75,
            release_ratio: 0.45,
        }
    }
}

/// Generate a deterministic workload for `shape` from `seed`.
pub fn generate(shape: &WorkloadShape, seed: u64) -> Vec<Step> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut live = 0usize;
    let mut steps = Vec::with_capacity(shape.steps);

    for _ in 0..shape.steps {
        let release = match live {
            0 => false,
            n if n >= shape.max_live => true,
            _ => rng.random_bool(shape.release_ratio),
        };
        if release {
            steps.push(Step::Release(rng.random_range(0..live)));
            live -= 1;
            continue;
        }
        let request = if rng.random_bool(shape.slice_ratio) {
            Request::Slice {
                length: rng.random_range(0..=shape.max_length),
                element_size: rng.random_range(1..=shape.max_element_size.max(1)),
            }
        } else {
            Request::Object {
                size: rng.random_range(1..=shape.max_object_size.max(1)),
            }
        };
        steps.push(Step::Allocate(request));
        live += 1;
    }
    steps
}

/// Counters from one [`replay`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Blocks allocated.
    pub allocations: usize,
    /// Blocks released, including the final drain.
    pub releases: usize,
    /// Largest number of simultaneously live blocks.
    pub peak_live: usize,
}

enum Live {
    Object(ObjectRef, usize),
    Slice(SliceRef, usize),
}

/// Run `steps` against `rt`, releasing every block still live at the end.
///
/// On any failure the run stops, every block still live is released, and
/// the first error is returned.
#[allow(unsafe_code)]
pub fn replay<H: RawHeap>(
    rt: &RuntimeAllocator<H>,
    steps: &[Step],
) -> Result<ReplayReport, AllocError> {
    let mut live: Vec<Live> = Vec::new();
    let mut report = ReplayReport::default();

    let release = |block: Live| -> Result<(), AllocError> {
        // SAFETY: each block is removed from `live` before release, so it is
        // released exactly once with the size it was allocated with.
        unsafe {
            match block {
                Live::Object(obj, size) => rt.release_object(obj, size),
                Live::Slice(slice, element_size) => rt.release_slice(slice, element_size),
            }
        }
    };

    let mut outcome = Ok(());
    for step in steps {
        match *step {
            Step::Allocate(request) => {
                let block = match request {
                    Request::Object { size } => rt.allocate_object(size).map(|o| Live::Object(o, size)),
                    Request::Slice {
                        length,
                        element_size,
                    } => rt
                        .allocate_slice(length, element_size)
                        .map(|s| Live::Slice(s, element_size)),
                };
                match block {
                    Ok(block) => {
                        live.push(block);
                        report.allocations += 1;
                        report.peak_live = report.peak_live.max(live.len());
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            Step::Release(index) if !live.is_empty() => {
                let block = live.swap_remove(index % live.len());
                if let Err(e) = release(block) {
                    outcome = Err(e);
                    break;
                }
                report.releases += 1;
            }
            Step::Release(_) => {}
        }
    }

    for block in live.drain(..) {
        match release(block) {
            Ok(()) => report.releases += 1,
            Err(e) => {
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
    }
    outcome.map(|()| report)
}

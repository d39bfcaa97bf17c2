pub mod binning;
pub mod builder;
pub mod geometry;
pub mod parallel;
pub mod primitives;
pub mod scene;
pub mod settings;
mod util;

pub use binning::{BinInfo, Mapping, Split};
pub use builder::{Bvh, BvhStatistics};
pub use parallel::{ParallelBinner, TaskPool, WorkerCount};
pub use primitives::{BuildRecord, PrimInfo, PrimRef};
pub use settings::{BuildSettings, SettingsError};
pub use util::Stats;

use std::time::Instant;

use anyhow::Context as _;
use sahsplit::{BuildSettings, Bvh, scene::random_boxes};

fn parse_arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match args.get(index) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("Invalid argument #{index}: {arg:?}")),
        None => Ok(default),
    }
}

fn build(name: &str, prims: Vec<sahsplit::PrimRef>, settings: &BuildSettings) -> Bvh {
    let start = Instant::now();
    let bvh = Bvh::build(prims, settings);
    let elapsed = start.elapsed();

    bvh.validate();
    let stats = bvh.statistics();
    log::info!("{name} build: {elapsed:.1?}");
    log::info!("  Depth: {}", stats.depth);
    log::info!("  Leaf size: {}", stats.leaf_size);
    log::info!(
        "  {} inner nodes, {} leaves, {} fallback splits",
        stats.inner_nodes,
        stats.leaves,
        bvh.fallback_splits()
    );
    bvh
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let count: usize = parse_arg(&args, 1, 1_000_000)?;
    let seed: u64 = parse_arg(&args, 2, 0)?;

    log::info!("Generating {count} random boxes (seed {seed})");
    let prims = random_boxes(count, 0.5, seed);

    let serial_settings = BuildSettings::builder()
        .parallel_threshold(usize::MAX)
        .build()?;
    let parallel_settings = BuildSettings::builder().build()?;
    log::info!(
        "Parallel build uses {} tasks",
        parallel_settings.task_pool().num_tasks()
    );

    let serial = build("Serial", prims.clone(), &serial_settings);
    let parallel = build("Parallel", prims, &parallel_settings);

    anyhow::ensure!(
        serial.nodes().len() == parallel.nodes().len(),
        "Serial and parallel builds differ: {} vs {} nodes",
        serial.nodes().len(),
        parallel.nodes().len()
    );

    Ok(())
}

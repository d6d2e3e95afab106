use gnat::data::Descriptor;
use gnat::database::DescriptorFile;
use gnat::metric::MetricKind;
use gnat::query::{linear_neighbor, linear_query};
use gnat::tree::Gnat;

use glob::glob;
use log::{error, info};
use rand::prelude::*;
use std::time::Instant;

use clap::Parser;
#[derive(Parser, Debug)] #[command(author, version, about, long_about = None)]
struct Args {

    //Glob of tree directories written by the builder
    #[arg(short, long)]
    directory_pattern: String,

    #[arg(short, long, default_value_t = 10)]
    num_queries: usize,

    //Radius for range queries
    #[arg(short, long, default_value_t = 0.5)]
    radius: f64,

    //Also run brute force scans and compare
    #[arg(short, long, default_value_t = false)]
    verify: bool,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

type Tree = Gnat<DescriptorFile, MetricKind>;

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> BoxResult<()> {

    env_logger::init();

    let args = Args::parse();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut num_mismatches: usize = 0;

    for dirname in glob(&args.directory_pattern)? {

        let directory = dirname?.to_string_lossy().to_string();

        let start = Instant::now();
        let (tree, config) = Tree::read_from_directory(&directory)?;
        info!("{}: loaded {} nodes in {}", &directory, tree.num_nodes(), start.elapsed().as_secs_f64());

        for _ in 0..args.num_queries {

            let data = (0..config.dim).map(|_| rng.gen::<f32>()).collect();
            let descriptor = Descriptor::from_vec(data);

            num_mismatches += param_sweep(&directory, &tree, &descriptor, args.radius, args.verify)?;
        }
    }

    match num_mismatches {
        0 => Ok(()),
        n => Err(format!("{} queries disagreed with a linear scan", n).into()),
    }
}

/// Times one range query and a handful of k-nn queries, returns the number of disagreements
fn param_sweep(directory: &str, tree: &Tree, descriptor: &Descriptor, radius: f64, verify: bool) -> BoxResult<usize> {

    let mut num_mismatches: usize = 0;

    let start = Instant::now();
    let hits = tree.query(descriptor, radius)?;
    info!("{} range {}: {} hits in {}", directory, radius, hits.len(), start.elapsed().as_secs_f64());

    if verify {
        let start = Instant::now();
        let expected = linear_query(tree.database(), tree.metric(), descriptor, radius)?;
        info!("{} linear range {}: {}", directory, radius, start.elapsed().as_secs_f64());

        if expected != hits {
            error!("{}: range query returned {} keys, linear scan {}", directory, hits.len(), expected.len());
            num_mismatches += 1;
        }
    }

    for nn in [1, 10, 100, 1000].into_iter() {

        let start = Instant::now();
        let neighbors = tree.nearest_neighbors(descriptor, nn)?;
        info!("{} {}: {}", directory, nn, start.elapsed().as_secs_f64());

        if verify && nn == 1 {
            let expected = linear_neighbor(tree.database(), tree.metric(), descriptor)?;
            let found = neighbors.neighbors.first().copied();

            if expected.map(|n| n.distance) != found.map(|n| n.distance) {
                error!("{}: nearest neighbor {:?}, linear scan {:?}", directory, found, expected);
                num_mismatches += 1;
            }
        }
    }

    return Ok(num_mismatches);
}

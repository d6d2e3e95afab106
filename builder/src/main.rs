use gnat::data::Descriptor;
use gnat::database::DescriptorFile;
use gnat::metric::MetricKind;
use gnat::tree::{Gnat, GnatConfig};

use kdam::tqdm;
use glob::glob;
use log::{info, warn};
use rand::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufRead};
use std::path::Path;


// The output is wrapped in a Result to allow matching on errors
// Returns an Iterator to the Reader of the lines of the file.
fn read_lines<P>(filename: P) -> io::Result<io::Lines<io::BufReader<File>>>
where P: AsRef<Path>, {
    let file = File::open(filename)?;
    Ok(io::BufReader::new(file).lines())
}


use clap::Parser;
#[derive(Parser, Debug)] #[command(author, version, about, long_about = None)]
struct Args {

    //Which task to carry out: build_from_files or build_random
    #[arg(short, long, default_value = "build_from_files")]
    task: String,

    //Glob of csv files, one descriptor per line, if task is build_from_files
    #[arg(short, long)]
    input_pattern: Option<String>,

    //Number of random descriptors if task is build_random
    #[arg(short, long, default_value_t = 100000)]
    num_records: usize,

    //Directory the tree is written to
    #[arg(short, long)]
    output_dirname: String,

    //Descriptor length
    #[arg(short, long, default_value_t = 8)]
    dim: usize,

    #[arg(short, long, default_value_t = 8)]
    branch_factor: usize,

    #[arg(short, long, default_value_t = 16)]
    leaf_capacity: usize,

    //euclidean or chebyshev
    #[arg(short, long, default_value = "euclidean")]
    metric: String,

    //Remove the output directory first if it already exists
    #[arg(short, long, default_value_t = false)]
    force: bool,

    //Seed for build_random
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> BoxResult<()> {

    env_logger::init();

    let args = Args::parse();
    info!("{:?}", &args);

    let config = config_from_args(&args)?;

    let database = match args.task.as_str() {
        "build_from_files" => {
            let pattern = args.input_pattern.clone().ok_or("build_from_files needs --input-pattern")?;
            build_from_files(&config, &pattern, args.force)?
        },
        "build_random" => build_random(&config, args.num_records, args.seed, args.force)?,
        _ => return Err(format!("Unknown task: {}", args.task).into()),
    };

    info!("building tree over {} descriptors", database.num_entries());

    let gnat = Gnat::build_with_config(database, config.metric, &config)?;
    gnat.write_to_directory(&config)?;

    let stats = gnat.stats()?;
    info!("wrote {} nodes ({} internal, {} leaves, depth {}) to {}",
        stats.num_nodes, stats.num_internal, stats.num_leaves, stats.max_depth, config.directory);

    Ok(())
}

fn config_from_args(args: &Args) -> BoxResult<GnatConfig> {

    let metric = match args.metric.as_str() {
        "euclidean" => MetricKind::Euclidean,
        "chebyshev" => MetricKind::Chebyshev,
        other => return Err(format!("Unknown metric: {}", other).into()),
    };

    let config = GnatConfig {
        directory: args.output_dirname.clone(),
        dim: args.dim,
        branch_factor: args.branch_factor,
        leaf_capacity: args.leaf_capacity,
        metric,
    };

    config.validate()?;

    return Ok(config);
}

fn create_directory(config: &GnatConfig, force: bool) -> BoxResult<DescriptorFile> {

    let dir_path = Path::new(&config.directory);

    if dir_path.is_dir() {
        match force {
            true => fs::remove_dir_all(dir_path)?,
            false => return Err(format!("Directory already exists: {}", config.directory).into()),
        }
    }

    fs::create_dir_all(dir_path)?;

    let database = DescriptorFile::create(config.get_database_filename(), config.dim)?;

    return Ok(database);
}

fn build_from_files(config: &GnatConfig, pattern: &str, force: bool) -> BoxResult<DescriptorFile> {

    let mut database = create_directory(config, force)?;

    let mut filenames = Vec::new();
    for entry in glob(pattern)? {
        filenames.push(entry?);
    }
    filenames.sort();

    if filenames.is_empty() {
        warn!("no input files match {}", pattern);
    }

    for filename in filenames.iter() {

        info!("reading {:?}", filename);

        let mut num_skipped: usize = 0;

        for (i, line) in tqdm!(read_lines(filename)?.enumerate()) {

            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match Descriptor::from_csv_line(&line, config.dim) {
                Ok(descriptor) => {
                    database.add_descriptor(&descriptor)?;
                },
                Err(e) => {
                    warn!("Skipping line {} of {:?}: {}", i + 1, filename, e);
                    num_skipped += 1;
                },
            }
        }

        info!("{:?}: {} lines skipped", filename, num_skipped);
    }

    return Ok(database);
}

fn build_random(config: &GnatConfig, num_records: usize, seed: u64, force: bool) -> BoxResult<DescriptorFile> {

    let mut database = create_directory(config, force)?;

    let mut rng = StdRng::seed_from_u64(seed);

    for _ in tqdm!(0..num_records) {
        let data: Vec<f32> = (0..config.dim).map(|_| rng.gen::<f32>()).collect();
        database.add_descriptor(&Descriptor::from_vec(data))?;
    }

    return Ok(database);
}

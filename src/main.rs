use clap::{App, Arg};
use methmix::em::{self, EmConfig};
use methmix::gen_data::{self, SimConfig};
use methmix::Model;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
#[macro_use]
extern crate log;
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("methmix")
        .version("0.1")
        .author("Bansho Masutani")
        .about("Simulate a methylation mixture and estimate its cell type proportions.")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("proportions")
                .long("proportions")
                .short("p")
                .takes_value(true)
                .default_value("0.5,0.3,0.2")
                .help("True cell type proportions, comma separated."),
        )
        .arg(
            Arg::with_name("windows")
                .long("windows")
                .takes_value(true)
                .default_value("100")
                .help("Number of windows."),
        )
        .arg(
            Arg::with_name("reads")
                .long("reads")
                .takes_value(true)
                .default_value("20")
                .help("Number of reads in a window."),
        )
        .arg(
            Arg::with_name("sites")
                .long("sites")
                .takes_value(true)
                .default_value("8")
                .help("Number of CpG sites in a window."),
        )
        .arg(
            Arg::with_name("missing_rate")
                .long("missing_rate")
                .takes_value(true)
                .default_value("0.05")
                .help("Probability of a no-value call."),
        )
        .arg(
            Arg::with_name("num_iterations")
                .long("num_iterations")
                .takes_value(true)
                .default_value("50")
                .help("Maximum number of EM iterations."),
        )
        .arg(
            Arg::with_name("convergence_criteria")
                .long("convergence_criteria")
                .takes_value(true)
                .default_value("0.001")
                .help("Stop when the relative change of the proportions gets below this value."),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .default_value("32389")
                .help("Seed"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .default_value("1")
                .help("Number of threads"),
        )
        .get_matches();
    let level = match matches.occurrences_of("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let threads: usize = matches.value_of("threads").unwrap().parse()?;
    if let Err(why) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        debug!("{:?}", why);
    }
    let proportions = matches
        .value_of("proportions")
        .unwrap()
        .split(',')
        .map(|x| x.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    let num_windows: usize = matches.value_of("windows").unwrap().parse()?;
    let num_reads: usize = matches.value_of("reads").unwrap().parse()?;
    let num_sites: usize = matches.value_of("sites").unwrap().parse()?;
    let missing_rate: f64 = matches.value_of("missing_rate").unwrap().parse()?;
    let num_iterations: usize = matches.value_of("num_iterations").unwrap().parse()?;
    let convergence_criteria: f64 = matches.value_of("convergence_criteria").unwrap().parse()?;
    let seed: u64 = matches.value_of("seed").unwrap().parse()?;
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
    let sim_config = SimConfig::new(proportions.clone())
        .with_size(num_windows, num_reads, num_sites)
        .with_missing_rate(missing_rate);
    let sample = gen_data::generate(&mut rng, &sim_config)?;
    debug!("Start");
    let model = Model::new(&sample.windows)?;
    let config = EmConfig::new(num_iterations, convergence_criteria).with_seed(seed);
    let result = em::run(&model, &config)?;
    info!(
        "{:?} at iteration {}. Log-likelihood = {:.3}",
        result.status,
        result.iterations,
        result.log_likelihoods.last().copied().unwrap_or(0f64)
    );
    println!("cell_type\ttrue\testimated");
    for (t, (truth, estimated)) in proportions.iter().zip(result.alpha.iter()).enumerate() {
        println!("{}\t{:.4}\t{:.4}", t, truth, estimated);
    }
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;

use extdd::bdd::{Bdd, Engine};
use extdd::config::Config;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of queens.
    #[arg(value_name = "INT", default_value = "6")]
    n: u64,

    /// Memory budget of a single operation (in MiB).
    #[clap(long, value_name = "INT", default_value = "64")]
    memory: usize,

    /// Number of levels kept in priority queue buckets.
    #[clap(long, value_name = "INT", default_value = "1")]
    buckets: usize,

    /// Directory for temporary files.
    #[clap(long, value_name = "DIR")]
    tmp_dir: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let engine = Engine::new(Config {
        memory: args.memory << 20,
        buckets: args.buckets,
        tmp_dir: args.tmp_dir.clone(),
        ..Config::default()
    })?;
    println!("engine = {:?}", engine);

    // Encode N-queens problem, the square (i, j) is the variable i * n + j:
    // - at least one queen per row
    // - no two queens attack each other
    let n = args.n;
    println!("Encoding n-queens problem with n = {}", n);
    let var = |i: u64, j: u64| i * n + j;

    let mut constraints: Vec<Bdd> = vec![];

    for i in 0..n {
        let row: Vec<u64> = (0..n).map(|j| var(i, j)).collect();
        constraints.push(engine.or_labels(&row)?);
    }

    for i in 0..n {
        for j in 0..n {
            for k in i..n {
                for l in 0..n {
                    let (a, b) = (var(i, j), var(k, l));
                    if a >= b {
                        continue;
                    }
                    let attacks = i == k || j == l || i + l == k + j || i + j == k + l;
                    if attacks {
                        // !(x_a & x_b)
                        constraints.push(!engine.and_labels(&[a, b])?);
                    }
                }
            }
        }
    }

    println!("Total {} constraints", constraints.len());

    println!("Merging constraints...");
    let res = engine.apply_and_many(constraints.iter())?;
    println!("res = {}", res);

    let solutions = engine.sat_count(&res, n * n)?;
    println!("{} solutions", solutions);
    if let Some(model) = engine.any_sat(&res)? {
        for a in model.iter().filter(|a| a.value) {
            println!("queen at ({}, {})", a.label / n, a.label % n);
        }
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}

#[macro_use]
extern crate error_chain;
extern crate blockcov;
extern crate env_logger;
extern crate serde_json;

use blockcov::{asm, Collector, Instrumenter, Result};

use std::env;
use std::io::stdout;

quick_main!(run);

fn run() -> Result<()> {
    env_logger::init();

    let filename = env::args_os().nth(1).expect("filename");
    let mut methods = asm::open(filename)?;
    let collector = Collector::default();
    let coverage = Instrumenter::new(&collector)
        .instrument_all(&mut methods)
        .into_iter()
        .filter_map(|outcome| outcome.ok())
        .collect::<Vec<_>>();
    serde_json::to_writer_pretty(stdout(), &coverage)?;
    Ok(())
}

#[macro_use]
extern crate clap;
#[macro_use]
extern crate error_chain;
extern crate blockcov;
extern crate env_logger;

use blockcov::block::EntryReason;
use blockcov::{asm, Collector, Config, Instrumenter, Result};

use std::path::PathBuf;

quick_main!(run);

fn run() -> Result<()> {
    env_logger::init();

    let matches = clap_app!(save =>
        (about: "Instruments methods, pretends each of them is called, and saves the counts")
        (@arg output: -o --output +takes_value "Write the counts to this file instead of BLOCKCOV_OUTPUT")
        (@arg calls: -n --calls +takes_value "Number of calls of each method [default: 1]")
        (@arg file: <FILE> "Method bodies in text form")
    ).get_matches();

    let calls = value_t!(matches, "calls", u64).unwrap_or(1);
    let mut config = Config::from_env();
    if let Some(output) = matches.value_of_os("output") {
        config.output = Some(PathBuf::from(output));
    }
    let collector = Collector::new(config);

    let mut methods = asm::open(matches.value_of_os("file").expect("file"))?;
    let outcomes = Instrumenter::new(&collector).instrument_all(&mut methods);
    let coverage = outcomes.into_iter().filter_map(|o| o.ok()).collect::<Vec<_>>();

    for method in &coverage {
        for entry in method.entries.iter().filter(|e| e.reason == EntryReason::MethodEntry) {
            for _ in 0..calls {
                collector.hit(entry.slot);
            }
        }
    }

    let snapshot = collector.save_results();
    for method in &coverage {
        let summary = method.summary(&snapshot);
        println!(
            "{}: {}/{} blocks, {}/{} entries, called {} times",
            method.name,
            summary.blocks_executed,
            summary.blocks_count,
            summary.entries_hit,
            summary.entries_count,
            summary.entry_count,
        );
    }
    Ok(())
}

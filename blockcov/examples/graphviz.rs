#[macro_use]
extern crate clap;
#[macro_use]
extern crate error_chain;
extern crate blockcov;
extern crate env_logger;

use blockcov::builder::build;
use blockcov::offsets::Offsets;
use blockcov::resolve::resolve;
use blockcov::{asm, BlockGraph, Result};

use std::io::stdout;

quick_main!(run);

fn run() -> Result<()> {
    env_logger::init();

    let matches = clap_app!(graphviz =>
        (@arg analyze: -a --analyze "Mark blocks unreachable from the entry and the handlers")
        (@arg filter: -f --filter +takes_value "Only produce the graph of this method")
        (@arg file: <FILE> "Method bodies in text form")
    ).get_matches();

    let methods = asm::open(matches.value_of_os("file").expect("file"))?;
    let filter = matches.value_of("filter");
    for method in methods.iter().filter(|m| filter.map_or(true, |f| f == m.name)) {
        let offsets = Offsets::compute(&method.insns);
        let cfg = resolve(build(&method.insns, &method.handlers, &offsets)?, &offsets)?;
        let mut graph = BlockGraph::new(&cfg);
        if matches.is_present("analyze") {
            graph.mark_unreachable();
        }
        graph.write_dot(&method.name, stdout())?;
    }
    Ok(())
}

use std::sync::Arc;

use arrrg::CommandLine;
use indicio::stdio::StdioEmitter;
use indicio::{clue, ALWAYS, INFO};

use tabledump::{dump, DumpOptions, COLLECTOR};

#[derive(Clone, Debug, Default, Eq, PartialEq, arrrg_derive::CommandLine)]
struct TableDumpOptions {
    #[arrrg(nested)]
    dump: DumpOptions,
    #[arrrg(flag, "Log what the dump does to stderr.")]
    verbose: bool,
}

fn main() {
    let (options, tables) =
        TableDumpOptions::from_command_line("Usage: table-dump [OPTIONS] [TABLES]");
    // indicio
    if options.verbose {
        let emitter = Arc::new(StdioEmitter);
        COLLECTOR.register(emitter);
        COLLECTOR.set_verbosity(INFO);
        clue!(COLLECTOR, ALWAYS, {
            new_process: std::env::args().map(String::from).collect::<Vec<_>>(),
        });
    }
    // dump each table in turn
    let stdout = std::io::stdout();
    let mut failed = false;
    for table in tables {
        let mut out = stdout.lock();
        if let Err(err) = dump(&options.dump, &table, &mut out) {
            eprintln!("{table}: {err}");
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

use bgpsieve::elem::Viewer;
use bgpsieve::filter::{compile_filter, Vm};
use bgpsieve::io::MemStream;
use bgpsieve::parser::MrtReader;
use bgpsieve::Recovery;
use clap::Parser;
use log::{error, warn};
use std::io::{BufWriter, IsTerminal, Seek, SeekFrom, Write};

/// Filter the BGP messages of MRT files with a find(1)-style expression.
///
/// Everything up to the first expression token is an input file;
/// the rest is the filter. For example:
///
///     bgpgrep updates.mrt -type UPDATE -subnet ( 10.0.0.0/8 )
///
/// With no expression every message passes. `-` or no files reads
/// standard input.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Opts {
    /// Never colorize output, even on a terminal.
    #[clap(long)]
    no_color: bool,

    /// Print the compiled filter bytecode before processing.
    #[clap(long)]
    dump_bytecode: bool,

    /// Input files followed by the filter expression.
    #[clap(name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let opts: Opts = Opts::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (files, expr) = split_files_and_filter(&opts.args);

    let vm = match compile_filter(expr) {
        Ok(vm) => vm,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    if opts.dump_bytecode {
        // stage the listing in a memory stream so it reaches stdout as
        // one write
        let mut listing = MemStream::new();
        let _ = write!(listing, "{}", vm.dump());
        listing.seek(SeekFrom::Start(0)).unwrap();
        let mut stdout = std::io::stdout();
        let _ = std::io::copy(&mut listing, &mut stdout);
        if files.is_empty() && std::io::stdin().is_terminal() {
            std::process::exit(0);
        }
    }

    let color = !opts.no_color && std::io::stdout().is_terminal();
    let mut out = BufWriter::new(std::io::stdout());

    let files = if files.is_empty() {
        vec!["-".to_string()]
    } else {
        files.to_vec()
    };

    let mut errors = 0usize;
    for file in &files {
        errors += process_file(file, &vm, color, &mut out);
    }

    if let Err(e) = out.flush() {
        error!("write failed: {e}");
        errors += 1;
    }
    std::process::exit(if errors == 0 { 0 } else { 1 });
}

/// Input files come first; the filter expression starts at the first
/// token that can only be an expression: `(`, `!`, or an option-looking
/// word (a lone `-` still means stdin).
fn split_files_and_filter(args: &[String]) -> (&[String], &[String]) {
    let start = args
        .iter()
        .position(|a| a == "(" || a == "!" || (a.starts_with('-') && a.len() > 1))
        .unwrap_or(args.len());
    args.split_at(start)
}

fn process_file(path: &str, vm: &Vm, color: bool, out: &mut impl Write) -> usize {
    let reader = match MrtReader::new(path) {
        Ok(r) => r,
        Err(e) => {
            error!("{path}: {e}");
            return 1;
        }
    };

    let mut errors = 0usize;
    let mut viewer = Viewer::new();

    for record in reader {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors += 1;
                match e.recovery() {
                    Recovery::DropRecord | Recovery::DropItem => {
                        warn!("{path}: skipping record: {e}");
                        continue;
                    }
                    _ => {
                        error!("{path}: {e}");
                        break;
                    }
                }
            }
        };

        for view in viewer.record_to_views(record) {
            match vm.eval(&view) {
                Ok(true) => {
                    if !write_view(&view, color, out) {
                        errors += 1;
                    }
                }
                Ok(false) => {}
                // a VM fault is a compiler bug, not a property of the
                // message; do not limp on
                Err(e) => {
                    error!("{e}");
                    std::process::exit(2);
                }
            }
        }
    }
    errors
}

fn write_view(view: &bgpsieve::elem::MsgView, color: bool, out: &mut impl Write) -> bool {
    let line = view.to_string();
    let result = if color {
        match line.split_once('|') {
            Some((msg_type, rest)) => {
                writeln!(out, "\x1b[1;32m{msg_type}\x1b[0m|{rest}")
            }
            None => writeln!(out, "{line}"),
        }
    } else {
        writeln!(out, "{line}")
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                std::process::exit(0);
            }
            error!("write failed: {e}");
            false
        }
    }
}

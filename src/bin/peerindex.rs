use bgpsieve::models::*;
use bgpsieve::parser::MrtReader;
use bgpsieve::Recovery;
use clap::Parser;
use log::{error, warn};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Dump the peer tables of TABLE_DUMP_V2 MRT files.
///
/// Prints one line per peer: `<ip> <asn>|<0|1>`, the trailing digit being
/// 1 when the entry encoded its AS number in 32 bits.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Opts {
    /// Write output to FILE instead of standard output.
    #[clap(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Only print peers actually referenced by RIB records.
    #[clap(short = 'r', long = "only-refs")]
    only_refs: bool,

    /// MRT files to read; `-` or no files reads standard input.
    #[clap(name = "FILES")]
    files: Vec<String>,
}

fn main() {
    let opts: Opts = Opts::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut out: BufWriter<Box<dyn Write>> = BufWriter::new(match &opts.output {
        Some(path) => match File::create(path) {
            Ok(f) => Box::new(f),
            Err(e) => {
                error!("cannot create {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Box::new(std::io::stdout()),
    });

    let files = if opts.files.is_empty() {
        vec!["-".to_string()]
    } else {
        opts.files.clone()
    };

    let mut errors = 0usize;
    for file in &files {
        errors += process_file(file, &opts, &mut out);
    }

    if let Err(e) = out.flush() {
        error!("write failed: {e}");
        errors += 1;
    }
    std::process::exit(if errors == 0 { 0 } else { 1 });
}

/// Stream one file, returning the number of errors encountered.
fn process_file(path: &str, opts: &Opts, out: &mut impl Write) -> usize {
    let reader = match MrtReader::new(path) {
        Ok(r) => r,
        Err(e) => {
            error!("{path}: {e}");
            return 1;
        }
    };

    let mut errors = 0usize;
    // table + referenced indices for --only-refs; flushed when the next
    // table starts or the file ends
    let mut pending: Option<(PeerIndexTable, BTreeSet<u16>)> = None;

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

        match record.message {
            MrtMessage::TableDumpV2Message(TableDumpV2Message::PeerIndexTable(table)) => {
                if let Some((table, refs)) = pending.take() {
                    errors += flush_refs(&table, &refs, out);
                }
                if opts.only_refs {
                    pending = Some((table, BTreeSet::new()));
                } else {
                    errors += dump_all_peers(&table, out);
                }
            }
            MrtMessage::TableDumpV2Message(TableDumpV2Message::RibAfi(rib)) => {
                if let Some((_, refs)) = &mut pending {
                    refs.extend(rib.rib_entries.iter().map(|e| e.peer_index));
                }
            }
            MrtMessage::TableDumpV2Message(TableDumpV2Message::RibGeneric(rib)) => {
                if let Some((_, refs)) = &mut pending {
                    refs.extend(rib.rib_entries.iter().map(|e| e.peer_index));
                }
            }
            _ => {}
        }
    }

    if let Some((table, refs)) = pending.take() {
        errors += flush_refs(&table, &refs, out);
    }
    errors
}

fn dump_all_peers(table: &PeerIndexTable, out: &mut impl Write) -> usize {
    let mut errors = 0usize;
    for peer in table.peers() {
        match peer {
            Ok(peer) => {
                if !write_peer(&peer, out) {
                    errors += 1;
                }
            }
            Err(e) => {
                warn!("peer table: {e}");
                errors += 1;
            }
        }
    }
    errors
}

fn flush_refs(table: &PeerIndexTable, refs: &BTreeSet<u16>, out: &mut impl Write) -> usize {
    let mut errors = 0usize;
    for index in refs {
        match table.get_peer_by_index(*index) {
            Ok(peer) => {
                if !write_peer(&peer, out) {
                    errors += 1;
                }
            }
            Err(e) => {
                warn!("skipping peer reference: {e}");
                errors += 1;
            }
        }
    }
    errors
}

fn write_peer(peer: &Peer, out: &mut impl Write) -> bool {
    let line = format!(
        "{} {}|{}",
        peer.peer_address,
        peer.peer_asn,
        peer.peer_asn.is_four_byte() as u8
    );
    match writeln!(out, "{line}") {
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

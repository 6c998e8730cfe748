/*!
bgpsieve parses MRT archives from BGP route collectors and filters the
BGP messages inside them. It is the library behind two tools:

- `peerindex` prints the peer table of a TABLE_DUMP_V2 dump.
- `bgpgrep` evaluates a `find(1)`-style expression against every BGP
  message in a dump and prints the ones that pass.

# Examples

Iterating over the records of a file (compression is sniffed from the
extension, `-` reads stdin):

```no_run
use bgpsieve::parser::MrtReader;

let reader = MrtReader::new("updates.20211001.0000.bz2").unwrap();
for record in reader {
    match record {
        Ok(record) => println!("{:?}", record.common_header),
        Err(e) => eprintln!("skipping record: {e}"),
    }
}
```

Filtering messages the way `bgpgrep` does:

```no_run
use bgpsieve::elem::Viewer;
use bgpsieve::filter::compile_filter;
use bgpsieve::parser::MrtReader;

let expr: Vec<String> = ["-type", "UPDATE", "-subnet", "(", "10.0.0.0/8", ")"]
    .iter()
    .map(|s| s.to_string())
    .collect();
let vm = compile_filter(&expr).unwrap();

let mut viewer = Viewer::new();
for record in MrtReader::new("rib.20211001.0000.gz").unwrap().flatten() {
    for view in viewer.record_to_views(record) {
        if vm.eval(&view).unwrap() {
            println!("{view}");
        }
    }
}
```

# Layout

- [models] -- wire-shaped structs for MRT records and BGP messages
- [parser] -- the streaming decoder producing those structs
- [elem] -- flattening of records into per-message views
- [filter] -- the filter VM, its matchers, and the expression compiler
- [io] -- decompressing readers and the in-memory stream
*/
pub mod elem;
pub mod error;
pub mod filter;
pub mod io;
pub mod models;
pub mod parser;

pub use crate::error::{ParserError, Recovery};
pub use crate::parser::MrtReader;

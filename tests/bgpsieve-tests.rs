//! End-to-end tests over synthetic MRT byte streams, mirroring what the
//! `peerindex` and `bgpgrep` tools do with real collector dumps.
use bgpsieve::elem::{MsgView, Viewer};
use bgpsieve::filter::compile_filter;
use bgpsieve::models::*;
use bgpsieve::parser::{try_parse_mrt_record, try_parse_raw_record};
use bgpsieve::ParserError;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

fn mrt_record(entry_type: u16, subtype: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![];
    buf.extend_from_slice(&1_600_000_000u32.to_be_bytes());
    buf.extend_from_slice(&entry_type.to_be_bytes());
    buf.extend_from_slice(&subtype.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// NLRI-encode `a.b.c.d/len`.
fn encode_prefix(prefix: &str) -> Vec<u8> {
    let (addr, len) = prefix.split_once('/').unwrap();
    let addr = Ipv4Addr::from_str(addr).unwrap();
    let len: u8 = len.parse().unwrap();
    let mut out = vec![len];
    out.extend_from_slice(&addr.octets()[..(len as usize).div_ceil(8)]);
    out
}

fn frame_bgp(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = vec![0xFFu8; 16];
    buf.extend_from_slice(&((19 + body.len()) as u16).to_be_bytes());
    buf.push(msg_type);
    buf.extend_from_slice(body);
    buf
}

fn bgp_open() -> Vec<u8> {
    let mut body = vec![4];
    body.extend_from_slice(&65001u16.to_be_bytes());
    body.extend_from_slice(&180u16.to_be_bytes());
    body.extend_from_slice(&[192, 0, 2, 1]);
    body.push(0); // no optional parameters
    frame_bgp(1, &body)
}

fn bgp_update(path: &[u16], announce: &[&str], withdraw: &[&str]) -> Vec<u8> {
    let mut withdrawn = vec![];
    for prefix in withdraw {
        withdrawn.extend(encode_prefix(prefix));
    }

    let mut attrs = vec![];
    if !path.is_empty() {
        let mut segment = vec![2u8, path.len() as u8]; // AS_SEQUENCE
        for asn in path {
            segment.extend_from_slice(&asn.to_be_bytes());
        }
        attrs.extend_from_slice(&[0x40, 2, segment.len() as u8]);
        attrs.extend_from_slice(&segment);
    }

    let mut body = vec![];
    body.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
    body.extend_from_slice(&withdrawn);
    body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    body.extend_from_slice(&attrs);
    for prefix in announce {
        body.extend_from_slice(&encode_prefix(prefix));
    }
    frame_bgp(2, &body)
}

/// Wrap a framed BGP message in a BGP4MP_MESSAGE record payload.
fn bgp4mp_message_record(bgp_msg: &[u8]) -> Vec<u8> {
    let mut payload = vec![];
    payload.extend_from_slice(&65001u16.to_be_bytes()); // peer asn
    payload.extend_from_slice(&65000u16.to_be_bytes()); // local asn
    payload.extend_from_slice(&0u16.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes()); // afi ipv4
    payload.extend_from_slice(&[10, 0, 0, 1]);
    payload.extend_from_slice(&[10, 0, 0, 2]);
    payload.extend_from_slice(bgp_msg);
    mrt_record(16, 1, &payload)
}

/// PEER_INDEX_TABLE with two peers:
/// 0: AS32 IPv4 10.0.0.1 / 65001, 1: AS16 IPv6 2001:db8::1 / 64512.
fn peer_index_table_record() -> Vec<u8> {
    let mut payload = vec![];
    payload.extend_from_slice(&[192, 0, 2, 0]); // collector id
    payload.extend_from_slice(&0u16.to_be_bytes()); // empty view name
    payload.extend_from_slice(&2u16.to_be_bytes()); // peer count
    payload.push(0x2);
    payload.extend_from_slice(&[192, 0, 2, 1]);
    payload.extend_from_slice(&[10, 0, 0, 1]);
    payload.extend_from_slice(&65001u32.to_be_bytes());
    payload.push(0x1);
    payload.extend_from_slice(&[192, 0, 2, 2]);
    payload.extend_from_slice(&Ipv6Addr::from_str("2001:db8::1").unwrap().octets());
    payload.extend_from_slice(&64512u16.to_be_bytes());
    mrt_record(13, 1, &payload)
}

/// RIB_IPV4_UNICAST for 10.1.2.0/24 with one entry referencing `peer`.
fn rib_record(peer: u16) -> Vec<u8> {
    let mut payload = vec![];
    payload.extend_from_slice(&0u32.to_be_bytes()); // sequence
    payload.extend_from_slice(&encode_prefix("10.1.2.0/24"));
    payload.extend_from_slice(&1u16.to_be_bytes()); // entry count
    payload.extend_from_slice(&peer.to_be_bytes());
    payload.extend_from_slice(&1_500_000_000u32.to_be_bytes());
    payload.extend_from_slice(&0u16.to_be_bytes()); // no attributes
    mrt_record(13, 2, &payload)
}

/// The record loop both tools run: decode what parses, apply the error's
/// recovery class to decide between skipping and giving up on the input.
fn parse_all(mut stream: &[u8]) -> (Vec<MrtRecord>, Vec<ParserError>) {
    let mut records = vec![];
    let mut errors = vec![];
    loop {
        match try_parse_raw_record(&mut stream) {
            Ok(Some(raw)) => match raw.decode() {
                Ok(record) => records.push(record),
                Err(e) => errors.push(e),
            },
            Ok(None) => break,
            Err(e) => {
                let recovery = e.recovery();
                errors.push(e);
                match recovery {
                    bgpsieve::Recovery::DropRecord | bgpsieve::Recovery::DropItem => continue,
                    _ => break,
                }
            }
        }
    }
    (records, errors)
}

fn peer_line(peer: &Peer) -> String {
    format!(
        "{} {}|{}",
        peer.peer_address,
        peer.peer_asn,
        peer.peer_asn.is_four_byte() as u8
    )
}

fn grep(stream: &[u8], expr: &[&str]) -> Vec<MsgView> {
    let expr: Vec<String> = expr.iter().map(|s| s.to_string()).collect();
    let vm = compile_filter(&expr).unwrap();
    let (records, errors) = parse_all(stream);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    let mut viewer = Viewer::new();
    let mut passed = vec![];
    for record in records {
        for view in viewer.record_to_views(record) {
            if vm.eval(&view).unwrap() {
                passed.push(view);
            }
        }
    }
    passed
}

/// Spec scenario: a minimal peer dump prints both peers with the right
/// AS-width markers and RFC 5952 addresses.
#[test]
fn test_minimal_peer_dump() {
    let stream = peer_index_table_record();
    let (records, errors) = parse_all(&stream);
    assert!(errors.is_empty());
    assert_eq!(records.len(), 1);

    let MrtMessage::TableDumpV2Message(TableDumpV2Message::PeerIndexTable(table)) =
        &records[0].message
    else {
        panic!("expected a peer index table");
    };

    let lines: Vec<String> = table
        .peers()
        .map(|p| peer_line(&p.unwrap()))
        .collect();
    assert_eq!(lines, vec!["10.0.0.1 65001|1", "2001:db8::1 64512|0"]);
}

/// Spec scenario: with --only-refs, only peers referenced by RIB records
/// are printed.
#[test]
fn test_selective_peer_dump() {
    let mut stream = peer_index_table_record();
    stream.extend_from_slice(&rib_record(0));

    let (records, errors) = parse_all(&stream);
    assert!(errors.is_empty());

    let mut table = None;
    let mut refs = std::collections::BTreeSet::new();
    for record in records {
        match record.message {
            MrtMessage::TableDumpV2Message(TableDumpV2Message::PeerIndexTable(t)) => {
                table = Some(t)
            }
            MrtMessage::TableDumpV2Message(TableDumpV2Message::RibAfi(rib)) => {
                refs.extend(rib.rib_entries.iter().map(|e| e.peer_index));
            }
            _ => {}
        }
    }

    let table = table.unwrap();
    let lines: Vec<String> = refs
        .iter()
        .map(|i| peer_line(&table.get_peer_by_index(*i).unwrap()))
        .collect();
    assert_eq!(lines, vec!["10.0.0.1 65001|1"]);
}

/// A v4-mapped IPv6 peer renders with the dotted-quad tail.
#[test]
fn test_v4_mapped_rendering() {
    let mut payload = vec![];
    payload.extend_from_slice(&[192, 0, 2, 0]);
    payload.extend_from_slice(&0u16.to_be_bytes());
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.push(0x1);
    payload.extend_from_slice(&[192, 0, 2, 2]);
    payload.extend_from_slice(&Ipv6Addr::from_str("::ffff:1.2.3.4").unwrap().octets());
    payload.extend_from_slice(&64512u16.to_be_bytes());
    let stream = mrt_record(13, 1, &payload);

    let (records, _) = parse_all(&stream);
    let MrtMessage::TableDumpV2Message(TableDumpV2Message::PeerIndexTable(table)) =
        &records[0].message
    else {
        panic!("expected a peer index table");
    };
    let peer = table.get_peer_by_index(0).unwrap();
    assert_eq!(peer.peer_address.to_string(), "::ffff:1.2.3.4");
}

/// Spec scenario: `-type UPDATE` over [OPEN, UPDATE, KEEPALIVE, UPDATE]
/// passes exactly the two updates.
#[test]
fn test_filter_by_type() {
    let mut stream = vec![];
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_open()));
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_update(
        &[65001, 65002],
        &["10.1.2.0/24"],
        &[],
    )));
    stream.extend_from_slice(&bgp4mp_message_record(&frame_bgp(4, &[])));
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_update(
        &[65001, 65003],
        &["192.0.2.0/24"],
        &[],
    )));

    let passed = grep(&stream, &["-type", "UPDATE"]);
    assert_eq!(passed.len(), 2);
    assert!(passed.iter().all(|v| v.msg_type == BgpMessageType::Update));

    let all = grep(&stream, &[]);
    assert_eq!(all.len(), 4);
}

/// Spec scenario: `-subnet 10.0.0.0/8` selects only the update announcing
/// inside that block.
#[test]
fn test_prefix_subnet_filter() {
    let mut stream = vec![];
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_update(
        &[65001],
        &["10.1.2.0/24"],
        &[],
    )));
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_update(
        &[65001],
        &["192.0.2.0/24"],
        &[],
    )));

    let passed = grep(&stream, &["-subnet", "(", "10.0.0.0/8", ")"]);
    assert_eq!(passed.len(), 1);
    assert_eq!(passed[0].announced[0].to_string(), "10.1.2.0/24");
}

/// Spec scenario: AS-path anchors select paths by first and last hop.
#[test]
fn test_aspath_filter() {
    let mut stream = vec![];
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_update(
        &[65001, 3356, 65002],
        &["10.1.2.0/24"],
        &[],
    )));
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_update(
        &[65001, 3356],
        &["10.2.0.0/16"],
        &[],
    )));

    let passed = grep(&stream, &["-aspath", "^65001 .* 65002$"]);
    assert_eq!(passed.len(), 1);
    assert_eq!(passed[0].announced[0].to_string(), "10.1.2.0/24");
}

/// RIB entries evaluate as updates with the peer resolved through the
/// peer index table.
#[test]
fn test_rib_views_carry_peer() {
    let mut stream = peer_index_table_record();
    stream.extend_from_slice(&rib_record(1));

    let passed = grep(&stream, &["-peer", "64512"]);
    assert_eq!(passed.len(), 1);
    assert_eq!(passed[0].announced[0].to_string(), "10.1.2.0/24");
    assert_eq!(
        passed[0].peer_ip.unwrap().to_string(),
        "2001:db8::1"
    );
}

/// Spec scenario: corrupted-record tolerance with the third record still
/// reached. The middle record here is corrupted inside its body (a
/// view-name length overrunning the payload) rather than in its declared
/// record length: a declared-length overrun swallows the following bytes
/// on a forward-only stream, so framing past it cannot resync (see
/// DESIGN.md); body-level corruption keeps the framing in sync and
/// demonstrates the drop-record-and-continue policy end to end.
#[test]
fn test_corrupted_record_tolerance() {
    // declared record length is consistent, but the peer count points
    // past the payload
    let mut bad_payload = vec![];
    bad_payload.extend_from_slice(&[192, 0, 2, 0]);
    bad_payload.extend_from_slice(&200u16.to_be_bytes()); // view name "length"
    let bad = mrt_record(13, 1, &bad_payload);

    let mut stream = vec![];
    stream.extend_from_slice(&peer_index_table_record());
    stream.extend_from_slice(&bad);
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_open()));

    let (records, errors) = parse_all(&stream);
    assert_eq!(records.len(), 2);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ParserError::Truncated(_)));
    assert_eq!(errors[0].recovery(), bgpsieve::Recovery::DropRecord);
}

/// Spec scenario: a record whose declared length claims 100 bytes while
/// the input ends after 20 is dropped as truncated with a diagnostic, the
/// valid records are processed, and the error count makes the exit status
/// non-zero. The scenario's trailing valid record is unreachable in this
/// shape: the overrunning payload read has already consumed any bytes
/// that followed, so nothing to resync to remains (see DESIGN.md; the
/// third-record property is covered by `test_corrupted_record_tolerance`).
#[test]
fn test_truncated_record_tolerance() {
    let mut stream = vec![];
    stream.extend_from_slice(&bgp4mp_message_record(&bgp_open()));
    stream.extend_from_slice(&peer_index_table_record());
    // truncated record: declares 100 payload bytes, only 20 present
    stream.extend_from_slice(&mrt_record(13, 2, &[0u8; 100])[..12 + 20]);

    let (records, errors) = parse_all(&stream);
    assert_eq!(records.len(), 2);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ParserError::Truncated(_)));
    assert_eq!(errors[0].recovery(), bgpsieve::Recovery::DropRecord);

    let exit_code = if errors.is_empty() { 0 } else { 1 };
    assert_eq!(exit_code, 1);
}

/// Reading a whole stream through the library entry point used by the
/// tools.
#[test]
fn test_mrt_reader_over_file() {
    use std::io::Write;

    let mut stream = vec![];
    stream.extend_from_slice(&peer_index_table_record());
    stream.extend_from_slice(&rib_record(0));

    let mut file = tempfile::NamedTempFile::with_suffix(".mrt").unwrap();
    file.write_all(&stream).unwrap();

    let reader = bgpsieve::MrtReader::new(file.path().to_str().unwrap()).unwrap();
    let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 2);
}

/// Gzip inputs decode transparently, including concatenated members.
#[test]
fn test_gzip_input() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut member1 = GzEncoder::new(vec![], Compression::default());
    member1.write_all(&peer_index_table_record()).unwrap();
    let mut bytes = member1.finish().unwrap();

    let mut member2 = GzEncoder::new(vec![], Compression::default());
    member2.write_all(&rib_record(0)).unwrap();
    bytes.extend_from_slice(&member2.finish().unwrap());

    let mut file = tempfile::NamedTempFile::with_suffix(".gz").unwrap();
    file.write_all(&bytes).unwrap();

    let reader = bgpsieve::MrtReader::new(file.path().to_str().unwrap()).unwrap();
    let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 2);
}

/// try_parse_mrt_record reports a clean EOF as None.
#[test]
fn test_clean_eof() {
    let mut empty: &[u8] = &[];
    assert!(try_parse_mrt_record(&mut empty).unwrap().is_none());
}

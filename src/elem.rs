/*!
Per-message views of MRT records.

A single MRT record can wrap a BGP message, a legacy Zebra message, a
TABLE_DUMP entry, or a whole block of TABLE_DUMP_V2 RIB entries. This
module flattens each of those into [MsgView], the shape the filter VM
matches against and the shape `bgpgrep` prints.
*/
use crate::models::*;
use itertools::Itertools;
use log::warn;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

/// A flattened, self-contained view of one BGP message.
#[derive(Debug, Clone)]
pub struct MsgView {
    /// Record timestamp with microseconds folded in when present.
    pub timestamp: f64,
    pub msg_type: BgpMessageType,
    pub peer_ip: Option<IpAddr>,
    pub peer_asn: Option<Asn>,
    /// Reachable prefixes: UPDATE NLRI plus MP_REACH_NLRI, or the RIB
    /// prefix for table dumps.
    pub announced: Vec<NetworkPrefix>,
    /// Unreachable prefixes: withdrawn routes plus MP_UNREACH_NLRI.
    pub withdrawn: Vec<NetworkPrefix>,
    /// AS path with AS4_PATH already merged in.
    pub as_path: Option<AsPath>,
    pub communities: Vec<Community>,
    /// Wire codes of every attribute the message carried.
    pub attr_codes: Vec<u8>,
}

impl MsgView {
    pub fn has_attr(&self, code: u8) -> bool {
        self.attr_codes.contains(&code)
    }

    fn from_attributes(
        timestamp: f64,
        msg_type: BgpMessageType,
        peer_ip: Option<IpAddr>,
        peer_asn: Option<Asn>,
        attributes: &Attributes,
    ) -> MsgView {
        let mut announced = vec![];
        let mut withdrawn = vec![];
        if let Some(nlri) = attributes.mp_reach() {
            announced.extend(nlri.prefixes.iter().copied());
        }
        if let Some(nlri) = attributes.mp_unreach() {
            withdrawn.extend(nlri.prefixes.iter().copied());
        }
        MsgView {
            timestamp,
            msg_type,
            peer_ip,
            peer_asn,
            announced,
            withdrawn,
            as_path: attributes.as_path(),
            communities: attributes.communities().unwrap_or_default().to_vec(),
            attr_codes: attributes.iter().map(|a| a.attr_type).collect(),
        }
    }
}

impl Display for MsgView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let type_str = match self.msg_type {
            BgpMessageType::Open => "OPEN",
            BgpMessageType::Update => "UPDATE",
            BgpMessageType::Notification => "NOTIFICATION",
            BgpMessageType::KeepAlive => "KEEPALIVE",
        };
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}",
            type_str,
            self.timestamp,
            OptionToStr(&self.peer_ip),
            OptionToStr(&self.peer_asn),
            self.announced.iter().join(" "),
            self.withdrawn.iter().join(" "),
            OptionToStr(&self.as_path),
            self.communities.iter().join(" "),
        )
    }
}

struct OptionToStr<'a, T: Display>(&'a Option<T>);

impl<T: Display> Display for OptionToStr<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => Ok(()),
        }
    }
}

/// Converts MRT records into [MsgView]s, resolving RIB peer references
/// through the most recent PEER_INDEX_TABLE.
#[derive(Default)]
pub struct Viewer {
    peer_index_table: Option<PeerIndexTable>,
}

impl Viewer {
    pub fn new() -> Viewer {
        Viewer::default()
    }

    pub fn peer_index_table(&self) -> Option<&PeerIndexTable> {
        self.peer_index_table.as_ref()
    }

    /// Break one record into message views. PEER_INDEX_TABLE records are
    /// absorbed (they describe the dump, they are not messages); state
    /// changes produce nothing.
    pub fn record_to_views(&mut self, record: MrtRecord) -> Vec<MsgView> {
        let timestamp = record.common_header.timestamp_secs();
        match record.message {
            MrtMessage::TableDumpV2Message(TableDumpV2Message::PeerIndexTable(table)) => {
                self.peer_index_table = Some(table);
                vec![]
            }
            MrtMessage::TableDumpV2Message(TableDumpV2Message::RibAfi(rib)) => {
                self.rib_entries_to_views(timestamp, rib.prefix, &rib.rib_entries)
            }
            MrtMessage::TableDumpV2Message(TableDumpV2Message::RibGeneric(rib)) => {
                self.rib_entries_to_views(timestamp, rib.nlri, &rib.rib_entries)
            }
            MrtMessage::TableDumpMessage(dump) => {
                let mut view = MsgView::from_attributes(
                    timestamp,
                    BgpMessageType::Update,
                    Some(dump.peer_address),
                    Some(dump.peer_asn),
                    &dump.attributes,
                );
                view.announced.push(dump.prefix);
                vec![view]
            }
            MrtMessage::Bgp4Mp(Bgp4Mp::Message(wrapper)) => {
                vec![bgp_message_to_view(
                    timestamp,
                    Some(wrapper.peer_ip),
                    Some(wrapper.peer_asn),
                    &wrapper.bgp_message,
                )]
            }
            MrtMessage::Bgp4Mp(Bgp4Mp::StateChange(_)) => vec![],
            MrtMessage::Zebra(ZebraMessage::Message(wrapper)) => {
                vec![bgp_message_to_view(
                    timestamp,
                    Some(IpAddr::V4(wrapper.peer_addr)),
                    Some(wrapper.peer_asn),
                    &wrapper.bgp_message,
                )]
            }
            MrtMessage::Zebra(ZebraMessage::StateChange(_)) => vec![],
        }
    }

    fn rib_entries_to_views(
        &self,
        timestamp: f64,
        prefix: NetworkPrefix,
        entries: &[RibEntry],
    ) -> Vec<MsgView> {
        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            let peer = match &self.peer_index_table {
                Some(table) => match table.get_peer_by_index(entry.peer_index) {
                    Ok(peer) => Some(peer),
                    Err(e) => {
                        warn!("skipping RIB entry: {e}");
                        continue;
                    }
                },
                None => {
                    warn!("RIB entry without a preceding PEER_INDEX_TABLE");
                    None
                }
            };
            let mut view = MsgView::from_attributes(
                timestamp,
                BgpMessageType::Update,
                peer.map(|p| p.peer_address),
                peer.map(|p| p.peer_asn),
                &entry.attributes,
            );
            view.announced.push(NetworkPrefix::new(prefix.prefix, entry.path_id));
            views.push(view);
        }
        views
    }
}

fn bgp_message_to_view(
    timestamp: f64,
    peer_ip: Option<IpAddr>,
    peer_asn: Option<Asn>,
    message: &BgpMessage,
) -> MsgView {
    match message {
        BgpMessage::Update(update) => {
            let mut view = MsgView::from_attributes(
                timestamp,
                BgpMessageType::Update,
                peer_ip,
                peer_asn,
                &update.attributes,
            );
            view.announced
                .extend(update.announced_prefixes.iter().copied());
            view.withdrawn
                .extend(update.withdrawn_prefixes.iter().copied());
            view
        }
        other => MsgView {
            timestamp,
            msg_type: other.msg_type(),
            peer_ip,
            peer_asn,
            announced: vec![],
            withdrawn: vec![],
            as_path: None,
            communities: vec![],
            attr_codes: vec![],
        },
    }
}

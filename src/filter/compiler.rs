/*!
Compiles `find(1)`-style filter expressions into VM bytecode.

The grammar, lowest precedence first:

```text
Expr    := And ( ("-or" | "-o") And )*
And     := Not ( ("-and" | "-a")? Not )*        # juxtaposition is AND
Not     := ("!" | "-not") Not | Primary
Primary := "(" Expr ")" | Leaf
Leaf    := -type NAME | -attr NAME|NUM | -aspath REGEX | -peer EXPR
         | -loops | -bogon-asn
         | -exact LIST | -subnet LIST | -supernet LIST | -related LIST
         | -timestamp EXPR | -communities EXPR | -all-communities EXPR
```

Parsing builds a flat node table; a post-order emitter turns it into
short-circuit block code, and a peephole pass cleans up the seams.
*/
use crate::error::ParserError;
use crate::filter::aspath_re::AsPathRegex;
use crate::filter::community::{CommunityPattern, CommunitySet};
use crate::filter::trie::PrefixTrie;
use crate::filter::vm::*;
use crate::models::{Afi, AttrType, BgpMessageType};
use ipnet::IpNet;
use log::warn;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Compile an argv-shaped filter expression. An empty expression matches
/// everything.
pub fn compile_filter(args: &[String]) -> Result<Vm, ParserError> {
    if args.is_empty() {
        let code = vec![
            Instr::new(Opcode::Loadu, 1),
            Instr::op(Opcode::Cpass),
            Instr::op(Opcode::End),
        ];
        return Ok(Vm::new(code, vec![], standard_intrinsics()));
    }

    let mut parser = ExprParser {
        args,
        pos: 0,
        nodes: vec![],
        pool: vec![],
    };
    let root = parser.parse_expr()?;
    if parser.pos != args.len() {
        return Err(filter_err(format!(
            "unexpected token {:?}",
            args[parser.pos]
        )));
    }

    let mut emitter = Emitter {
        nodes: &parser.nodes,
        code: vec![],
    };
    emitter.emit_child(root, Conn::And);
    emitter.code.push(Instr::new(Opcode::Loadu, 1));
    emitter.code.push(Instr::op(Opcode::Cpass));
    emitter.code.push(Instr::op(Opcode::End));

    let mut code = emitter.code;
    peephole_optimize(&mut code);

    Ok(Vm::new(code, parser.pool, standard_intrinsics()))
}

fn filter_err(msg: String) -> ParserError {
    ParserError::FilterError(msg)
}

/// Expression node in the flat IR table.
#[derive(Debug)]
enum Node {
    And(usize, usize),
    Or(usize, usize),
    Not(usize),
    Leaf(Leaf),
}

/// Bytecode pre-emitted for a leaf during parsing. Prefix leaves whose
/// list names both announce and withdrawn patterns carry a second segment
/// probing the withdrawn domain.
#[derive(Debug)]
struct Leaf {
    words: Vec<Instr>,
    alt: Option<Vec<Instr>>,
}

impl Leaf {
    fn simple(words: Vec<Instr>) -> Leaf {
        Leaf { words, alt: None }
    }
}

struct ExprParser<'a> {
    args: &'a [String],
    pos: usize,
    nodes: Vec<Node>,
    pool: Vec<Constant>,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&str> {
        self.args.get(self.pos).map(|s| s.as_str())
    }

    fn bump(&mut self) -> Option<&str> {
        let token = self.args.get(self.pos).map(|s| s.as_str());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn operand(&mut self, keyword: &str) -> Result<&str, ParserError> {
        self.bump()
            .ok_or_else(|| filter_err(format!("{keyword} requires an argument")))
    }

    fn push_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn add_constant(&mut self, constant: Constant) -> Result<u8, ParserError> {
        if self.pool.len() >= MAX_POOL {
            return Err(filter_err("constant pool exhausted".to_string()));
        }
        self.pool.push(constant);
        Ok((self.pool.len() - 1) as u8)
    }

    fn parse_expr(&mut self) -> Result<usize, ParserError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some("-or" | "-o")) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = self.push_node(Node::Or(left, right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<usize, ParserError> {
        let mut left = self.parse_not()?;
        loop {
            match self.peek() {
                Some("-and" | "-a") => {
                    self.pos += 1;
                }
                Some("-or" | "-o" | ")") | None => break,
                Some(_) => {} // juxtaposition
            }
            let right = self.parse_not()?;
            left = self.push_node(Node::And(left, right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<usize, ParserError> {
        if matches!(self.peek(), Some("!" | "-not")) {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(self.push_node(Node::Not(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<usize, ParserError> {
        match self.peek() {
            Some("(") => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                if self.peek() != Some(")") {
                    return Err(filter_err("missing ')'".to_string()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(_) => {
                let leaf = self.parse_leaf()?;
                Ok(self.push_node(Node::Leaf(leaf)))
            }
            None => Err(filter_err("expected a predicate".to_string())),
        }
    }

    fn parse_leaf(&mut self) -> Result<Leaf, ParserError> {
        let keyword = self.bump().expect("caller checked a token is present").to_string();
        match keyword.as_str() {
            "-type" => {
                let name = self.operand("-type")?;
                let code = parse_bgp_type(name)?;
                Ok(Leaf::simple(vec![Instr::new(Opcode::Chkt, code)]))
            }
            "-attr" => {
                let name = self.operand("-attr")?;
                let code = match AttrType::from_name(name) {
                    Some(t) => u8::from(t),
                    None => name
                        .parse::<u8>()
                        .map_err(|_| filter_err(format!("unknown attribute {name:?}")))?,
                };
                Ok(Leaf::simple(vec![Instr::new(Opcode::Chka, code)]))
            }
            "-aspath" => {
                let pattern = self.operand("-aspath")?;
                let regex = AsPathRegex::from_str(pattern).map_err(filter_err)?;
                let k = self.add_constant(Constant::Regex(Arc::new(regex)))?;
                Ok(Leaf::simple(vec![
                    Instr::new(Opcode::Load, k),
                    Instr::op(Opcode::Fasmtc),
                ]))
            }
            "-peer" => {
                let expr = self.operand("-peer")?.to_string();
                let entry = parse_peer_expr(&expr)?;
                let k = self.add_constant(Constant::Peers(Arc::new(PeerMatchList {
                    entries: vec![entry],
                })))?;
                Ok(Leaf::simple(vec![
                    Instr::new(Opcode::Load, k),
                    Instr::new(Opcode::Call, FN_PEER_ADDR_MATCH),
                ]))
            }
            "-loops" => Ok(Leaf::simple(vec![Instr::new(
                Opcode::Call,
                FN_FIND_AS_LOOPS,
            )])),
            "-bogon-asn" => Ok(Leaf::simple(vec![Instr::new(Opcode::Call, FN_BOGON_ASN)])),
            "-exact" => self.parse_prefix_leaf(Opcode::Exct),
            "-subnet" => self.parse_prefix_leaf(Opcode::Subn),
            "-supernet" => self.parse_prefix_leaf(Opcode::Supn),
            "-related" => self.parse_prefix_leaf(Opcode::Relt),
            "-timestamp" => {
                let expr = self.operand("-timestamp")?;
                let cmp = parse_timestamp_expr(expr)?;
                let k = self.add_constant(Constant::TimeCmp(cmp))?;
                Ok(Leaf::simple(vec![
                    Instr::new(Opcode::Load, k),
                    Instr::new(Opcode::Call, FN_TIMESTAMP_COMPARE),
                ]))
            }
            "-communities" => self.parse_community_leaf(Opcode::Comtch),
            "-all-communities" => self.parse_community_leaf(Opcode::Acomtc),
            other => Err(filter_err(format!("unknown predicate {other:?}"))),
        }
    }

    fn parse_community_leaf(&mut self, op: Opcode) -> Result<Leaf, ParserError> {
        let mut patterns = vec![];
        if self.peek() == Some("(") {
            self.pos += 1;
            while let Some(token) = self.peek() {
                if token == ")" {
                    break;
                }
                patterns.push(CommunityPattern::from_str(token).map_err(filter_err)?);
                self.pos += 1;
            }
            if self.bump() != Some(")") {
                return Err(filter_err("missing ')' in community list".to_string()));
            }
        } else {
            let token = self.operand("-communities")?;
            patterns.push(CommunityPattern::from_str(token).map_err(filter_err)?);
        }
        let set = CommunitySet::new(patterns);
        let k = self.add_constant(Constant::Communities(Arc::new(set)))?;
        Ok(Leaf::simple(vec![
            Instr::new(Opcode::Load, k),
            Instr::op(op),
        ]))
    }

    fn parse_prefix_leaf(&mut self, op: Opcode) -> Result<Leaf, ParserError> {
        let lists = self.parse_prefix_lists()?;

        // an empty list can never match anything
        if lists.is_empty() {
            return Ok(Leaf::simple(vec![Instr::new(Opcode::Loadu, 0)]));
        }

        let mut load_pair = |v4: Option<PrefixTrie>,
                             v6: Option<PrefixTrie>,
                             domain: u8|
         -> Result<Option<Vec<Instr>>, ParserError> {
            if v4.is_none() && v6.is_none() {
                return Ok(None);
            }
            let mut words = vec![];
            for trie in [v4, v6] {
                words.push(match trie {
                    Some(t) => {
                        let k = self.add_constant(Constant::Trie(Arc::new(t)))?;
                        Instr::new(Opcode::Load, k)
                    }
                    None => Instr::op(Opcode::Loadn),
                });
            }
            words.push(Instr::new(op, domain));
            Ok(Some(words))
        };

        let announce = load_pair(lists.ann_v4, lists.ann_v6, ALL_NLRI)?;
        let withdrawn = load_pair(lists.wd_v4, lists.wd_v6, ALL_WITHDRAWN)?;

        match (announce, withdrawn) {
            (Some(words), alt) => Ok(Leaf { words, alt }),
            (None, Some(words)) => Ok(Leaf::simple(words)),
            (None, None) => unreachable!("non-empty list produces at least one segment"),
        }
    }

    /// A prefix list is either a parenthesized inline list or the name of
    /// a file holding whitespace-separated entries. Each entry is
    /// `[+-]?ADDR[/LEN]`; `+` restricts to announcements, `-` to
    /// withdrawals, no marker means both.
    fn parse_prefix_lists(&mut self) -> Result<PrefixLists, ParserError> {
        let mut lists = PrefixLists::default();
        if self.peek() == Some("(") {
            self.pos += 1;
            while let Some(token) = self.peek() {
                if token == ")" {
                    break;
                }
                lists.add(token)?;
                self.pos += 1;
            }
            if self.bump() != Some(")") {
                return Err(filter_err("missing ')' in prefix list".to_string()));
            }
        } else {
            let path = self.operand("prefix list")?.to_string();
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                filter_err(format!("cannot read prefix list {path:?}: {e}"))
            })?;
            for token in contents.split_whitespace() {
                lists.add(token)?;
            }
        }
        Ok(lists)
    }
}

#[derive(Default)]
struct PrefixLists {
    ann_v4: Option<PrefixTrie>,
    ann_v6: Option<PrefixTrie>,
    wd_v4: Option<PrefixTrie>,
    wd_v6: Option<PrefixTrie>,
}

impl PrefixLists {
    fn is_empty(&self) -> bool {
        self.ann_v4.is_none() && self.ann_v6.is_none() && self.wd_v4.is_none() && self.wd_v6.is_none()
    }

    fn add(&mut self, token: &str) -> Result<(), ParserError> {
        let (announce, withdraw, body) = match token.as_bytes().first() {
            Some(b'+') => (true, false, &token[1..]),
            Some(b'-') => (false, true, &token[1..]),
            _ => (true, true, token),
        };

        let prefix = parse_prefix_token(body)?;
        let afi = match prefix {
            IpNet::V4(_) => Afi::Ipv4,
            IpNet::V6(_) => Afi::Ipv6,
        };

        let mut insert = |slot: &mut Option<PrefixTrie>| {
            slot.get_or_insert_with(|| PrefixTrie::new(afi)).insert(&prefix);
        };
        match (afi, announce, withdraw) {
            (Afi::Ipv4, true, _) => insert(&mut self.ann_v4),
            (Afi::Ipv6, true, _) => insert(&mut self.ann_v6),
            _ => {}
        }
        match (afi, withdraw) {
            (Afi::Ipv4, true) => insert(&mut self.wd_v4),
            (Afi::Ipv6, true) => insert(&mut self.wd_v6),
            _ => {}
        }
        Ok(())
    }
}

fn parse_prefix_token(s: &str) -> Result<IpNet, ParserError> {
    if s.contains('/') {
        return IpNet::from_str(s)
            .map_err(|e| filter_err(format!("bad prefix {s:?}: {e}")));
    }
    let addr = IpAddr::from_str(s).map_err(|e| filter_err(format!("bad address {s:?}: {e}")))?;
    Ok(IpNet::from(addr))
}

fn parse_bgp_type(name: &str) -> Result<u8, ParserError> {
    let code = match name.to_ascii_uppercase().as_str() {
        "OPEN" => BgpMessageType::Open.into(),
        "UPDATE" => BgpMessageType::Update.into(),
        "NOTIFICATION" | "NOTIFY" => BgpMessageType::Notification.into(),
        "KEEPALIVE" => BgpMessageType::KeepAlive.into(),
        _ => name
            .parse::<u8>()
            .map_err(|_| filter_err(format!("unknown BGP message type {name:?}")))?,
    };
    Ok(code)
}

/// `[!]ADDR`, `[!]ASN`, or `[!]ADDR [!]ASN`.
fn parse_peer_expr(expr: &str) -> Result<PeerMatch, ParserError> {
    let parts: Vec<&str> = expr.split_whitespace().collect();

    let split_negation = |part: &str| -> (bool, String) {
        match part.strip_prefix('!') {
            Some(rest) => (true, rest.to_string()),
            None => (false, part.to_string()),
        }
    };

    let parse_asn = |s: &str| -> Result<u32, ParserError> {
        let digits = s.strip_prefix("AS").unwrap_or(s);
        let asn = digits
            .parse::<u32>()
            .map_err(|_| filter_err(format!("bad peer ASN {s:?}")))?;
        if asn == 23456 {
            warn!("peer expression matches AS_TRANS (23456); RIB entries keep the real ASN");
        }
        Ok(asn)
    };

    match parts.as_slice() {
        [single] => {
            let (negated, body) = split_negation(single);
            if let Ok(addr) = IpAddr::from_str(&body) {
                Ok(PeerMatch {
                    addr: Some((addr, negated)),
                    asn: None,
                })
            } else {
                Ok(PeerMatch {
                    addr: None,
                    asn: Some((parse_asn(&body)?, negated)),
                })
            }
        }
        [addr_part, asn_part] => {
            let (addr_negated, addr_body) = split_negation(addr_part);
            let addr = IpAddr::from_str(&addr_body)
                .map_err(|e| filter_err(format!("bad peer address {addr_body:?}: {e}")))?;
            let (asn_negated, asn_body) = split_negation(asn_part);
            Ok(PeerMatch {
                addr: Some((addr, addr_negated)),
                asn: Some((parse_asn(&asn_body)?, asn_negated)),
            })
        }
        _ => Err(filter_err(format!("bad peer expression {expr:?}"))),
    }
}

/// `[OP]VALUE` where OP is one of `= == != < <= > >=` (default `=`) and
/// VALUE is epoch seconds or an RFC 3339 timestamp.
fn parse_timestamp_expr(expr: &str) -> Result<TimestampCmp, ParserError> {
    let (op, rest) = if let Some(rest) = expr.strip_prefix("==") {
        (CmpOp::Eq, rest)
    } else if let Some(rest) = expr.strip_prefix("!=") {
        (CmpOp::Ne, rest)
    } else if let Some(rest) = expr.strip_prefix("<=") {
        (CmpOp::Le, rest)
    } else if let Some(rest) = expr.strip_prefix(">=") {
        (CmpOp::Ge, rest)
    } else if let Some(rest) = expr.strip_prefix('<') {
        (CmpOp::Lt, rest)
    } else if let Some(rest) = expr.strip_prefix('>') {
        (CmpOp::Gt, rest)
    } else if let Some(rest) = expr.strip_prefix('=') {
        (CmpOp::Eq, rest)
    } else {
        (CmpOp::Eq, expr)
    };

    let value = parse_time_value(rest)
        .ok_or_else(|| filter_err(format!("bad timestamp {rest:?}")))?;
    Ok(TimestampCmp { op, value })
}

fn parse_time_value(s: &str) -> Option<f64> {
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.timestamp() as f64)
}

/// Connective context a child is emitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conn {
    And,
    Or,
}

struct Emitter<'a> {
    nodes: &'a [Node],
    code: Vec<Instr>,
}

impl Emitter<'_> {
    /// Emit a node as one child of an enclosing AND/OR scope, including
    /// the scope's boundary code. Same-connective composites splice their
    /// children directly; a fresh BLK is only opened when the connective
    /// changes.
    fn emit_child(&mut self, idx: usize, conn: Conn) {
        let nodes = self.nodes;
        match (&nodes[idx], conn) {
            (Node::And(l, r), Conn::And) => {
                self.emit_child(*l, Conn::And);
                self.emit_child(*r, Conn::And);
            }
            (Node::Or(l, r), Conn::Or) => {
                self.emit_child(*l, Conn::Or);
                self.emit_child(*r, Conn::Or);
            }
            (Node::Leaf(leaf), _) => self.emit_leaf_child(leaf, conn),
            _ => {
                self.emit_value(idx);
                self.emit_boundary(conn);
            }
        }
    }

    fn emit_boundary(&mut self, conn: Conn) {
        match conn {
            Conn::And => {
                self.code.push(Instr::op(Opcode::Not));
                self.code.push(Instr::op(Opcode::Cfail));
            }
            Conn::Or => self.code.push(Instr::op(Opcode::Cpass)),
        }
    }

    fn emit_leaf_child(&mut self, leaf: &Leaf, conn: Conn) {
        self.code.extend_from_slice(&leaf.words);
        match (&leaf.alt, conn) {
            (None, _) => self.emit_boundary(conn),
            (Some(alt), Conn::Or) => {
                // announce hit passes immediately, else probe withdrawals
                self.code.push(Instr::op(Opcode::Cpass));
                self.code.extend_from_slice(alt);
                self.code.push(Instr::op(Opcode::Cpass));
            }
            (Some(alt), Conn::And) => {
                // announce hit short-circuits over the withdrawn probe and
                // this child's AND boundary
                self.code
                    .push(Instr::new(Opcode::Jnz, (alt.len() + 2) as u8));
                self.code.extend_from_slice(alt);
                self.emit_boundary(Conn::And);
            }
        }
    }

    /// Emit a node so that exactly one boolean lands on the stack.
    fn emit_value(&mut self, idx: usize) {
        let nodes = self.nodes;
        match &nodes[idx] {
            Node::Leaf(leaf) => {
                self.code.extend_from_slice(&leaf.words);
                if let Some(alt) = &leaf.alt {
                    // announce-or-withdrawn with only forward skips:
                    // a false announce verdict falls through to the
                    // withdrawn probe, a true one materializes `true`
                    // and hops over it
                    self.code.push(Instr::op(Opcode::Not));
                    self.code.push(Instr::new(Opcode::Jnz, 3));
                    self.code.push(Instr::new(Opcode::Loadu, 1));
                    self.code.push(Instr::new(Opcode::Loadu, 1));
                    self.code.push(Instr::new(Opcode::Jnz, alt.len() as u8));
                    self.code.extend_from_slice(alt);
                }
            }
            Node::Not(inner) => {
                self.emit_value(*inner);
                self.code.push(Instr::op(Opcode::Not));
            }
            Node::And(l, r) => {
                self.code.push(Instr::op(Opcode::Blk));
                self.emit_child(*l, Conn::And);
                self.emit_child(*r, Conn::And);
                self.code.push(Instr::new(Opcode::Loadu, 1));
                self.code.push(Instr::op(Opcode::Cpass));
                self.code.push(Instr::op(Opcode::Endblk));
            }
            Node::Or(l, r) => {
                self.code.push(Instr::op(Opcode::Blk));
                self.emit_child(*l, Conn::Or);
                self.emit_child(*r, Conn::Or);
                self.code.push(Instr::new(Opcode::Loadu, 1));
                self.code.push(Instr::op(Opcode::Cfail));
                self.code.push(Instr::op(Opcode::Endblk));
            }
        }
    }
}

/// Peephole optimizer: a four-instruction sliding window rewrites local
/// patterns until a fixed point, then NOPs are compacted with jump
/// offsets adjusted. A window is only rewritten when no jump lands inside
/// it.
pub(crate) fn peephole_optimize(code: &mut Vec<Instr>) {
    let nop = Instr::op(Opcode::Nop);
    let not = Instr::op(Opcode::Not);
    let cpass = Instr::op(Opcode::Cpass);
    let cfail = Instr::op(Opcode::Cfail);

    loop {
        let mut changed = false;
        let targets = jump_targets(code);
        let lands_inside = |start: usize, len: usize| {
            targets
                .iter()
                .any(|t| *t > start && *t < start + len)
        };

        let mut i = 0;
        while i < code.len() {
            // NOT NOT cancels
            if i + 1 < code.len()
                && code[i] == not
                && code[i + 1] == not
                && !lands_inside(i, 2)
            {
                code[i] = nop;
                code[i + 1] = nop;
                changed = true;
                i += 2;
                continue;
            }
            // constant folding through NOT
            if i + 1 < code.len()
                && code[i].opcode_raw() == u8::from(Opcode::Loadu)
                && code[i + 1] == not
                && !lands_inside(i, 2)
            {
                let folded = if code[i].imm() == 0 { 1 } else { 0 };
                code[i] = Instr::new(Opcode::Loadu, folded);
                code[i + 1] = nop;
                changed = true;
                i += 2;
                continue;
            }
            // NOT; CFAIL; LOADU 1; CPASS  ->  CPASS; LOADU 1; CFAIL
            if i + 3 < code.len()
                && code[i] == not
                && code[i + 1] == cfail
                && code[i + 2] == Instr::new(Opcode::Loadu, 1)
                && code[i + 3] == cpass
                && !lands_inside(i, 4)
            {
                code[i] = cpass;
                code[i + 1] = Instr::new(Opcode::Loadu, 1);
                code[i + 2] = cfail;
                code[i + 3] = nop;
                changed = true;
                i += 4;
                continue;
            }
            // mirrored tail
            if i + 3 < code.len()
                && code[i] == not
                && code[i + 1] == cpass
                && code[i + 2] == Instr::new(Opcode::Loadu, 1)
                && code[i + 3] == cfail
                && !lands_inside(i, 4)
            {
                code[i] = cfail;
                code[i + 1] = Instr::new(Opcode::Loadu, 1);
                code[i + 2] = cpass;
                code[i + 3] = nop;
                changed = true;
                i += 4;
                continue;
            }
            i += 1;
        }

        if !changed {
            break;
        }
    }

    compact_nops(code);
}

/// Indices that some JNZ may transfer control to.
fn jump_targets(code: &[Instr]) -> Vec<usize> {
    code.iter()
        .enumerate()
        .filter(|(_, instr)| instr.opcode_raw() == u8::from(Opcode::Jnz))
        .map(|(pc, instr)| pc + instr.imm() as usize + 1)
        .collect()
}

/// Drop NOPs, rewriting JNZ offsets across the removed slots.
fn compact_nops(code: &mut Vec<Instr>) {
    let nop_raw = u8::from(Opcode::Nop);
    // new_index[i] = position of instruction i after compaction
    let mut new_index = Vec::with_capacity(code.len() + 1);
    let mut kept = 0usize;
    for instr in code.iter() {
        new_index.push(kept);
        if instr.opcode_raw() != nop_raw {
            kept += 1;
        }
    }
    new_index.push(kept);

    let mut out = Vec::with_capacity(kept);
    for (pc, instr) in code.iter().enumerate() {
        if instr.opcode_raw() == nop_raw {
            continue;
        }
        if instr.opcode_raw() == u8::from(Opcode::Jnz) {
            let target = (pc + instr.imm() as usize + 1).min(code.len());
            let new_imm = new_index[target] - new_index[pc] - 1;
            out.push(Instr::new(Opcode::Jnz, new_imm as u8));
        } else {
            out.push(*instr);
        }
    }
    *code = out;
}

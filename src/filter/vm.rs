/*!
The filter virtual machine.

Programs are flat vectors of 16-bit instruction words: opcode in the low
byte, an immediate in the high byte. The immediate is, depending on the
opcode, a literal, a constant-pool index, an intrinsic-function index, or
a prefix domain selector. Evaluation runs one message at a time against a
[MsgView] and produces pass or fail.

`BLK`/`ENDBLK` bracket short-circuit scopes: inside a block, `CPASS` and
`CFAIL` with a truthy operand jump past the block's `ENDBLK` and leave the
block's verdict on the stack; at the outermost scope they halt evaluation
with the final result. This is what the compiler's AND/OR code generation
leans on.
*/
use crate::elem::MsgView;
use crate::filter::aspath_re::AsPathRegex;
use crate::filter::community::CommunitySet;
use crate::filter::trie::{PrefixMatchOp, PrefixTrie};
use crate::models::NetworkPrefix;
use ipnet::IpNet;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Display, Formatter, Write as _};
use std::net::IpAddr;
use std::sync::Arc;

/// Domain selector immediates for the prefix-matching opcodes.
pub const ALL_NLRI: u8 = 0;
pub const ALL_WITHDRAWN: u8 = 1;

/// Value-stack depth limit; deeper pushes fault the program.
const MAX_STACK: usize = 64;

/// Constant pool size limit (the immediate is one byte).
pub const MAX_POOL: usize = 256;

#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    /// Push constant-pool slot `imm`.
    Load,
    /// Push the immediate byte as an integer.
    Loadu,
    /// Push null.
    Loadn,
    /// Invert the truthiness of the top of stack.
    Not,
    /// Pop; if truthy, skip the next `imm` instructions.
    Jnz,
    /// Open a short-circuit block.
    Blk,
    /// Close the innermost block.
    Endblk,
    /// Pop; if truthy, pass out of the current block (or halt with pass).
    Cpass,
    /// Pop; if truthy, fail out of the current block (or halt with fail).
    Cfail,
    /// Push true iff the message type equals `imm`.
    Chkt,
    /// Push true iff the message carries attribute code `imm`.
    Chka,
    /// Prefix matchers: pop v6-trie-or-null, pop v4-trie-or-null, test
    /// every prefix in the domain selected by `imm`.
    Exct,
    Subn,
    Supn,
    Relt,
    /// Pop a compiled AS-path regex, match the message's AS path.
    Fasmtc,
    /// Pop a community set, require any pattern to match.
    Comtch,
    /// Pop a community set, require all patterns to match.
    Acomtc,
    /// Invoke intrinsic `imm`; its boolean return is pushed.
    Call,
    /// Halt with the current result (fail unless a CPASS said otherwise).
    End,
}

/// One 16-bit instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr(pub u16);

impl Instr {
    pub fn new(op: Opcode, imm: u8) -> Instr {
        Instr((imm as u16) << 8 | u8::from(op) as u16)
    }

    pub fn op(op: Opcode) -> Instr {
        Instr::new(op, 0)
    }

    pub fn opcode_raw(&self) -> u8 {
        self.0 as u8
    }

    pub fn opcode(&self) -> Result<Opcode, VmError> {
        Opcode::try_from(self.opcode_raw()).map_err(|_| VmError::UnknownOpcode(self.opcode_raw()))
    }

    pub fn imm(&self) -> u8 {
        (self.0 >> 8) as u8
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Err(_) => write!(f, "DB {:#06x}", self.0),
            Ok(op) => {
                let name = format!("{op:?}").to_ascii_uppercase();
                match op {
                    Opcode::Load | Opcode::Loadu | Opcode::Jnz | Opcode::Chkt | Opcode::Chka
                    | Opcode::Call => write!(f, "{name} {}", self.imm()),
                    Opcode::Exct | Opcode::Subn | Opcode::Supn | Opcode::Relt => {
                        let domain = match self.imm() {
                            ALL_NLRI => "nlri",
                            ALL_WITHDRAWN => "withdrawn",
                            other => return write!(f, "{name} {other}"),
                        };
                        write!(f, "{name} {domain}")
                    }
                    _ => write!(f, "{name}"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    StackUnderflow,
    StackOverflow,
    BadConstIndex(u8),
    BadFuncIndex(u8),
    UnknownOpcode(u8),
    BadDomain(u8),
    TypeMismatch(&'static str),
    UnbalancedBlock,
}

impl std::error::Error for VmError {}

impl Display for VmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::StackUnderflow => write!(f, "value stack underflow"),
            VmError::StackOverflow => write!(f, "value stack overflow"),
            VmError::BadConstIndex(k) => write!(f, "bad constant pool index: {k}"),
            VmError::BadFuncIndex(k) => write!(f, "bad function table index: {k}"),
            VmError::UnknownOpcode(op) => write!(f, "unknown opcode: {op:#04x}"),
            VmError::BadDomain(d) => write!(f, "bad prefix domain: {d}"),
            VmError::TypeMismatch(what) => write!(f, "operand type mismatch: {what}"),
            VmError::UnbalancedBlock => write!(f, "unbalanced BLK/ENDBLK"),
        }
    }
}

/// Comparison compiled from a `-timestamp` argument, consumed by the
/// TimestampCompare intrinsic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampCmp {
    pub op: CmpOp,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl TimestampCmp {
    pub fn matches(&self, timestamp: f64) -> bool {
        match self.op {
            CmpOp::Eq => timestamp == self.value,
            CmpOp::Ne => timestamp != self.value,
            CmpOp::Lt => timestamp < self.value,
            CmpOp::Le => timestamp <= self.value,
            CmpOp::Gt => timestamp > self.value,
            CmpOp::Ge => timestamp >= self.value,
        }
    }
}

impl Display for TimestampCmp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let op = match self.op {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "timestamp {op} {}", self.value)
    }
}

/// One `-peer` condition: an address and/or an ASN, each independently
/// negatable. A missing field is a don't-care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerMatch {
    pub addr: Option<(IpAddr, bool)>,
    pub asn: Option<(u32, bool)>,
}

impl PeerMatch {
    fn matches(&self, peer_ip: Option<IpAddr>, peer_asn: Option<u32>) -> bool {
        let addr_ok = match (self.addr, peer_ip) {
            (None, _) => true,
            (Some((want, negated)), Some(have)) => (have == want) != negated,
            (Some((_, negated)), None) => negated,
        };
        let asn_ok = match (self.asn, peer_asn) {
            (None, _) => true,
            (Some((want, negated)), Some(have)) => (have == want) != negated,
            (Some((_, negated)), None) => negated,
        };
        addr_ok && asn_ok
    }
}

impl Display for PeerMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        if let Some((addr, negated)) = self.addr {
            write!(f, "{}{addr}", if negated { "!" } else { "" })?;
            first = false;
        }
        if let Some((asn, negated)) = self.asn {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}AS{asn}", if negated { "!" } else { "" })?;
        }
        Ok(())
    }
}

/// The operand of PeerAddrMatch: any entry matching passes the message.
#[derive(Debug, Clone, Default)]
pub struct PeerMatchList {
    pub entries: Vec<PeerMatch>,
}

impl PeerMatchList {
    pub fn matches(&self, peer_ip: Option<IpAddr>, peer_asn: Option<u32>) -> bool {
        self.entries.iter().any(|e| e.matches(peer_ip, peer_asn))
    }
}

/// A constant-pool slot: an inline integer or a shared heap object.
#[derive(Debug, Clone)]
pub enum Constant {
    Int(i64),
    Trie(Arc<PrefixTrie>),
    Regex(Arc<AsPathRegex>),
    Communities(Arc<CommunitySet>),
    Peers(Arc<PeerMatchList>),
    TimeCmp(TimestampCmp),
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "int {v}"),
            Constant::Trie(t) => write!(f, "trie {:?} ({} prefixes)", t.afi(), t.len()),
            Constant::Regex(r) => write!(f, "aspath /{}/", r.pattern()),
            Constant::Communities(c) => {
                write!(f, "communities [")?;
                for (i, p) in c.patterns().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "]")
            }
            Constant::Peers(p) => {
                write!(f, "peers [")?;
                for (i, e) in p.entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            Constant::TimeCmp(c) => write!(f, "{c}"),
        }
    }
}

/// A value on the evaluation stack.
#[derive(Debug, Clone)]
enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Trie(Arc<PrefixTrie>),
    Regex(Arc<AsPathRegex>),
    Communities(Arc<CommunitySet>),
    Peers(Arc<PeerMatchList>),
    TimeCmp(TimestampCmp),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            _ => true,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Value {
        match constant {
            Constant::Int(v) => Value::Int(*v),
            Constant::Trie(t) => Value::Trie(Arc::clone(t)),
            Constant::Regex(r) => Value::Regex(Arc::clone(r)),
            Constant::Communities(c) => Value::Communities(Arc::clone(c)),
            Constant::Peers(p) => Value::Peers(Arc::clone(p)),
            Constant::TimeCmp(c) => Value::TimeCmp(*c),
        }
    }
}

/// The per-evaluation state handed to intrinsics.
pub struct EvalScope {
    stack: Vec<Value>,
}

impl EvalScope {
    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= MAX_STACK {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }
}

/// A host function callable from bytecode via `CALL`.
pub struct Intrinsic {
    pub name: &'static str,
    pub run: fn(&mut EvalScope, &MsgView) -> Result<bool, VmError>,
}

/// Indices of the standard intrinsics installed by [standard_intrinsics].
pub const FN_FIND_AS_LOOPS: u8 = 0;
pub const FN_PEER_ADDR_MATCH: u8 = 1;
pub const FN_TIMESTAMP_COMPARE: u8 = 2;
pub const FN_BOGON_ASN: u8 = 3;

pub fn standard_intrinsics() -> Vec<Intrinsic> {
    vec![
        Intrinsic {
            name: "FindAsLoops",
            run: |_scope, msg| {
                Ok(msg.as_path.as_ref().map_or(false, |p| p.has_loop()))
            },
        },
        Intrinsic {
            name: "PeerAddrMatch",
            run: |scope, msg| {
                let Value::Peers(list) = scope.pop()? else {
                    return Err(VmError::TypeMismatch("PeerAddrMatch expects a peer list"));
                };
                Ok(list.matches(msg.peer_ip, msg.peer_asn.map(|a| a.to_u32())))
            },
        },
        Intrinsic {
            name: "TimestampCompare",
            run: |scope, msg| {
                let Value::TimeCmp(cmp) = scope.pop()? else {
                    return Err(VmError::TypeMismatch(
                        "TimestampCompare expects a timestamp comparator",
                    ));
                };
                Ok(cmp.matches(msg.timestamp))
            },
        },
        Intrinsic {
            name: "BogonAsn",
            run: |_scope, msg| {
                Ok(msg
                    .as_path
                    .as_ref()
                    .map_or(false, |p| p.iter_asns().any(|asn| asn.is_bogon())))
            },
        },
    ]
}

/// A compiled filter program: bytecode, constant pool, and function
/// table. The program and pool live for the process; per-message state is
/// local to each [Vm::eval] call.
pub struct Vm {
    code: Vec<Instr>,
    pool: Vec<Constant>,
    funcs: Vec<Intrinsic>,
}

impl Vm {
    pub fn new(code: Vec<Instr>, pool: Vec<Constant>, funcs: Vec<Intrinsic>) -> Vm {
        assert!(pool.len() <= MAX_POOL, "constant pool overflow");
        Vm { code, pool, funcs }
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    pub fn pool(&self) -> &[Constant] {
        &self.pool
    }

    /// Evaluate the program against one message.
    ///
    /// Errors indicate a malformed program, not a property of the
    /// message; callers treat them as fatal.
    pub fn eval(&self, msg: &MsgView) -> Result<bool, VmError> {
        let mut scope = EvalScope { stack: vec![] };
        let mut blocks: Vec<usize> = vec![];
        let mut pc = 0usize;

        while pc < self.code.len() {
            let instr = self.code[pc];
            match instr.opcode()? {
                Opcode::Nop => {}
                Opcode::Load => {
                    let k = instr.imm();
                    let constant = self
                        .pool
                        .get(k as usize)
                        .ok_or(VmError::BadConstIndex(k))?;
                    scope.push(constant.into())?;
                }
                Opcode::Loadu => scope.push(Value::Int(instr.imm() as i64))?,
                Opcode::Loadn => scope.push(Value::Null)?,
                Opcode::Not => {
                    let v = scope.pop()?.truthy();
                    scope.push(Value::Bool(!v))?;
                }
                Opcode::Jnz => {
                    if scope.pop()?.truthy() {
                        pc += instr.imm() as usize;
                    }
                }
                Opcode::Blk => blocks.push(self.find_block_end(pc)?),
                Opcode::Endblk => {
                    blocks.pop().ok_or(VmError::UnbalancedBlock)?;
                }
                Opcode::Cpass => {
                    if scope.pop()?.truthy() {
                        match blocks.pop() {
                            Some(end) => {
                                scope.push(Value::Bool(true))?;
                                pc = end;
                            }
                            None => {
                                return Ok(true);
                            }
                        }
                    }
                }
                Opcode::Cfail => {
                    if scope.pop()?.truthy() {
                        match blocks.pop() {
                            Some(end) => {
                                scope.push(Value::Bool(false))?;
                                pc = end;
                            }
                            None => {
                                return Ok(false);
                            }
                        }
                    }
                }
                Opcode::Chkt => {
                    scope.push(Value::Bool(u8::from(msg.msg_type) == instr.imm()))?;
                }
                Opcode::Chka => scope.push(Value::Bool(msg.has_attr(instr.imm())))?,
                Opcode::Exct => self.prefix_match(&mut scope, msg, instr.imm(), PrefixMatchOp::Exact)?,
                Opcode::Subn => self.prefix_match(&mut scope, msg, instr.imm(), PrefixMatchOp::Subnet)?,
                Opcode::Supn => self.prefix_match(&mut scope, msg, instr.imm(), PrefixMatchOp::Supernet)?,
                Opcode::Relt => self.prefix_match(&mut scope, msg, instr.imm(), PrefixMatchOp::Related)?,
                Opcode::Fasmtc => {
                    let Value::Regex(regex) = scope.pop()? else {
                        return Err(VmError::TypeMismatch("FASMTC expects a compiled regex"));
                    };
                    let matched = match &msg.as_path {
                        Some(path) => regex.is_match(path.iter_asns().map(|a| a.to_u32())),
                        None => regex.is_match(std::iter::empty()),
                    };
                    scope.push(Value::Bool(matched))?;
                }
                Opcode::Comtch => {
                    let Value::Communities(set) = scope.pop()? else {
                        return Err(VmError::TypeMismatch("COMTCH expects a community set"));
                    };
                    scope.push(Value::Bool(set.match_any(&msg.communities)))?;
                }
                Opcode::Acomtc => {
                    let Value::Communities(set) = scope.pop()? else {
                        return Err(VmError::TypeMismatch("ACOMTC expects a community set"));
                    };
                    scope.push(Value::Bool(set.match_all(&msg.communities)))?;
                }
                Opcode::Call => {
                    let k = instr.imm();
                    let func = self
                        .funcs
                        .get(k as usize)
                        .ok_or(VmError::BadFuncIndex(k))?;
                    let verdict = (func.run)(&mut scope, msg)?;
                    scope.push(Value::Bool(verdict))?;
                }
                // the result only ever becomes pass through a top-level
                // CPASS, which returns directly; END and falling off the
                // end keep the default fail
                Opcode::End => return Ok(false),
            }
            pc += 1;
        }

        Ok(false)
    }

    fn find_block_end(&self, blk_pc: usize) -> Result<usize, VmError> {
        let mut depth = 0usize;
        for (idx, instr) in self.code.iter().enumerate().skip(blk_pc + 1) {
            match Opcode::try_from(instr.opcode_raw()) {
                Ok(Opcode::Blk) => depth += 1,
                Ok(Opcode::Endblk) => {
                    if depth == 0 {
                        return Ok(idx);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        Err(VmError::UnbalancedBlock)
    }

    /// Shared body of EXCT/SUBN/SUPN/RELT: pop the v6 and v4 tries, then
    /// require every prefix in the chosen domain to match its family's
    /// trie. A null trie rejects prefixes of that family; an empty domain
    /// fails outright.
    fn prefix_match(
        &self,
        scope: &mut EvalScope,
        msg: &MsgView,
        domain: u8,
        op: PrefixMatchOp,
    ) -> Result<(), VmError> {
        let trie_v6 = Self::pop_trie(scope)?;
        let trie_v4 = Self::pop_trie(scope)?;

        let prefixes: &[NetworkPrefix] = match domain {
            ALL_NLRI => &msg.announced,
            ALL_WITHDRAWN => &msg.withdrawn,
            other => return Err(VmError::BadDomain(other)),
        };

        if prefixes.is_empty() {
            return scope.push(Value::Bool(false));
        }

        let all_matched = prefixes.iter().all(|p| {
            let trie = match p.prefix {
                IpNet::V4(_) => &trie_v4,
                IpNet::V6(_) => &trie_v6,
            };
            trie.as_ref()
                .map_or(false, |t| t.matches(&p.prefix, op))
        });
        scope.push(Value::Bool(all_matched))
    }

    fn pop_trie(scope: &mut EvalScope) -> Result<Option<Arc<PrefixTrie>>, VmError> {
        match scope.pop()? {
            Value::Null => Ok(None),
            Value::Trie(t) => Ok(Some(t)),
            _ => Err(VmError::TypeMismatch("prefix matchers expect trie or null")),
        }
    }

    /// Human-readable program listing with the constant pool, for
    /// `--dump-bytecode`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (pc, instr) in self.code.iter().enumerate() {
            let _ = writeln!(out, "{pc:4}: {instr}");
        }
        if !self.pool.is_empty() {
            let _ = writeln!(out, "constants:");
            for (k, constant) in self.pool.iter().enumerate() {
                let _ = writeln!(out, "  K{k} = {constant}");
            }
        }
        if !self.funcs.is_empty() {
            let _ = writeln!(out, "functions:");
            for (k, func) in self.funcs.iter().enumerate() {
                let _ = writeln!(out, "  F{k} = {}", func.name);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asn, AsPath, BgpMessageType, Community};
    use std::str::FromStr;

    fn update_msg() -> MsgView {
        MsgView {
            timestamp: 1_600_000_000.0,
            msg_type: BgpMessageType::Update,
            peer_ip: Some(IpAddr::from_str("10.0.0.1").unwrap()),
            peer_asn: Some(Asn::new_32bit(65001)),
            announced: vec![NetworkPrefix::from_str("10.1.2.0/24").unwrap()],
            withdrawn: vec![],
            as_path: Some(AsPath::from_sequence([65001, 3356, 13335])),
            communities: vec![Community::new(65001, 100)],
            attr_codes: vec![1, 2, 8],
        }
    }

    fn eval(code: Vec<Instr>, pool: Vec<Constant>, msg: &MsgView) -> Result<bool, VmError> {
        Vm::new(code, pool, standard_intrinsics()).eval(msg)
    }

    #[test]
    fn test_toplevel_cpass_cfail() {
        let msg = update_msg();
        // CHKT UPDATE; CPASS; END
        let pass = vec![
            Instr::new(Opcode::Chkt, BgpMessageType::Update.into()),
            Instr::op(Opcode::Cpass),
            Instr::op(Opcode::End),
        ];
        assert_eq!(eval(pass, vec![], &msg), Ok(true));

        // CHKT OPEN; CPASS; END -> default fail
        let fail = vec![
            Instr::new(Opcode::Chkt, BgpMessageType::Open.into()),
            Instr::op(Opcode::Cpass),
            Instr::op(Opcode::End),
        ];
        assert_eq!(eval(fail, vec![], &msg), Ok(false));
    }

    #[test]
    fn test_block_short_circuit() {
        let msg = update_msg();
        // An OR block where the first branch hits: BLK; LOADU 1; CPASS;
        // LOADU 0; CPASS; LOADU 1; CFAIL; ENDBLK; CPASS
        let code = vec![
            Instr::op(Opcode::Blk),
            Instr::new(Opcode::Loadu, 1),
            Instr::op(Opcode::Cpass),
            Instr::new(Opcode::Loadu, 0),
            Instr::op(Opcode::Cpass),
            Instr::new(Opcode::Loadu, 1),
            Instr::op(Opcode::Cfail),
            Instr::op(Opcode::Endblk),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code, vec![], &msg), Ok(true));

        // Both branches miss: the block fails out with false
        let code = vec![
            Instr::op(Opcode::Blk),
            Instr::new(Opcode::Loadu, 0),
            Instr::op(Opcode::Cpass),
            Instr::new(Opcode::Loadu, 0),
            Instr::op(Opcode::Cpass),
            Instr::new(Opcode::Loadu, 1),
            Instr::op(Opcode::Cfail),
            Instr::op(Opcode::Endblk),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code, vec![], &msg), Ok(false));
    }

    #[test]
    fn test_jnz_skips() {
        let msg = update_msg();
        // LOADU 1; JNZ 2; LOADU 0; CPASS; LOADU 1; CPASS
        let code = vec![
            Instr::new(Opcode::Loadu, 1),
            Instr::new(Opcode::Jnz, 2),
            Instr::new(Opcode::Loadu, 0),
            Instr::op(Opcode::Cpass),
            Instr::new(Opcode::Loadu, 1),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code, vec![], &msg), Ok(true));
    }

    #[test]
    fn test_prefix_subnet_match() {
        let msg = update_msg();
        let mut trie = PrefixTrie::new(crate::models::Afi::Ipv4);
        trie.insert(&IpNet::from_str("10.0.0.0/8").unwrap());
        let pool = vec![Constant::Trie(Arc::new(trie))];

        // LOAD K0; LOADN; SUBN nlri; CPASS
        let code = vec![
            Instr::new(Opcode::Load, 0),
            Instr::op(Opcode::Loadn),
            Instr::new(Opcode::Subn, ALL_NLRI),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code.clone(), pool.clone(), &msg), Ok(true));

        // empty withdrawn domain fails the operator
        let code_wd = vec![
            Instr::new(Opcode::Load, 0),
            Instr::op(Opcode::Loadn),
            Instr::new(Opcode::Subn, ALL_WITHDRAWN),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code_wd, pool.clone(), &msg), Ok(false));

        // null v4 trie rejects the v4 announcement
        let code_null = vec![
            Instr::op(Opcode::Loadn),
            Instr::op(Opcode::Loadn),
            Instr::new(Opcode::Subn, ALL_NLRI),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code_null, pool, &msg), Ok(false));
    }

    #[test]
    fn test_aspath_and_communities() {
        let msg = update_msg();
        let regex = AsPathRegex::from_str("^65001 .* 13335$").unwrap();
        let set = CommunitySet::new(vec![
            crate::filter::community::CommunityPattern::from_str("65001:*").unwrap(),
        ]);
        let pool = vec![
            Constant::Regex(Arc::new(regex)),
            Constant::Communities(Arc::new(set)),
        ];

        let code = vec![
            Instr::new(Opcode::Load, 0),
            Instr::op(Opcode::Fasmtc),
            Instr::op(Opcode::Not),
            Instr::op(Opcode::Cfail),
            Instr::new(Opcode::Load, 1),
            Instr::op(Opcode::Comtch),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code, pool, &msg), Ok(true));
    }

    #[test]
    fn test_intrinsics() {
        let mut msg = update_msg();
        let code = vec![
            Instr::new(Opcode::Call, FN_FIND_AS_LOOPS),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(code.clone(), vec![], &msg), Ok(false));
        msg.as_path = Some(AsPath::from_sequence([65001, 3356, 65001]));
        assert_eq!(eval(code, vec![], &msg), Ok(true));

        let bogon = vec![
            Instr::new(Opcode::Call, FN_BOGON_ASN),
            Instr::op(Opcode::Cpass),
        ];
        assert_eq!(eval(bogon, vec![], &msg), Ok(true)); // 65001 is private
    }

    #[test]
    fn test_vm_faults() {
        let msg = update_msg();
        assert_eq!(
            eval(vec![Instr::op(Opcode::Not)], vec![], &msg),
            Err(VmError::StackUnderflow)
        );
        assert_eq!(
            eval(vec![Instr::new(Opcode::Load, 3)], vec![], &msg),
            Err(VmError::BadConstIndex(3))
        );
        assert_eq!(
            eval(vec![Instr(0x00FF)], vec![], &msg),
            Err(VmError::UnknownOpcode(0xFF))
        );
        assert_eq!(
            eval(vec![Instr::op(Opcode::Blk)], vec![], &msg),
            Err(VmError::UnbalancedBlock)
        );
        let overflow = vec![Instr::new(Opcode::Loadu, 1); MAX_STACK + 1];
        assert_eq!(eval(overflow, vec![], &msg), Err(VmError::StackOverflow));
    }
}

/*!
The message filter: a bytecode VM (with its prefix-trie, AS-path-regex,
and community matchers) plus the expression compiler that feeds it.
*/
pub mod aspath_re;
pub mod community;
pub mod compiler;
pub mod trie;
pub mod vm;

pub use aspath_re::AsPathRegex;
pub use community::{CommunityPattern, CommunitySet};
pub use compiler::compile_filter;
pub use trie::{PrefixMatchOp, PrefixTrie};
pub use vm::{
    standard_intrinsics, CmpOp, Constant, Instr, Intrinsic, Opcode, PeerMatch, PeerMatchList,
    TimestampCmp, Vm, VmError, ALL_NLRI, ALL_WITHDRAWN,
};

/*!
Regular expressions over AS paths.

The alphabet is AS numbers, not characters: `65001 .* 65002` matches any
path starting with 65001 and ending with 65002. Supported syntax:

- `NUM` -- a literal ASN; `!NUM` matches any ASN except NUM
- `.` -- any ASN
- `^` / `$` -- anchor to the start / end of the path
- `( ... )` -- grouping, `|` -- alternation
- `*` / `+` / `?` -- repetition of the preceding term or group

Patterns compile once into a small Thompson NFA; matching walks the path
with the usual two-list state-set simulation, so pathological patterns
cannot blow up.
*/
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReToken {
    Asn { asn: u32, negated: bool },
    Any,
    Start,
    End,
    Alt,
    Open,
    Close,
    Star,
    Plus,
    Quest,
}

fn lex(pattern: &str) -> Result<Vec<ReToken>, String> {
    let mut tokens = vec![];
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '^' => ReToken::Start,
            '$' => ReToken::End,
            '|' => ReToken::Alt,
            '(' => ReToken::Open,
            ')' => ReToken::Close,
            '*' => ReToken::Star,
            '+' => ReToken::Plus,
            '?' => ReToken::Quest,
            '.' => ReToken::Any,
            '!' | '0'..='9' => {
                let negated = c == '!';
                let mut digits = String::new();
                if !negated {
                    digits.push(c);
                }
                while let Some(d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err("'!' must be followed by an AS number".to_string());
                }
                let asn: u32 = digits
                    .parse()
                    .map_err(|e| format!("bad AS number {digits:?}: {e}"))?;
                ReToken::Asn { asn, negated }
            }
            other => return Err(format!("unexpected character {other:?} in AS path regex")),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermMatch {
    Any,
    Asn { asn: u32, negated: bool },
}

impl TermMatch {
    fn matches(&self, input: u32) -> bool {
        match self {
            TermMatch::Any => true,
            TermMatch::Asn { asn, negated } => (input == *asn) != *negated,
        }
    }
}

#[derive(Debug)]
enum Ast {
    Empty,
    Term(TermMatch),
    Concat(Vec<Ast>),
    Alt(Vec<Ast>),
    Star(Box<Ast>),
    Plus(Box<Ast>),
    Quest(Box<Ast>),
}

struct AstParser<'a> {
    tokens: &'a [ReToken],
    pos: usize,
}

impl AstParser<'_> {
    fn peek(&self) -> Option<ReToken> {
        self.tokens.get(self.pos).copied()
    }

    fn parse_alt(&mut self) -> Result<Ast, String> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some(ReToken::Alt) {
            self.pos += 1;
            branches.push(self.parse_concat()?);
        }
        Ok(if branches.len() == 1 {
            branches.pop().unwrap()
        } else {
            Ast::Alt(branches)
        })
    }

    fn parse_concat(&mut self) -> Result<Ast, String> {
        let mut parts = vec![];
        loop {
            match self.peek() {
                Some(ReToken::Asn { .. } | ReToken::Any | ReToken::Open) => {
                    parts.push(self.parse_repeat()?);
                }
                Some(ReToken::Star | ReToken::Plus | ReToken::Quest) => {
                    return Err("repetition with nothing to repeat".to_string());
                }
                Some(ReToken::Start | ReToken::End) => {
                    return Err("'^' and '$' are only valid at the pattern edges".to_string());
                }
                _ => break,
            }
        }
        Ok(match parts.len() {
            0 => Ast::Empty,
            1 => parts.pop().unwrap(),
            _ => Ast::Concat(parts),
        })
    }

    fn parse_repeat(&mut self) -> Result<Ast, String> {
        let mut atom = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(ReToken::Star) => atom = Ast::Star(Box::new(atom)),
                Some(ReToken::Plus) => atom = Ast::Plus(Box::new(atom)),
                Some(ReToken::Quest) => atom = Ast::Quest(Box::new(atom)),
                _ => break,
            }
            self.pos += 1;
        }
        Ok(atom)
    }

    fn parse_atom(&mut self) -> Result<Ast, String> {
        match self.peek() {
            Some(ReToken::Asn { asn, negated }) => {
                self.pos += 1;
                Ok(Ast::Term(TermMatch::Asn { asn, negated }))
            }
            Some(ReToken::Any) => {
                self.pos += 1;
                Ok(Ast::Term(TermMatch::Any))
            }
            Some(ReToken::Open) => {
                self.pos += 1;
                let inner = self.parse_alt()?;
                if self.peek() != Some(ReToken::Close) {
                    return Err("unbalanced '(' in AS path regex".to_string());
                }
                self.pos += 1;
                Ok(inner)
            }
            other => Err(format!("unexpected token in AS path regex: {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Term(TermMatch, usize),
    Split(usize, usize),
    Match,
}

const UNPATCHED: usize = usize::MAX;

/// A fragment under construction: entry state plus dangling exits.
/// Exits are `(state index, arm)` pairs to rewrite once the continuation
/// is known.
struct Frag {
    start: usize,
    outs: Vec<(usize, u8)>,
}

struct Compiler {
    states: Vec<State>,
}

impl Compiler {
    fn push(&mut self, state: State) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    fn patch(&mut self, outs: &[(usize, u8)], target: usize) {
        for (idx, arm) in outs {
            match &mut self.states[*idx] {
                State::Term(_, next) => *next = target,
                State::Split(a, b) => {
                    if *arm == 0 {
                        *a = target;
                    } else {
                        *b = target;
                    }
                }
                State::Match => unreachable!("match states have no exits"),
            }
        }
    }

    fn compile(&mut self, ast: &Ast) -> Frag {
        match ast {
            Ast::Empty => {
                let idx = self.push(State::Split(UNPATCHED, UNPATCHED));
                Frag {
                    start: idx,
                    outs: vec![(idx, 0), (idx, 1)],
                }
            }
            Ast::Term(term) => {
                let idx = self.push(State::Term(*term, UNPATCHED));
                Frag {
                    start: idx,
                    outs: vec![(idx, 0)],
                }
            }
            Ast::Concat(parts) => {
                let mut frags = parts.iter().map(|p| self.compile(p)).collect::<Vec<_>>();
                let mut iter = frags.drain(..);
                let mut acc = iter.next().expect("concat is never empty");
                for next in iter {
                    self.patch(&acc.outs, next.start);
                    acc = Frag {
                        start: acc.start,
                        outs: next.outs,
                    };
                }
                acc
            }
            Ast::Alt(branches) => {
                let frags: Vec<Frag> = branches.iter().map(|b| self.compile(b)).collect();
                let mut start = frags[0].start;
                // fold the branches into a chain of binary splits
                for frag in frags.iter().skip(1) {
                    start = self.push(State::Split(start, frag.start));
                }
                let outs = frags.into_iter().flat_map(|f| f.outs).collect();
                Frag { start, outs }
            }
            Ast::Star(inner) => {
                let frag = self.compile(inner);
                let split = self.push(State::Split(frag.start, UNPATCHED));
                self.patch(&frag.outs, split);
                Frag {
                    start: split,
                    outs: vec![(split, 1)],
                }
            }
            Ast::Plus(inner) => {
                let frag = self.compile(inner);
                let split = self.push(State::Split(frag.start, UNPATCHED));
                self.patch(&frag.outs, split);
                Frag {
                    start: frag.start,
                    outs: vec![(split, 1)],
                }
            }
            Ast::Quest(inner) => {
                let frag = self.compile(inner);
                let split = self.push(State::Split(frag.start, UNPATCHED));
                let mut outs = frag.outs;
                outs.push((split, 1));
                Frag {
                    start: split,
                    outs,
                }
            }
        }
    }
}

/// A compiled AS-path regular expression.
#[derive(Debug)]
pub struct AsPathRegex {
    pattern: String,
    states: Vec<State>,
    start: usize,
}

impl FromStr for AsPathRegex {
    type Err = String;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        let mut tokens = lex(pattern)?;

        let anchored_start = tokens.first() == Some(&ReToken::Start);
        if anchored_start {
            tokens.remove(0);
        }
        let anchored_end = tokens.last() == Some(&ReToken::End);
        if anchored_end {
            tokens.pop();
        }

        let mut parser = AstParser {
            tokens: &tokens,
            pos: 0,
        };
        let mut ast = parser.parse_alt()?;
        if parser.pos != tokens.len() {
            return Err("trailing tokens in AS path regex".to_string());
        }

        // an unanchored side gets an implicit `.*`
        if !anchored_start {
            ast = Ast::Concat(vec![Ast::Star(Box::new(Ast::Term(TermMatch::Any))), ast]);
        }
        if !anchored_end {
            ast = Ast::Concat(vec![ast, Ast::Star(Box::new(Ast::Term(TermMatch::Any)))]);
        }

        let mut compiler = Compiler { states: vec![] };
        let frag = compiler.compile(&ast);
        let matched = compiler.push(State::Match);
        compiler.patch(&frag.outs, matched);

        Ok(AsPathRegex {
            pattern: pattern.to_string(),
            states: compiler.states,
            start: frag.start,
        })
    }
}

impl AsPathRegex {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match the whole AS path against the pattern.
    pub fn is_match<I: IntoIterator<Item = u32>>(&self, path: I) -> bool {
        let mut current = vec![false; self.states.len()];
        let mut next = vec![false; self.states.len()];
        self.add_state(&mut current, self.start);

        for asn in path {
            if current.iter().all(|v| !v) {
                return false;
            }
            next.iter_mut().for_each(|v| *v = false);
            for (idx, active) in current.iter().enumerate() {
                if !active {
                    continue;
                }
                if let State::Term(term, out) = &self.states[idx] {
                    if term.matches(asn) {
                        self.add_state(&mut next, *out);
                    }
                }
            }
            std::mem::swap(&mut current, &mut next);
        }

        current
            .iter()
            .enumerate()
            .any(|(idx, active)| *active && matches!(self.states[idx], State::Match))
    }

    /// Follow epsilon transitions from `idx`, marking every reachable
    /// state.
    fn add_state(&self, set: &mut [bool], idx: usize) {
        if set[idx] {
            return;
        }
        set[idx] = true;
        if let State::Split(a, b) = self.states[idx] {
            self.add_state(set, a);
            self.add_state(set, b);
        }
    }

    /// Readable listing of the NFA for bytecode dumps.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "aspath /{}/ start={}", self.pattern, self.start);
        for (idx, state) in self.states.iter().enumerate() {
            let _ = match state {
                State::Term(TermMatch::Any, next) => writeln!(out, "  {idx}: any -> {next}"),
                State::Term(TermMatch::Asn { asn, negated }, next) => {
                    let bang = if *negated { "!" } else { "" };
                    writeln!(out, "  {idx}: {bang}{asn} -> {next}")
                }
                State::Split(a, b) => writeln!(out, "  {idx}: split -> {a}, {b}"),
                State::Match => writeln!(out, "  {idx}: match"),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(pattern: &str) -> AsPathRegex {
        AsPathRegex::from_str(pattern).unwrap()
    }

    #[test]
    fn test_anchored_literal() {
        let r = re("^65001 .* 65002$");
        assert!(r.is_match([65001, 65002]));
        assert!(r.is_match([65001, 3356, 1299, 65002]));
        assert!(!r.is_match([65001, 65002, 65003]));
        assert!(!r.is_match([65000, 65002]));
        assert!(!r.is_match([]));
    }

    #[test]
    fn test_empty_path_anchors() {
        assert!(re("^$").is_match([]));
        assert!(!re("^$").is_match([65001]));
        assert!(re("^.*$").is_match([]));
        assert!(re("^.*$").is_match([65001, 65002]));
    }

    #[test]
    fn test_unanchored_search() {
        let r = re("3356 1299");
        assert!(r.is_match([65001, 3356, 1299, 65002]));
        assert!(r.is_match([3356, 1299]));
        assert!(!r.is_match([3356, 65001, 1299]));
    }

    #[test]
    fn test_alternation_and_groups() {
        let r = re("^(65001|65002) .*$");
        assert!(r.is_match([65001]));
        assert!(r.is_match([65002, 3356]));
        assert!(!r.is_match([65003]));

        let r = re("^(65001 65002)+$");
        assert!(r.is_match([65001, 65002]));
        assert!(r.is_match([65001, 65002, 65001, 65002]));
        assert!(!r.is_match([65001]));
    }

    #[test]
    fn test_negation() {
        let r = re("^!65001 .*$");
        assert!(r.is_match([65002]));
        assert!(r.is_match([3356, 65001]));
        assert!(!r.is_match([65001, 65002]));
    }

    #[test]
    fn test_quest_and_plus() {
        let r = re("^65001 65002? 65003$");
        assert!(r.is_match([65001, 65003]));
        assert!(r.is_match([65001, 65002, 65003]));
        assert!(!r.is_match([65001, 65002, 65002, 65003]));

        let r = re("^65001+$");
        assert!(r.is_match([65001]));
        assert!(r.is_match([65001, 65001, 65001]));
        assert!(!r.is_match([]));
    }

    #[test]
    fn test_lex_errors() {
        assert!(AsPathRegex::from_str("65001 &").is_err());
        assert!(AsPathRegex::from_str("!").is_err());
        assert!(AsPathRegex::from_str("(65001").is_err());
        assert!(AsPathRegex::from_str("* 65001").is_err());
        assert!(AsPathRegex::from_str("65001 ^ 65002").is_err());
    }
}

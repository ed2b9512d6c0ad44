//! PEP 508 environment markers.
//!
//! Layer dependencies are installed for one runtime (CPython 3.11 on
//! x86_64 Linux), so every marker is evaluated against that fixed
//! environment rather than the host running the pass.

use crate::resolver::{SpecOp, Specifier};
use scout_core::{ScoutError, ScoutResult};

/// Values of the marker variables for one install target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerEnvironment {
    pub implementation_name: &'static str,
    pub implementation_version: &'static str,
    pub os_name: &'static str,
    pub platform_machine: &'static str,
    pub platform_python_implementation: &'static str,
    pub platform_system: &'static str,
    pub python_full_version: &'static str,
    pub python_version: &'static str,
    pub sys_platform: &'static str,
    /// `uv pip compile --python-platform` value for the same target.
    pub uv_platform: &'static str,
}

/// The function runtime the shared layer is built for.
pub const LAYER_TARGET: MarkerEnvironment = MarkerEnvironment {
    implementation_name: "cpython",
    implementation_version: "3.11.0",
    os_name: "posix",
    platform_machine: "x86_64",
    platform_python_implementation: "CPython",
    platform_system: "Linux",
    python_full_version: "3.11.0",
    python_version: "3.11",
    sys_platform: "linux",
    uv_platform: "x86_64-manylinux2014",
};

impl MarkerEnvironment {
    /// `None` for names outside PEP 508.
    fn lookup(&self, variable: &str) -> Option<&'static str> {
        let value = match variable {
            "implementation_name" => self.implementation_name,
            "implementation_version" => self.implementation_version,
            "os_name" | "os.name" => self.os_name,
            "platform_machine" | "platform.machine" => self.platform_machine,
            "platform_python_implementation" | "platform.python_implementation" => {
                self.platform_python_implementation
            }
            "platform_system" => self.platform_system,
            "python_full_version" => self.python_full_version,
            "python_version" => self.python_version,
            "sys_platform" | "sys.platform" => self.sys_platform,
            // Not known for a layer build; comparisons against them rarely gate wheels.
            "platform_release" | "platform_version" => "",
            // The layer installs no extras of its own.
            "extra" => "",
            _ => return None,
        };
        Some(value)
    }
}

fn is_version_variable(name: &str) -> bool {
    matches!(
        name,
        "python_version" | "python_full_version" | "implementation_version"
    )
}

// ---------------------------------------------------------------------------
// Syntax
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Variable(String),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Version(SpecOp),
    In,
    NotIn,
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Compare {
        left: Operand,
        op: MarkerOp,
        right: Operand,
    },
    And(Box<Marker>, Box<Marker>),
    Or(Box<Marker>, Box<Marker>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Open,
    Close,
    Str(String),
    Ident(String),
    Op(MarkerOp),
}

fn tokenize(text: &str) -> ScoutResult<Vec<Tok>> {
    let invalid = |why: &str| ScoutError::Resolution(format!("invalid marker {text:?}: {why}"));
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Tok::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::Close);
                i += 1;
            }
            '\'' | '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| invalid("unterminated string"))?;
                tokens.push(Tok::Str(chars[i + 1..i + 1 + close].iter().collect()));
                i += close + 2;
            }
            '=' | '!' | '<' | '>' | '~' => {
                let op: String = chars[i..]
                    .iter()
                    .take_while(|c| matches!(c, '=' | '!' | '<' | '>' | '~'))
                    .collect();
                let spec_op = match op.as_str() {
                    "===" => SpecOp::Arbitrary,
                    "==" => SpecOp::Eq,
                    "!=" => SpecOp::NotEq,
                    ">=" => SpecOp::Gte,
                    "<=" => SpecOp::Lte,
                    ">" => SpecOp::Gt,
                    "<" => SpecOp::Lt,
                    "~=" => SpecOp::Compatible,
                    _ => return Err(invalid("unknown operator")),
                };
                tokens.push(Tok::Op(MarkerOp::Version(spec_op)));
                i += op.len();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word: String = chars[i..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
                    .collect();
                i += word.len();
                tokens.push(Tok::Ident(word));
            }
            _ => return Err(invalid("unexpected character")),
        }
    }

    // `in` and `not in` are words, not symbols.
    let mut merged = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter();
    while let Some(tok) = iter.next() {
        match tok {
            Tok::Ident(ref w) if w == "in" => merged.push(Tok::Op(MarkerOp::In)),
            Tok::Ident(ref w) if w == "not" => match iter.next() {
                Some(Tok::Ident(ref next)) if next == "in" => merged.push(Tok::Op(MarkerOp::NotIn)),
                _ => return Err(invalid("`not` must be followed by `in`")),
            },
            other => merged.push(other),
        }
    }
    Ok(merged)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, why: &str) -> ScoutError {
        ScoutError::Resolution(format!("invalid marker {:?}: {why}", self.text))
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Tok::Ident(w)) if w == word)
    }

    fn or_expr(&mut self) -> ScoutResult<Marker> {
        let mut left = self.and_expr()?;
        while self.peek_word("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Marker::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ScoutResult<Marker> {
        let mut left = self.atom()?;
        while self.peek_word("and") {
            self.pos += 1;
            let right = self.atom()?;
            left = Marker::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn atom(&mut self) -> ScoutResult<Marker> {
        if self.tokens.get(self.pos) == Some(&Tok::Open) {
            self.pos += 1;
            let inner = self.or_expr()?;
            if self.tokens.get(self.pos) != Some(&Tok::Close) {
                return Err(self.error("unbalanced parentheses"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        let left = self.operand()?;
        let op = match self.tokens.get(self.pos) {
            Some(Tok::Op(op)) => *op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        self.pos += 1;
        let right = self.operand()?;
        Ok(Marker::Compare { left, op, right })
    }

    fn operand(&mut self) -> ScoutResult<Operand> {
        let operand = match self.tokens.get(self.pos) {
            Some(Tok::Str(s)) => Operand::Literal(s.clone()),
            Some(Tok::Ident(w)) if LAYER_TARGET.lookup(w).is_some() => Operand::Variable(w.clone()),
            Some(Tok::Ident(w)) => return Err(self.error(&format!("unknown variable {w:?}"))),
            _ => return Err(self.error("expected a variable or string")),
        };
        self.pos += 1;
        Ok(operand)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Marker {
    pub fn parse(text: &str) -> ScoutResult<Self> {
        let mut parser = Parser {
            text,
            tokens: tokenize(text)?,
            pos: 0,
        };
        if parser.tokens.is_empty() {
            return Err(parser.error("empty marker"));
        }
        let marker = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing tokens"));
        }
        Ok(marker)
    }

    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        match self {
            Marker::And(a, b) => a.evaluate(env) && b.evaluate(env),
            Marker::Or(a, b) => a.evaluate(env) || b.evaluate(env),
            Marker::Compare { left, op, right } => compare(env, left, *op, right),
        }
    }
}

fn compare(env: &MarkerEnvironment, left: &Operand, op: MarkerOp, right: &Operand) -> bool {
    let (lhs, lhs_version) = resolve(env, left);
    let (rhs, rhs_version) = resolve(env, right);

    match op {
        MarkerOp::In => rhs.contains(lhs),
        MarkerOp::NotIn => !rhs.contains(lhs),
        MarkerOp::Version(spec_op) if lhs_version || rhs_version => Specifier {
            op: spec_op,
            version: rhs.to_string(),
        }
        .allows(lhs),
        MarkerOp::Version(spec_op) => match spec_op {
            SpecOp::Eq | SpecOp::Arbitrary => lhs == rhs,
            SpecOp::NotEq => lhs != rhs,
            SpecOp::Lt => lhs < rhs,
            SpecOp::Lte => lhs <= rhs,
            SpecOp::Gt => lhs > rhs,
            SpecOp::Gte => lhs >= rhs,
            SpecOp::Compatible => false,
        },
    }
}

fn resolve<'a>(env: &MarkerEnvironment, operand: &'a Operand) -> (&'a str, bool) {
    match operand {
        Operand::Variable(name) => (env.lookup(name).unwrap_or(""), is_version_variable(name)),
        Operand::Literal(value) => (value.as_str(), false),
    }
}

/// Parses `marker` (if any) and evaluates it for the layer target.
pub fn applies_to_layer(marker: Option<&str>) -> ScoutResult<bool> {
    match marker.map(str::trim).filter(|m| !m.is_empty()) {
        Some(text) => Ok(Marker::parse(text)?.evaluate(&LAYER_TARGET)),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> bool {
        Marker::parse(text).unwrap().evaluate(&LAYER_TARGET)
    }

    #[test]
    fn platform_markers() {
        assert!(!eval("sys_platform == 'win32'"));
        assert!(!eval("sys_platform == \"darwin\""));
        assert!(eval("sys_platform == 'linux'"));
        assert!(!eval("platform_system == 'Windows'"));
        assert!(eval("platform_system != 'Windows'"));
        assert!(eval("os_name == 'posix'"));
        assert!(eval("platform_machine == 'x86_64' or platform_machine == 'AMD64'"));
    }

    #[test]
    fn python_version_markers_compare_as_versions() {
        assert!(eval("python_version >= '3.8'"));
        assert!(eval("python_version >= '3.11'"));
        assert!(!eval("python_version < '3.11'"));
        assert!(eval("python_version > '3.9'"));
        assert!(!eval("python_full_version < '3.11'"));
        assert!(eval("'3.10' < python_version"));
    }

    #[test]
    fn boolean_structure() {
        assert!(!eval("python_version < '3.11' and sys_platform == 'linux'"));
        assert!(eval("python_version < '3.11' or sys_platform == 'linux'"));
        assert!(!eval("sys_platform == 'linux' and (platform_system == 'Windows' or os_name == 'nt')"));
        assert!(eval("platform_python_implementation != 'PyPy' and implementation_name == 'cpython'"));
    }

    #[test]
    fn membership() {
        assert!(eval("sys_platform in 'linux darwin'"));
        assert!(eval("sys_platform not in 'win32 cygwin'"));
        assert!(!eval("'win' in sys_platform"));
    }

    #[test]
    fn extras_never_match() {
        assert!(!eval("extra == 'test'"));
    }

    #[test]
    fn malformed_markers_are_resolution_errors() {
        for bad in ["", "sys_platform", "sys_platform == ", "(sys_platform == 'linux'", "colour == 'red'", "sys_platform == 'a", "python_version not '3'"] {
            let err = Marker::parse(bad).unwrap_err();
            assert!(matches!(err, ScoutError::Resolution(_)), "{bad:?}");
        }
    }

    #[test]
    fn absent_marker_applies() {
        assert!(applies_to_layer(None).unwrap());
        assert!(applies_to_layer(Some("  ")).unwrap());
        assert!(!applies_to_layer(Some("sys_platform == 'win32'")).unwrap());
    }
}

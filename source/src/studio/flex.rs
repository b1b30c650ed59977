//! Flex rules: the small stack programs that drive facial morph weights.
//!
//! A rule is stored as a list of opcodes. [`build_rule`] runs the program
//! symbolically and returns the resulting expression tree, which can then be
//! evaluated against controller values or printed.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use ahash::AHashMap;
use bytemuck::{Pod, Zeroable};
use common::prelude::*;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(i32)]
pub enum FlexOpCode {
    Const = 1,
    Fetch1 = 2,
    Fetch2 = 3,
    Add = 4,
    Sub = 5,
    Mul = 6,
    Div = 7,
    Neg = 8,
    Exp = 9,
    Open = 10,
    Close = 11,
    Comma = 12,
    Max = 13,
    Min = 14,
    TwoWay0 = 15,
    TwoWay1 = 16,
    NWay = 17,
    Combo = 18,
    Dominate = 19,
    DmeLowerEyelid = 20,
    DmeUpperEyelid = 21,
}

/// One stored operation. `data` is an index or the bits of an `f32`
/// depending on the opcode.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct FlexOp {
    pub op: i32,
    pub data: i32,
}

impl FlexOp {
    pub fn code(&self) -> Option<FlexOpCode> {
        FlexOpCode::from_i32(self.op)
    }

    pub fn index(&self) -> i32 {
        self.data
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.data as u32)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlexController {
    pub kind: String,
    pub name: String,
    pub local_to_global: i32,
    pub min: f32,
    pub max: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlexFunction {
    Clamp,
    RClamp,
    NWay,
    Min,
    Max,
    Combo,
    Dominator,
    Custom(String),
}

#[derive(Clone, Debug)]
pub enum FlexExpr {
    Value(f32),
    /// A flex controller. Stereo controllers come in `left_`/`right_` pairs.
    Controller { name: String, stereo: bool },
    /// The weight of another flex.
    Flex(String),
    Neg(Box<FlexExpr>),
    Add(Box<FlexExpr>, Box<FlexExpr>),
    Sub(Box<FlexExpr>, Box<FlexExpr>),
    Mul(Box<FlexExpr>, Box<FlexExpr>),
    Div(Box<FlexExpr>, Box<FlexExpr>),
    Function(FlexFunction, Vec<FlexExpr>),
}

impl PartialEq for FlexExpr {
    fn eq(&self, other: &Self) -> bool {
        use FlexExpr::*;
        match (self, other) {
            (Value(a), Value(b)) => a.to_bits() == b.to_bits(),
            (Controller { name: a, stereo: sa }, Controller { name: b, stereo: sb }) => {
                a == b && sa == sb
            }
            (Flex(a), Flex(b)) => a == b,
            (Neg(a), Neg(b)) => a == b,
            (Add(a, b), Add(c, d))
            | (Sub(a, b), Sub(c, d))
            | (Mul(a, b), Mul(c, d))
            | (Div(a, b), Div(c, d)) => a == c && b == d,
            (Function(f, a), Function(g, b)) => f == g && a == b,
            _ => false,
        }
    }
}

impl Eq for FlexExpr {}

impl Hash for FlexExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FlexExpr::Value(v) => v.to_bits().hash(state),
            FlexExpr::Controller { name, stereo } => {
                name.hash(state);
                stereo.hash(state);
            }
            FlexExpr::Flex(name) => name.hash(state),
            FlexExpr::Neg(e) => e.hash(state),
            FlexExpr::Add(a, b) | FlexExpr::Sub(a, b) | FlexExpr::Mul(a, b) | FlexExpr::Div(a, b) => {
                a.hash(state);
                b.hash(state);
            }
            FlexExpr::Function(f, args) => {
                f.hash(state);
                args.hash(state);
            }
        }
    }
}

/// Values the leaves of an expression read from.
pub trait FlexInputs {
    fn controller(&self, name: &str) -> f32;
    fn flex(&self, name: &str) -> f32;
}

/// Name keyed inputs. Anything missing reads as zero.
#[derive(Clone, Debug, Default)]
pub struct FlexValues {
    pub controllers: AHashMap<String, f32>,
    pub flexes: AHashMap<String, f32>,
}

impl FlexInputs for FlexValues {
    fn controller(&self, name: &str) -> f32 {
        self.controllers.get(name).copied().unwrap_or(0.0)
    }

    fn flex(&self, name: &str) -> f32 {
        self.flexes.get(name).copied().unwrap_or(0.0)
    }
}

fn remap_clamped(v: f32, a: f32, b: f32, c: f32, d: f32) -> f32 {
    if a == b {
        return if v >= b { d } else { c };
    }
    let t = ((v - a) / (b - a)).clamp(0.0, 1.0);
    c + (d - c) * t
}

fn nway(v: f32, multiplier: f32, x: f32, y: f32, z: f32, w: f32) -> f32 {
    let greater_than_x = (-(x - v).min(0.0)).min(1.0);
    let less_than_y = (-(v - y).min(0.0)).min(1.0);
    let remap_x = ((v - x) / (y - x)).max(0.0).min(1.0);
    let greater_than_equal_y = -((-(v - y).min(0.0)).min(1.0) - 1.0);
    let less_than_equal_z = -((-(z - v).min(0.0)).min(1.0) - 1.0);
    let greater_than_z = (-(z - v).min(0.0)).min(1.0);
    let less_than_w = (-(v - w).min(0.0)).min(1.0);
    let remap_z = 1.0 - ((v - z) / (w - z)).max(0.0).min(1.0);

    let value = greater_than_x * less_than_y * remap_x
        + greater_than_equal_y * less_than_equal_z
        + greater_than_z * less_than_w * remap_z;
    value * multiplier
}

impl FlexExpr {
    fn binary(self, rhs: FlexExpr, op: fn(Box<FlexExpr>, Box<FlexExpr>) -> FlexExpr) -> FlexExpr {
        op(Box::new(self), Box::new(rhs))
    }

    fn is_leaf(&self) -> bool {
        matches!(
            self,
            FlexExpr::Value(_) | FlexExpr::Controller { .. } | FlexExpr::Flex(_) | FlexExpr::Neg(_)
        )
    }

    fn is_operator(&self) -> bool {
        matches!(
            self,
            FlexExpr::Add(..) | FlexExpr::Sub(..) | FlexExpr::Mul(..) | FlexExpr::Div(..)
        )
    }

    pub fn eval(&self, inputs: &dyn FlexInputs) -> Result<f32> {
        Ok(match self {
            FlexExpr::Value(v) => *v,
            FlexExpr::Controller { name, .. } => inputs.controller(name),
            FlexExpr::Flex(name) => inputs.flex(name),
            FlexExpr::Neg(e) => -e.eval(inputs)?,
            FlexExpr::Add(a, b) => a.eval(inputs)? + b.eval(inputs)?,
            FlexExpr::Sub(a, b) => a.eval(inputs)? - b.eval(inputs)?,
            FlexExpr::Mul(a, b) => a.eval(inputs)? * b.eval(inputs)?,
            FlexExpr::Div(a, b) => {
                let d = b.eval(inputs)?;
                if d > 0.0001 {
                    a.eval(inputs)? / d
                } else {
                    0.0
                }
            }
            FlexExpr::Function(function, args) => {
                let values = args
                    .iter()
                    .map(|a| a.eval(inputs))
                    .collect::<Result<Vec<_>>>()?;
                match (function, values.as_slice()) {
                    (FlexFunction::Clamp, &[v, lo, hi]) => v.max(lo).min(hi),
                    (FlexFunction::RClamp, &[v, a, b, c, d]) => remap_clamped(v, a, b, c, d),
                    (FlexFunction::NWay, &[v, m, x, y, z, w]) => nway(v, m, x, y, z, w),
                    (FlexFunction::Min, &[a, b]) => a.min(b),
                    (FlexFunction::Max, &[a, b]) => a.max(b),
                    (FlexFunction::Combo, values) => values.iter().product(),
                    (FlexFunction::Dominator, [rest @ .., last]) => {
                        (1.0 - last) * rest.iter().product::<f32>()
                    }
                    (function, values) => {
                        return Err(Error::unsupported(format!(
                            "cannot evaluate {function:?} with {} operands",
                            values.len()
                        )))
                    }
                }
            }
        })
    }

    /// Renders the expression using plain arithmetic and `min`/`max`, the
    /// form driver expressions in other tools accept.
    pub fn as_simple(&self) -> String {
        match self {
            FlexExpr::Value(v) => format_value(*v),
            FlexExpr::Controller { name, stereo } => {
                let name = name.replace(' ', "_");
                if *stereo {
                    if let Some(rest) = name.strip_prefix("right_").or_else(|| name.strip_prefix("left_")) {
                        return rest.to_owned();
                    }
                }
                name
            }
            FlexExpr::Flex(name) => name.replace(' ', "_"),
            FlexExpr::Neg(e) => format!("(-{})", e.as_simple()),
            FlexExpr::Add(a, b) => format!("({} + {})", a.as_simple(), b.as_simple()),
            FlexExpr::Sub(a, b) => format!("({} - {})", a.as_simple(), b.as_simple()),
            FlexExpr::Mul(a, b) => format!("({} * {})", a.as_simple(), b.as_simple()),
            FlexExpr::Div(a, b) => format!("({} / {})", a.as_simple(), b.as_simple()),
            FlexExpr::Function(function, args) => simple_function(function, args),
        }
    }
}

fn simple_function(function: &FlexFunction, args: &[FlexExpr]) -> String {
    let s: Vec<String> = args.iter().map(FlexExpr::as_simple).collect();
    let wrapped = |i: usize| {
        if args[i].is_leaf() {
            s[i].clone()
        } else {
            format!("({})", s[i])
        }
    };
    match (function, s.len()) {
        (FlexFunction::RClamp, 5) => format!(
            "RemapValClamped({}, {}, {}, {}, {})",
            s[0], s[1], s[2], s[3], s[4]
        ),
        (FlexFunction::Clamp, 3) => format!("min(max({}, {}), {})", s[0], s[1], s[2]),
        (FlexFunction::Max, 2) => format!("max({},{})", wrapped(0), wrapped(1)),
        (FlexFunction::Min, 2) => format!("min({},{})", wrapped(0), wrapped(1)),
        (FlexFunction::Combo, _) => format!("({})", s.join("*")),
        (FlexFunction::Dominator, 1) => format!("(1 - {})", s[0]),
        (FlexFunction::Dominator, n) if n > 0 => {
            format!("((1 - {}) * {})", s[n - 1], s[..n - 1].join("*"))
        }
        (FlexFunction::NWay, 6) => {
            let (v, m, x, y, z, w) = (&s[0], &s[1], &s[2], &s[3], &s[4], &s[5]);
            let greater_than_x = format!("min(1, (-min(0, ({x} - {v}))))");
            let less_than_y = format!("min(1, (-min(0, ({v} - ({y})))))");
            let remap_x = format!("min(max(({v} - {x}) / ({y} - ({x})), 0), 1)");
            let greater_than_equal_y = format!("-(min(1, (-min(0, ({v} - ({y}))))) - 1)");
            let less_than_equal_z = format!("-(min(1, (-min(0, ({z} - {v})))) - 1)");
            let greater_than_z = format!("min(1, (-min(0, ({z} - {v}))))");
            let less_than_w = format!("min(1, (-min(0, ({v} - ({w})))))");
            let remap_z = format!("(1 - (min(max(({v} - ({z})) / ({w} - ({z})), 0), 1)))");
            format!(
                "(((({greater_than_x} * {less_than_y}) * {remap_x}) + ({greater_than_equal_y} * {less_than_equal_z}) + (({greater_than_z} * {less_than_w}) * {remap_z})) * ({m}))"
            )
        }
        (FlexFunction::Custom(name), _) => format!("{name}({})", s.join(", ")),
        (function, _) => format!("{function:?}({})", s.join(", ")),
    }
}

/// Up to four significant digits, always with a fractional part.
fn format_value(v: f32) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{v:.1}");
    }
    let magnitude = v.abs().log10().floor() as i32;
    let decimals = (3 - magnitude).max(1) as usize;
    let mut s = format!("{v:.decimals$}");
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

impl fmt::Display for FlexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operand = |e: &FlexExpr| {
            if e.is_operator() {
                format!("({e})")
            } else {
                e.to_string()
            }
        };
        match self {
            FlexExpr::Value(v) => write!(f, "{}", format_value(*v)),
            FlexExpr::Controller { name, .. } | FlexExpr::Flex(name) => {
                write!(f, "{}", name.replace(' ', "_"))
            }
            FlexExpr::Neg(e) => write!(f, "(-{e})"),
            FlexExpr::Add(a, b) => write!(f, "{} + {}", operand(a), operand(b)),
            FlexExpr::Sub(a, b) => write!(f, "{} - {}", operand(a), operand(b)),
            FlexExpr::Mul(a, b) => write!(f, "{}*{}", operand(a), operand(b)),
            FlexExpr::Div(a, b) => write!(f, "{}/{}", operand(a), operand(b)),
            FlexExpr::Function(function, args) => {
                let list = |sep: &str| args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(sep);
                let wrapped = |e: &FlexExpr| if e.is_leaf() { e.to_string() } else { format!("({e})") };
                match function {
                    FlexFunction::Clamp => write!(f, "clamp({})", list(",")),
                    FlexFunction::RClamp => write!(f, "rclamped({})", list(", ")),
                    FlexFunction::NWay => write!(f, "nway({})", list(", ")),
                    FlexFunction::Combo => write!(f, "combo({})", list(", ")),
                    FlexFunction::Dominator => write!(f, "dom({})", list(", ")),
                    FlexFunction::Min | FlexFunction::Max if args.len() == 2 => {
                        let name = if *function == FlexFunction::Min { "min" } else { "max" };
                        write!(f, "{name}({},{})", wrapped(&args[0]), wrapped(&args[1]))
                    }
                    FlexFunction::Min => write!(f, "min({})", list(",")),
                    FlexFunction::Max => write!(f, "max({})", list(",")),
                    FlexFunction::Custom(name) => write!(f, "{name}({})", list(", ")),
                }
            }
        }
    }
}

struct RuleBuilder<'a> {
    controllers: &'a [FlexController],
    flexes: &'a [String],
    stack: Vec<FlexExpr>,
}

impl RuleBuilder<'_> {
    fn pop(&mut self, at: usize) -> Result<FlexExpr> {
        self.stack
            .pop()
            .ok_or_else(|| Error::assertion(at, "flex rule stack underflow"))
    }

    fn pop_n(&mut self, at: usize, n: usize) -> Result<Vec<FlexExpr>> {
        if self.stack.len() < n {
            return Err(Error::assertion(
                at,
                format!("flex rule wants {n} operands, stack holds {}", self.stack.len()),
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn controller(&self, at: usize, index: i32) -> Result<FlexExpr> {
        let controller = usize::try_from(index)
            .ok()
            .and_then(|i| self.controllers.get(i))
            .ok_or_else(|| Error::assertion(at, format!("flex controller {index} out of range")))?;
        let name = &controller.name;
        let pair = if let Some(rest) = name.strip_prefix("left_") {
            Some(format!("right_{rest}"))
        } else {
            name.strip_prefix("right_").map(|rest| format!("left_{rest}"))
        };
        let stereo = pair.is_some_and(|pair| self.controllers.iter().any(|c| c.name == pair));
        Ok(FlexExpr::Controller {
            name: name.clone(),
            stereo,
        })
    }

    fn step(&mut self, at: usize, op: &FlexOp) -> Result<()> {
        let code = op
            .code()
            .ok_or_else(|| Error::assertion(at, format!("unknown flex opcode {}", { op.op })))?;
        let expr = match code {
            FlexOpCode::Const => FlexExpr::Value(op.value()),
            FlexOpCode::Fetch1 => self.controller(at, op.index())?,
            FlexOpCode::Fetch2 => {
                let index = op.index();
                let name = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.flexes.get(i))
                    .ok_or_else(|| Error::assertion(at, format!("flex {index} out of range")))?;
                FlexExpr::Flex(name.clone())
            }
            FlexOpCode::Add | FlexOpCode::Sub | FlexOpCode::Mul | FlexOpCode::Div => {
                let rhs = self.pop(at)?;
                let lhs = self.pop(at)?;
                let make: fn(Box<FlexExpr>, Box<FlexExpr>) -> FlexExpr = match code {
                    FlexOpCode::Add => FlexExpr::Add,
                    FlexOpCode::Sub => FlexExpr::Sub,
                    FlexOpCode::Mul => FlexExpr::Mul,
                    _ => FlexExpr::Div,
                };
                lhs.binary(rhs, make)
            }
            FlexOpCode::Neg => FlexExpr::Neg(Box::new(self.pop(at)?)),
            FlexOpCode::Max | FlexOpCode::Min => {
                let args = self.pop_n(at, 2)?;
                let function = if code == FlexOpCode::Max {
                    FlexFunction::Max
                } else {
                    FlexFunction::Min
                };
                FlexExpr::Function(function, args)
            }
            FlexOpCode::TwoWay0 | FlexOpCode::TwoWay1 => {
                let ctrl = self.controller(at, op.index())?;
                let range: [f32; 4] = if code == FlexOpCode::TwoWay0 {
                    [-1.0, 0.0, 1.0, 0.0]
                } else {
                    [0.0, 1.0, 0.0, 1.0]
                };
                let mut args = vec![ctrl];
                args.extend(range.map(FlexExpr::Value));
                FlexExpr::Function(FlexFunction::RClamp, args)
            }
            FlexOpCode::NWay => {
                let multiplier = self.controller(at, op.index())?;
                // the value controller is pushed as a constant index
                let value = match self.pop(at)? {
                    FlexExpr::Value(index) => self.controller(at, index as i32)?,
                    other => other,
                };
                let ranges = self.pop_n(at, 4)?;
                // pushed as w, z, y, x
                let mut args = vec![value, multiplier];
                args.extend(ranges.into_iter().rev());
                FlexExpr::Function(FlexFunction::NWay, args)
            }
            FlexOpCode::Combo => {
                let args = self.pop_n(at, op.index().max(0) as usize)?;
                FlexExpr::Function(FlexFunction::Combo, args)
            }
            FlexOpCode::Dominate => {
                let args = self.pop_n(at, op.index().max(0) as usize + 1)?;
                FlexExpr::Function(FlexFunction::Dominator, args)
            }
            FlexOpCode::DmeLowerEyelid | FlexOpCode::DmeUpperEyelid => {
                let mut args = vec![self.controller(at, op.index())?];
                args.extend(self.pop_n(at, 3)?);
                let name = if code == FlexOpCode::DmeLowerEyelid {
                    "lower_eyelid"
                } else {
                    "upper_eyelid"
                };
                FlexExpr::Function(FlexFunction::Custom(name.to_owned()), args)
            }
            FlexOpCode::Open | FlexOpCode::Close | FlexOpCode::Comma => return Ok(()),
            FlexOpCode::Exp => return Err(Error::unsupported("flex rule uses exp")),
        };
        self.stack.push(expr);
        Ok(())
    }
}

/// Runs `ops` and returns the single expression left on the stack.
pub fn build_rule(ops: &[FlexOp], controllers: &[FlexController], flexes: &[String]) -> Result<FlexExpr> {
    let mut builder = RuleBuilder {
        controllers,
        flexes,
        stack: Vec::new(),
    };
    for (at, op) in ops.iter().enumerate() {
        builder.step(at, op)?;
    }
    match builder.stack.len() {
        1 => builder.pop(ops.len()),
        n => Err(Error::assertion(
            ops.len(),
            format!("flex rule left {n} values on the stack"),
        )),
    }
}

#[cfg(test)]
pub(crate) mod flex_tests {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn op(code: FlexOpCode, data: i32) -> FlexOp {
        FlexOp {
            op: code as i32,
            data,
        }
    }

    pub(crate) fn constant(v: f32) -> FlexOp {
        op(FlexOpCode::Const, v.to_bits() as i32)
    }

    pub(crate) fn controllers(names: &[&str]) -> Vec<FlexController> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| FlexController {
                kind: "eyes".to_owned(),
                name: (*name).to_owned(),
                local_to_global: i as i32,
                min: 0.0,
                max: 1.0,
            })
            .collect()
    }

    fn ctrl(name: &str) -> FlexExpr {
        FlexExpr::Controller {
            name: name.to_owned(),
            stereo: false,
        }
    }

    fn inputs(pairs: &[(&str, f32)]) -> FlexValues {
        FlexValues {
            controllers: pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
            flexes: AHashMap::new(),
        }
    }

    #[test]
    fn dominator_text() {
        let expr = FlexExpr::Function(FlexFunction::Dominator, vec![ctrl("a"), ctrl("b"), ctrl("c")]);
        assert_eq!(expr.as_simple(), "((1 - c) * a*b)");
        assert_eq!(expr.to_string(), "dom(a, b, c)");
        let v = expr.eval(&inputs(&[("a", 0.5), ("b", 0.5), ("c", 0.25)])).unwrap();
        assert_eq!(v, 0.75 * 0.25);

        let lone = FlexExpr::Function(FlexFunction::Dominator, vec![ctrl("a")]);
        assert_eq!(lone.as_simple(), "(1 - a)");
        assert_eq!(lone.eval(&inputs(&[("a", 0.25)])).unwrap(), 0.75);
    }

    #[test]
    fn arithmetic_program() {
        // (smile - 0.5) * 2
        let ops = [
            op(FlexOpCode::Fetch1, 0),
            constant(0.5),
            op(FlexOpCode::Sub, 0),
            constant(2.0),
            op(FlexOpCode::Mul, 0),
        ];
        let expr = build_rule(&ops, &controllers(&["smile"]), &[]).unwrap();
        assert_eq!(expr.to_string(), "(smile - 0.5)*2.0");
        assert_eq!(expr.as_simple(), "((smile - 0.5) * 2.0)");
        assert_eq!(expr.eval(&inputs(&[("smile", 1.0)])).unwrap(), 1.0);
    }

    #[test]
    fn functions_and_flex_fetch() {
        let flexes = vec!["blink".to_owned()];
        let ops = [
            op(FlexOpCode::Fetch2, 0),
            op(FlexOpCode::TwoWay1, 0),
            op(FlexOpCode::Max, 0),
        ];
        let expr = build_rule(&ops, &controllers(&["lid"]), &flexes).unwrap();
        assert_eq!(expr.to_string(), "max(blink,(rclamped(lid, 0.0, 1.0, 0.0, 1.0)))");
        assert_eq!(
            expr.as_simple(),
            "max(blink,(RemapValClamped(lid, 0.0, 1.0, 0.0, 1.0)))"
        );
        let mut values = inputs(&[("lid", 0.25)]);
        values.flexes.insert("blink".to_owned(), 0.1);
        assert_eq!(expr.eval(&values).unwrap(), 0.25);

        let two_way = build_rule(&[op(FlexOpCode::TwoWay0, 0)], &controllers(&["lid"]), &[]).unwrap();
        assert_eq!(two_way.eval(&inputs(&[("lid", -0.5)])).unwrap(), 0.5);
    }

    #[test]
    fn combo_and_dominate_ops() {
        let ctl = controllers(&["a", "b", "c"]);
        let ops = [
            op(FlexOpCode::Fetch1, 0),
            op(FlexOpCode::Fetch1, 1),
            op(FlexOpCode::Combo, 2),
            op(FlexOpCode::Fetch1, 2),
            op(FlexOpCode::Dominate, 1),
        ];
        let expr = build_rule(&ops, &ctl, &[]).unwrap();
        assert_eq!(expr.to_string(), "dom(combo(a, b), c)");
        assert_eq!(expr.as_simple(), "((1 - c) * (a*b))");
        let v = expr.eval(&inputs(&[("a", 1.0), ("b", 0.5), ("c", 0.5)])).unwrap();
        assert_eq!(v, 0.25);
    }

    #[test]
    fn nway_window() {
        let ctl = controllers(&["value", "gain"]);
        let ops = [
            constant(1.0),
            constant(0.75),
            constant(0.5),
            constant(0.25),
            constant(0.0),
            op(FlexOpCode::NWay, 1),
        ];
        let expr = build_rule(&ops, &ctl, &[]).unwrap();
        let FlexExpr::Function(FlexFunction::NWay, args) = &expr else {
            panic!("expected nway, got {expr}");
        };
        assert_eq!(args[0], ctrl("value"));
        assert_eq!(args[1], ctrl("gain"));
        assert_eq!(args[2], FlexExpr::Value(0.25));
        assert_eq!(args[5], FlexExpr::Value(1.0));
        // inside the flat top between y and z
        let v = expr.eval(&inputs(&[("value", 0.6), ("gain", 1.0)])).unwrap();
        assert!((v - 1.0).abs() < 1e-6);
        let v = expr.eval(&inputs(&[("value", 0.6), ("gain", 0.5)])).unwrap();
        assert!((v - 0.5).abs() < 1e-6);
        assert!(expr.as_simple().ends_with("* (gain))"));
    }

    #[test]
    fn stereo_names() {
        let ctl = controllers(&["left_smile", "right_smile", "left_only"]);
        let expr = build_rule(&[op(FlexOpCode::Fetch1, 1)], &ctl, &[]).unwrap();
        assert_eq!(expr.as_simple(), "smile");
        assert_eq!(expr.to_string(), "right_smile");
        let expr = build_rule(&[op(FlexOpCode::Fetch1, 2)], &ctl, &[]).unwrap();
        assert_eq!(expr.as_simple(), "left_only");
    }

    #[test]
    fn structural_equality() {
        use std::collections::HashSet;
        let a = FlexExpr::Add(Box::new(ctrl("x")), Box::new(FlexExpr::Value(1.0)));
        let b = FlexExpr::Add(Box::new(ctrl("x")), Box::new(FlexExpr::Value(1.0)));
        let c = FlexExpr::Sub(Box::new(ctrl("x")), Box::new(FlexExpr::Value(1.0)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn malformed_programs() {
        let ctl = controllers(&["a"]);
        assert!(build_rule(&[op(FlexOpCode::Add, 0)], &ctl, &[]).is_err());
        assert!(build_rule(&[op(FlexOpCode::Fetch1, 3)], &ctl, &[]).is_err());
        assert!(build_rule(&[constant(1.0), constant(2.0)], &ctl, &[]).is_err());
        assert!(build_rule(&[FlexOp { op: 99, data: 0 }], &ctl, &[]).is_err());
        assert!(build_rule(&[], &ctl, &[]).is_err());
        let custom = FlexExpr::Function(FlexFunction::Custom("lower_eyelid".into()), vec![]);
        assert!(custom.eval(&FlexValues::default()).is_err());
    }

    #[test]
    fn divide_guard() {
        let expr = FlexExpr::Div(Box::new(FlexExpr::Value(1.0)), Box::new(FlexExpr::Value(0.0)));
        assert_eq!(expr.eval(&FlexValues::default()).unwrap(), 0.0);
        assert_eq!(expr.to_string(), "1.0/0.0");
    }
}

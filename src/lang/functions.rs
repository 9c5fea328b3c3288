use std::convert::TryFrom;
use std::f64::consts::PI;

use anyhow::{bail, Error, Result};
use lazy_static::lazy_static;
use rand::Rng;

use crate::lang::ast::{Expression, Identifier};

/// Primitive operations that map straight onto a single float instruction or libm call
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Intrinsic {
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Exp,
    Log,
    Sin,
    Cos,
    Abs,
    Min,
    Max,
    Round,
}

/// Native routines with no primitive counterpart
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Builtin {
    Tan,
    Asin,
    Acos,
    Atan,
    Gamma,
    Rand,
}

impl Intrinsic {
    pub fn arity(self) -> usize {
        match self {
            Intrinsic::Min | Intrinsic::Max => 2,
            _ => 1,
        }
    }

    pub fn call(self, args: &[f64]) -> f64 {
        match (self, args) {
            (Intrinsic::Sqrt, [x]) => x.sqrt(),
            (Intrinsic::Ceil, [x]) => x.ceil(),
            (Intrinsic::Floor, [x]) => x.floor(),
            (Intrinsic::Trunc, [x]) => x.trunc(),
            (Intrinsic::Exp, [x]) => x.exp(),
            (Intrinsic::Log, [x]) => x.ln(),
            (Intrinsic::Sin, [x]) => x.sin(),
            (Intrinsic::Cos, [x]) => x.cos(),
            (Intrinsic::Abs, [x]) => x.abs(),
            (Intrinsic::Round, [x]) => x.round(),
            // f64::min/max already ignore a NaN operand
            (Intrinsic::Min, [x, y]) => x.min(*y),
            (Intrinsic::Max, [x, y]) => x.max(*y),
            _ => unreachable!("arity is checked before every call"),
        }
    }
}

impl Builtin {
    pub fn arity(self) -> usize {
        match self {
            Builtin::Rand => 2,
            _ => 1,
        }
    }

    pub fn call(self, args: &[f64]) -> f64 {
        match (self, args) {
            (Builtin::Tan, [x]) => x.tan(),
            (Builtin::Asin, [x]) => x.asin(),
            (Builtin::Acos, [x]) => x.acos(),
            (Builtin::Atan, [x]) => x.atan(),
            (Builtin::Gamma, [x]) => gamma(*x),
            (Builtin::Rand, [min, max]) => uniform(*min, *max),
            _ => unreachable!("arity is checked before every call"),
        }
    }
}

/// Uniform in `[min, max]`
///
/// Interpolates instead of using `gen_range`, which cannot handle a range wider than `f64::MAX`.
fn uniform(min: f64, max: f64) -> f64 {
    if !min.is_finite() || !max.is_finite() || max < min {
        return f64::NAN;
    }

    let t: f64 = rand::thread_rng().gen();
    (min * (1.0 - t) + max * t).max(min).min(max)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Γ(x) via the Lanczos approximation, with the reflection formula below 1/2
fn gamma(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        return f64::NAN;
    }
    if x == f64::INFINITY {
        return x;
    }
    if x <= 0.0 && x.fract() == 0.0 {
        // Poles at zero and the negative integers
        return f64::NAN;
    }
    if x < 0.5 {
        return PI / ((PI * x).sin() * gamma(1.0 - x));
    }

    let x = x - 1.0;
    let mut sum = LANCZOS_COEFFICIENTS[0];
    for (i, c) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;

    // t^(x + 1/2) * e^-t overflows and underflows separately long before the product does
    let exponent = (x + 0.5) * t.ln() - t;
    if exponent > f64::MAX.ln() {
        return f64::INFINITY;
    }

    (2.0 * PI).sqrt() * exponent.exp() * sum
}

#[derive(Debug, PartialEq, Clone)]
pub enum FunctionKind {
    Intrinsic(Intrinsic),
    Builtin(Builtin),
    UserDefined(Expression),
}

/// Anything callable with `name(args...)`
#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    /// Distinct, in call order
    pub params: Vec<Identifier>,
    pub kind: FunctionKind,
}

impl Function {
    pub fn user_defined(params: Vec<Identifier>, body: Expression) -> Self {
        Function {
            params,
            kind: FunctionKind::UserDefined(body),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn body(&self) -> Option<&Expression> {
        match &self.kind {
            FunctionKind::UserDefined(body) => Some(body),
            _ => None,
        }
    }

    /// `name(p1, p2)` followed by ` (builtin)` or ` = <body>`
    pub fn signature(&self, name: &Identifier) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.0.as_str()).collect();
        let mut s = format!("{}({})", name, params.join(", "));
        match self.body() {
            Some(body) => s += &format!(" = {}", body),
            None => s += " (builtin)",
        }

        s
    }
}

/// Everything `import` knows about
#[derive(PartialEq, Clone, Copy)]
pub enum Importable {
    Constant(&'static str, f64),
    Intrinsic(&'static str, Intrinsic),
    Builtin(&'static str, Builtin),
}

impl Importable {
    pub fn name(&self) -> &'static str {
        match self {
            Importable::Constant(n, _) | Importable::Intrinsic(n, _) | Importable::Builtin(n, _) => *n,
        }
    }

    /// The function to install, `None` for constants
    pub fn function(&self) -> Option<Function> {
        let (kind, arity) = match *self {
            Importable::Constant(_, _) => return None,
            Importable::Intrinsic(_, i) => (FunctionKind::Intrinsic(i), i.arity()),
            Importable::Builtin(_, b) => (FunctionKind::Builtin(b), b.arity()),
        };
        let params = match (self, arity) {
            (Importable::Builtin(_, Builtin::Rand), _) => vec!["min", "max"],
            (_, 2) => vec!["x", "y"],
            _ => vec!["x"],
        };

        Some(Function {
            params: params.into_iter().map(Identifier::from).collect(),
            kind,
        })
    }
}

impl TryFrom<&str> for Importable {
    type Error = Error;

    fn try_from(name: &str) -> Result<Self> {
        match BUILTINS.iter().find(|b| b.name() == name) {
            Some(b) => Ok(*b),
            None => bail!("{} is not in builtin list", name),
        }
    }
}

lazy_static! {
    pub static ref BUILTINS: Vec<Importable> = vec![
        Importable::Constant("pi", PI),
        Importable::Constant("e", std::f64::consts::E),
        Importable::Constant("sqrt2", std::f64::consts::SQRT_2),
        Importable::Constant("phi", (1.0 + 5f64.sqrt()) / 2.0),
        Importable::Intrinsic("sqrt", Intrinsic::Sqrt),
        Importable::Intrinsic("ceil", Intrinsic::Ceil),
        Importable::Intrinsic("floor", Intrinsic::Floor),
        Importable::Intrinsic("trunc", Intrinsic::Trunc),
        Importable::Intrinsic("exp", Intrinsic::Exp),
        Importable::Intrinsic("log", Intrinsic::Log),
        Importable::Intrinsic("sin", Intrinsic::Sin),
        Importable::Intrinsic("cos", Intrinsic::Cos),
        Importable::Intrinsic("abs", Intrinsic::Abs),
        Importable::Intrinsic("min", Intrinsic::Min),
        Importable::Intrinsic("max", Intrinsic::Max),
        Importable::Intrinsic("round", Intrinsic::Round),
        Importable::Builtin("tan", Builtin::Tan),
        Importable::Builtin("asin", Builtin::Asin),
        Importable::Builtin("acos", Builtin::Acos),
        Importable::Builtin("atan", Builtin::Atan),
        Importable::Builtin("gamma", Builtin::Gamma),
        Importable::Builtin("rand", Builtin::Rand),
    ];
}

#[cfg(test)]
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

#[test]
fn test_intrinsics() {
    assert_eq!(Intrinsic::Sqrt.call(&[9.0]), 3.0);
    assert_eq!(Intrinsic::Round.call(&[2.5]), 3.0);
    assert_eq!(Intrinsic::Round.call(&[-2.5]), -3.0);
    assert_eq!(Intrinsic::Trunc.call(&[-2.7]), -2.0);
    assert_eq!(Intrinsic::Min.call(&[f64::NAN, 1.0]), 1.0);
    assert_eq!(Intrinsic::Max.call(&[2.0, 7.0]), 7.0);
}

#[test]
#[should_panic]
fn test_call_with_wrong_arity() {
    Intrinsic::Sqrt.call(&[1.0, 2.0]);
}

#[test]
fn test_gamma() {
    assert!(close(gamma(1.0), 1.0));
    assert!(close(gamma(5.0), 24.0));
    assert!(close(gamma(0.5), PI.sqrt()));
    assert!(close(gamma(-0.5), -2.0 * PI.sqrt()));
    assert!(gamma(0.0).is_nan());
    assert!(gamma(-3.0).is_nan());
    assert!(close(gamma(171.0), 7.257_415_615_307_999e306));
    assert_eq!(gamma(1000.0), f64::INFINITY);
    assert_eq!(gamma(f64::INFINITY), f64::INFINITY);
    assert_eq!(gamma(-1000.5), 0.0);
}

#[test]
fn test_rand() {
    for _ in 0..100 {
        let r = Builtin::Rand.call(&[2.0, 3.0]);
        assert!((2.0..=3.0).contains(&r));
    }
    assert_eq!(Builtin::Rand.call(&[4.0, 4.0]), 4.0);
    assert!(Builtin::Rand.call(&[3.0, 2.0]).is_nan());
    assert!(Builtin::Rand.call(&[0.0, f64::INFINITY]).is_nan());

    // Wider than f64::MAX
    for _ in 0..100 {
        let r = Builtin::Rand.call(&[-1e308, 1e308]);
        assert!((-1e308..=1e308).contains(&r));
    }
    let r = Builtin::Rand.call(&[-f64::MAX, f64::MAX]);
    assert!(r.is_finite());
}

#[test]
fn test_importable() {
    assert!(Importable::try_from("pi").is_ok());
    assert!(Importable::try_from("gamma").is_ok());
    assert!(Importable::try_from("tau").is_err());

    let rand = Importable::try_from("rand").unwrap().function().unwrap();
    assert_eq!(rand.signature(&Identifier::from("rand")), "rand(min, max) (builtin)");
    let min = Importable::try_from("min").unwrap().function().unwrap();
    assert_eq!(min.arity(), 2);
    assert!(Importable::try_from("e").unwrap().function().is_none());
}

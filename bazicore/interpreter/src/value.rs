//! Runtime values. Scalars are plain; arrays are shared mutable buffers so
//! that `a[0] = x` is visible through every reference to the array; host
//! objects are opaque handles owned by the embedder.

use std::fmt;
use std::sync::Arc;

use bazic_ast::Primitive;
use parking_lot::RwLock;

use crate::host::HostObject;

#[derive(Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Array(Arc<RwLock<Vec<Value>>>),
    Object(Arc<dyn HostObject>),
}

/// Failures of value-level operations. `Cast` means the operand types can
/// never work (fatal); `Raise` becomes a catchable language exception.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    Cast(String),
    Raise(String),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn from_primitive(p: &Primitive) -> Value {
        match p {
            Primitive::Null => Value::Null,
            Primitive::Integer(i) => Value::Integer(*i),
            Primitive::Double(d) => Value::Double(*d),
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Str(s) => Value::Str(s.clone()),
            Primitive::Array(items) => {
                Value::array(items.iter().map(Value::from_primitive).collect())
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(items) => {
                let items = items.read();
                write!(f, "[")?;
                for (n, v) in items.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Object(o) => write!(f, "<{}>", o.type_name()),
        }
    }
}

// Host objects carry no Debug bound, so Debug delegates to Display.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Structural equality for scalars, identity for arrays and objects.
/// Mixed integer/double operands compare numerically.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Arc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Arc::ptr_eq(x, y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn cast_err(op: &str, a: &Value, b: &Value) -> ValueError {
    ValueError::Cast(format!("cannot apply '{op}' to {} and {}", a.type_name(), b.type_name()))
}

pub fn add(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x.wrapping_add(*y))),
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{a}{b}"))),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Double(x + y)),
            _ => Err(cast_err("+", a, b)),
        },
    }
}

pub fn subtract(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x.wrapping_sub(*y))),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Double(x - y)),
            _ => Err(cast_err("-", a, b)),
        },
    }
}

pub fn multiply(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x.wrapping_mul(*y))),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Double(x * y)),
            _ => Err(cast_err("*", a, b)),
        },
    }
}

/// Integer operands stay integral (truncating). Division by integer zero
/// raises a catchable exception.
pub fn divide(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Integer(_), Value::Integer(0)) => {
            Err(ValueError::Raise("attempted to divide by zero".into()))
        }
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x / y)),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Double(x / y)),
            _ => Err(cast_err("/", a, b)),
        },
    }
}

pub fn modulus(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Integer(_), Value::Integer(0)) => {
            Err(ValueError::Raise("attempted to divide by zero".into()))
        }
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x % y)),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Double(x % y)),
            _ => Err(cast_err("%", a, b)),
        },
    }
}

#[derive(Clone, Copy)]
pub enum Relation {
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

pub fn compare(rel: Relation, a: &Value, b: &Value) -> Result<Value, ValueError> {
    let ord = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| ValueError::Cast("cannot order NaN".into()))?,
            _ => return Err(cast_err("comparison", a, b)),
        },
    };
    let hit = match rel {
        Relation::Less => ord.is_lt(),
        Relation::LessEq => ord.is_le(),
        Relation::Greater => ord.is_gt(),
        Relation::GreaterEq => ord.is_ge(),
    };
    Ok(Value::Bool(hit))
}

/// AND/OR over already-evaluated operands: logical on bools, bitwise when
/// both are integers. Short-circuiting on bools happens before this is
/// reached.
pub fn and(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(*x && *y)),
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x & y)),
        _ => Err(cast_err("AND", a, b)),
    }
}

pub fn or(a: &Value, b: &Value) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(*x || *y)),
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x | y)),
        _ => Err(cast_err("OR", a, b)),
    }
}

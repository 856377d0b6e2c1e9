/// [Run-Time Data Areas — primitive values](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A62%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C590%2Cnull%5D)
///
/// A tagged union over the primitive kinds the interpreter operates on.
/// Object references, arrays, and the `new`/array family are out of scope;
/// booleans live as `Byte` at runtime the same way javac compiles them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Char(u16),
    Float(f32),
    Double(f64),
    /// The address of the opcode following the instruction that created it
    /// (`jsr`/`ret`). Not produced by any opcode this interpreter executes.
    ReturnAddress(u16),
}

impl Value {
    /// Whether this value occupies two consecutive local-variable slots /
    /// two consecutive operand-stack entries (Long, Double) per JVMS §2.6.1.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::ReturnAddress(v) => write!(f, "returnAddress({v})"),
        }
    }
}

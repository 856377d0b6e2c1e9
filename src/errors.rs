use std::error::Error;
use std::fmt::{self, Display};

#[derive(Debug)]
pub enum VmCause {
    NoCode,
    MethodNotFound(String),
    UnhandledOpcode(u8),
    DivisionByZero,
    StackUnderflow,
    WrongValueKind,
    CodeExhausted,
}

impl Display for VmCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmCause::NoCode => write!(f, "method has no Code attribute"),
            VmCause::MethodNotFound(name) => write!(f, "no eligible method named {name}"),
            VmCause::UnhandledOpcode(op) => write!(f, "unhandled opcode {op:#04X}"),
            VmCause::DivisionByZero => write!(f, "division by zero"),
            VmCause::StackUnderflow => write!(f, "operand stack underflow"),
            VmCause::WrongValueKind => write!(f, "value on stack or in a local had the wrong kind"),
            VmCause::CodeExhausted => write!(f, "code array exhausted without a return"),
        }
    }
}

#[derive(Debug)]
pub struct VmError {
    cause: VmCause,
    msg: String,
}

impl VmError {
    pub fn new(cause: VmCause, msg: impl Into<String>) -> VmError {
        VmError {
            cause,
            msg: msg.into(),
        }
    }
}

impl Error for VmError {}

impl Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm error: {}, {}", self.cause, self.msg)
    }
}

impl From<loader::errors::DecodeError> for VmError {
    fn from(e: loader::errors::DecodeError) -> Self {
        VmError::new(VmCause::WrongValueKind, e.to_string())
    }
}

impl From<loader::errors::DescriptorError> for VmError {
    fn from(e: loader::errors::DescriptorError) -> Self {
        VmError::new(VmCause::WrongValueKind, e.to_string())
    }
}

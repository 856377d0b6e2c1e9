//! Error taxonomy for the class-file decoder and the descriptor parser.
//!
//! Each concern gets its own cause enum plus a thin wrapper carrying a
//! human-readable message, following the same shape for both: a `Display`
//! impl on the cause, an `Error` impl on the wrapper, nothing fancier.

use std::error::Error;
use std::fmt::{self, Display};

use crate::constants::ConstantPoolEntry;

#[derive(Debug)]
pub enum DecodeCause {
    IncorrectMagic(u32),
    TrailingBytes,
    InvalidIndex(u16),
    InvalidDescriptor(String),
    InvalidReferenceKind(u8),
    InvalidConstant(ConstantPoolEntry),
    UnknownConstantTag(u8),
    MalformedAttribute(String),
    MissingAttribute,
    Utf8Decode,
}

impl Display for DecodeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeCause::IncorrectMagic(got) => write!(f, "incorrect magic: {got:#010X}"),
            DecodeCause::TrailingBytes => write!(f, "trailing bytes after last attribute"),
            DecodeCause::InvalidIndex(index) => write!(f, "invalid constant pool index: {index}"),
            DecodeCause::InvalidDescriptor(desc) => write!(f, "invalid descriptor: {desc}"),
            DecodeCause::InvalidReferenceKind(kind) => {
                write!(f, "invalid method handle reference kind: {kind}")
            }
            DecodeCause::InvalidConstant(c) => write!(f, "unexpected constant: {c:?}"),
            DecodeCause::UnknownConstantTag(tag) => write!(f, "unknown constant tag: {tag}"),
            DecodeCause::MalformedAttribute(name) => {
                write!(f, "malformed attribute body: {name}")
            }
            DecodeCause::MissingAttribute => write!(f, "required attribute missing"),
            DecodeCause::Utf8Decode => write!(f, "malformed modified-UTF-8"),
        }
    }
}

#[derive(Debug)]
pub struct DecodeError {
    cause: DecodeCause,
    msg: String,
}

impl DecodeError {
    pub fn new(cause: DecodeCause, msg: impl Into<String>) -> DecodeError {
        DecodeError {
            cause,
            msg: msg.into(),
        }
    }
}

impl Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode error: {}, {}", self.cause, self.msg)
    }
}

#[derive(Debug)]
pub enum DescriptorCause {
    TooManyDimensions,
    IncompleteDescriptor,
    BadMethodDescriptor,
    UnknownBaseType(char),
}

impl Display for DescriptorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorCause::TooManyDimensions => write!(f, "array has more than 255 dimensions"),
            DescriptorCause::IncompleteDescriptor => {
                write!(f, "descriptor ended before it was complete")
            }
            DescriptorCause::BadMethodDescriptor => {
                write!(f, "method descriptor does not start with '('")
            }
            DescriptorCause::UnknownBaseType(c) => write!(f, "unknown base type char: {c}"),
        }
    }
}

#[derive(Debug)]
pub struct DescriptorError {
    cause: DescriptorCause,
    msg: String,
}

impl DescriptorError {
    pub fn new(cause: DescriptorCause, msg: impl Into<String>) -> DescriptorError {
        DescriptorError {
            cause,
            msg: msg.into(),
        }
    }
}

impl Error for DescriptorError {}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "descriptor error: {}, {}", self.cause, self.msg)
    }
}

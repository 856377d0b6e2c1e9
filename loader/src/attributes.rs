//! [Attributes](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A1244%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C564%2Cnull%5D)
//!
//! Three attributes are load-bearing for this crate — `SourceFile`,
//! `ConstantValue`, and `Code` — because the interpreter and the
//! disassembler read them. Everything else (`LineNumberTable`,
//! `StackMapTable`, `Signature`, annotations, module attributes, ...) is
//! kept as an opaque named blob: the bytes are preserved exactly as the
//! class file carried them, but never interpreted.

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, BE};

use crate::constants::{ConstantPoolEntry, Utf8};
use crate::errors::{DecodeCause, DecodeError};

/// [Exception table entry](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A793%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C275%2Cnull%5D)
///
/// Parsed and kept on [`Code`] for completeness; dispatching into a handler
/// on a thrown exception is not implemented by the interpreter.
#[derive(Clone, Debug)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero means "catches everything" (used to implement `finally`).
    pub catch_type: u16,
}

/// [ConstantValue](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A2771%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C390%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct ConstantValue {
    pub constantvalue_index: u16,
}

/// [Code](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A793%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C275%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<Attribute>,
}

/// A recognized-but-not-interpreted attribute: name plus its raw payload.
#[derive(Clone, Debug)]
pub struct Opaque {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub enum Attribute {
    ConstantValue(ConstantValue),
    Code(Code),
    SourceFile { sourcefile_index: u16 },
    Other(Opaque),
}

fn read_exact(cursor: &mut Cursor<&[u8]>, len: usize, what: &str) -> Result<Vec<u8>, DecodeError> {
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(|_| {
        DecodeError::new(DecodeCause::MalformedAttribute(what.to_string()), "truncated")
    })?;
    Ok(buf)
}

fn utf8_at<'a>(pool: &'a [ConstantPoolEntry], index: u16) -> Result<&'a Utf8, DecodeError> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::Utf8(utf8)) => Ok(utf8),
        _ => Err(DecodeError::new(
            DecodeCause::InvalidIndex(index),
            "attribute_name_index must point to a Utf8 constant",
        )),
    }
}

/// Reads one attribute. `attribute_name_index` has already been consumed by
/// the caller and resolved to `name`; this reads the `attribute_length` and
/// body that follow. The cursor always advances by exactly
/// `attribute_length` bytes, recognized or not.
///
/// Dispatch on `name` is byte-exact on the raw modified-UTF-8 (`Utf8::matches`),
/// never on a lossily-decoded `String`, so two attributes that differ only
/// outside standard UTF-8 are never confused with each other or with a
/// well-known name.
pub fn read_attribute(
    name: &Utf8,
    cursor: &mut Cursor<&[u8]>,
    pool: &[ConstantPoolEntry],
) -> Result<Attribute, DecodeError> {
    let display_name = name.as_str();
    let attribute_length = cursor.read_u32::<BE>().map_err(|_| {
        DecodeError::new(DecodeCause::MalformedAttribute(display_name.clone()), "length")
    })?;
    let body_start = cursor.position();

    let attribute = if name.matches("ConstantValue") {
        let constantvalue_index = cursor.read_u16::<BE>().map_err(|_| {
            DecodeError::new(DecodeCause::MalformedAttribute(display_name.clone()), "body")
        })?;
        Attribute::ConstantValue(ConstantValue { constantvalue_index })
    } else if name.matches("SourceFile") {
        let sourcefile_index = cursor.read_u16::<BE>().map_err(|_| {
            DecodeError::new(DecodeCause::MalformedAttribute(display_name.clone()), "body")
        })?;
        Attribute::SourceFile { sourcefile_index }
    } else if name.matches("Code") {
        Attribute::Code(read_code(cursor, pool)?)
    } else {
        let data = read_exact(cursor, attribute_length as usize, &display_name)?;
        Attribute::Other(Opaque {
            name: display_name.clone(),
            data,
        })
    };

    let consumed = cursor.position() - body_start;
    if consumed != attribute_length as u64 {
        return Err(DecodeError::new(
            DecodeCause::MalformedAttribute(display_name),
            format!("declared {attribute_length} bytes, consumed {consumed}"),
        ));
    }
    Ok(attribute)
}

fn read_code(cursor: &mut Cursor<&[u8]>, pool: &[ConstantPoolEntry]) -> Result<Code, DecodeError> {
    let malformed =
        |what: &str| DecodeError::new(DecodeCause::MalformedAttribute("Code".into()), what.to_string());

    let max_stack = cursor.read_u16::<BE>().map_err(|_| malformed("max_stack"))?;
    let max_locals = cursor.read_u16::<BE>().map_err(|_| malformed("max_locals"))?;
    let code_length = cursor.read_u32::<BE>().map_err(|_| malformed("code_length"))?;
    let code = read_exact(cursor, code_length as usize, "Code.code")?;

    let exception_table_length = cursor
        .read_u16::<BE>()
        .map_err(|_| malformed("exception_table_length"))?;
    let mut exception_table = Vec::with_capacity(exception_table_length as usize);
    for _ in 0..exception_table_length {
        exception_table.push(ExceptionTableEntry {
            start_pc: cursor.read_u16::<BE>().map_err(|_| malformed("exception_table"))?,
            end_pc: cursor.read_u16::<BE>().map_err(|_| malformed("exception_table"))?,
            handler_pc: cursor.read_u16::<BE>().map_err(|_| malformed("exception_table"))?,
            catch_type: cursor.read_u16::<BE>().map_err(|_| malformed("exception_table"))?,
        });
    }

    let nested_attributes_count = cursor
        .read_u16::<BE>()
        .map_err(|_| malformed("attributes_count"))?;
    let mut attributes = Vec::with_capacity(nested_attributes_count as usize);
    for _ in 0..nested_attributes_count {
        let name_index = cursor
            .read_u16::<BE>()
            .map_err(|_| malformed("nested attribute_name_index"))?;
        let name = utf8_at(pool, name_index)?;
        attributes.push(read_attribute(name, cursor, pool)?);
    }

    Ok(Code {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}

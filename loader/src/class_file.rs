use std::io::Cursor;

use byteorder::{ReadBytesExt, BE};

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::attributes::{self, Attribute};
use crate::constants::{self, ConstantPoolEntry};
use crate::errors::{DecodeCause, DecodeError};

const MAGIC: u32 = 0xCAFE_BABE;

/// [Fields](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A721%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C564%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub access_flags: Vec<FieldAccessFlags>,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(&FieldAccessFlags::AccStatic)
    }

    pub fn constant_value(&self) -> Option<&attributes::ConstantValue> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::ConstantValue(cv) => Some(cv),
            _ => None,
        })
    }
}

/// [Methods](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A777%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C282%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub access_flags: Vec<MethodAccessFlags>,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub fn is_public(&self) -> bool {
        self.access_flags.contains(&MethodAccessFlags::AccPublic)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(&MethodAccessFlags::AccStatic)
    }

    pub fn code(&self) -> Option<&attributes::Code> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }
}

/// [ClassFile structure](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A2201%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C256%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: Vec<ConstantPoolEntry>,
    pub access_flags: Vec<ClassAccessFlags>,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, DecodeError> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor
            .read_u32::<BE>()
            .map_err(|_| DecodeError::new(DecodeCause::IncorrectMagic(0), "truncated header"))?;
        if magic != MAGIC {
            return Err(DecodeError::new(
                DecodeCause::IncorrectMagic(magic),
                "first four bytes are not 0xCAFEBABE",
            ));
        }

        let minor_version = read_u16(&mut cursor, "minor_version")?;
        let major_version = read_u16(&mut cursor, "major_version")?;

        let constant_pool_count = read_u16(&mut cursor, "constant_pool_count")?;
        let constant_pool = constants::read_constant_pool(constant_pool_count, &mut cursor)?;
        constants::validate_references(&constant_pool)?;

        let access_flags = ClassAccessFlags::from_u16(read_u16(&mut cursor, "access_flags")?);
        let this_class = read_u16(&mut cursor, "this_class")?;
        expect_class(&constant_pool, this_class)?;
        let super_class = read_u16(&mut cursor, "super_class")?;
        if super_class != 0 {
            expect_class(&constant_pool, super_class)?;
        }

        let interfaces_count = read_u16(&mut cursor, "interfaces_count")?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            let index = read_u16(&mut cursor, "interfaces")?;
            expect_class(&constant_pool, index)?;
            interfaces.push(index);
        }

        let fields_count = read_u16(&mut cursor, "fields_count")?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            fields.push(read_field(&mut cursor, &constant_pool)?);
        }

        let methods_count = read_u16(&mut cursor, "methods_count")?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            methods.push(read_method(&mut cursor, &constant_pool)?);
        }

        let class_attributes_count = read_u16(&mut cursor, "attributes_count")?;
        let mut class_attributes = Vec::with_capacity(class_attributes_count as usize);
        for _ in 0..class_attributes_count {
            class_attributes.push(read_one_attribute(&mut cursor, &constant_pool)?);
        }

        if cursor.position() != bytes.len() as u64 {
            return Err(DecodeError::new(DecodeCause::TrailingBytes, ""));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes: class_attributes,
        })
    }

    /// The binary name of this class, with `/` rewritten to `.`.
    pub fn this_class_name(&self) -> Result<String, DecodeError> {
        self.class_name_at(self.this_class)
    }

    pub fn class_name_at(&self, class_index: u16) -> Result<String, DecodeError> {
        let ConstantPoolEntry::Class(class) = self.constant_pool_at(class_index)? else {
            return Err(DecodeError::new(
                DecodeCause::InvalidIndex(class_index),
                "expected a Class constant",
            ));
        };
        self.utf8_at(class.name_index).map(|u| u.as_binary_name())
    }

    pub fn constant_pool_at(&self, index: u16) -> Result<&ConstantPoolEntry, DecodeError> {
        match self.constant_pool.get(index as usize) {
            Some(ConstantPoolEntry::Gap) | None => {
                Err(DecodeError::new(DecodeCause::InvalidIndex(index), "pool gap or out of range"))
            }
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8_at(&self, index: u16) -> Result<&constants::Utf8, DecodeError> {
        match self.constant_pool_at(index)? {
            ConstantPoolEntry::Utf8(utf8) => Ok(utf8),
            _ => Err(DecodeError::new(
                DecodeCause::InvalidIndex(index),
                "expected a Utf8 constant",
            )),
        }
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| self.utf8_at(m.name_index).map(|u| u.matches(name)).unwrap_or(false))
    }
}

fn read_u16(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u16, DecodeError> {
    cursor
        .read_u16::<BE>()
        .map_err(|_| DecodeError::new(DecodeCause::TrailingBytes, what.to_string()))
}

fn expect_utf8(pool: &[ConstantPoolEntry], index: u16, what: &str) -> Result<(), DecodeError> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::Utf8(_)) => Ok(()),
        _ => Err(DecodeError::new(
            DecodeCause::InvalidIndex(index),
            format!("{what} must point to a Utf8 constant"),
        )),
    }
}

fn expect_class(pool: &[ConstantPoolEntry], index: u16) -> Result<(), DecodeError> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::Class(_)) => Ok(()),
        _ => Err(DecodeError::new(DecodeCause::InvalidIndex(index), "expected Class constant")),
    }
}

fn read_one_attribute(
    cursor: &mut Cursor<&[u8]>,
    pool: &[ConstantPoolEntry],
) -> Result<Attribute, DecodeError> {
    let name_index = read_u16(cursor, "attribute_name_index")?;
    let name = match pool.get(name_index as usize) {
        Some(ConstantPoolEntry::Utf8(utf8)) => utf8,
        _ => {
            return Err(DecodeError::new(
                DecodeCause::InvalidIndex(name_index),
                "attribute_name_index must point to a Utf8 constant",
            ))
        }
    };
    attributes::read_attribute(name, cursor, pool)
}

fn read_field(
    cursor: &mut Cursor<&[u8]>,
    pool: &[ConstantPoolEntry],
) -> Result<FieldInfo, DecodeError> {
    let access_flags = FieldAccessFlags::from_u16(read_u16(cursor, "field access_flags")?);
    let name_index = read_u16(cursor, "field name_index")?;
    expect_utf8(pool, name_index, "field name_index")?;
    let descriptor_index = read_u16(cursor, "field descriptor_index")?;
    expect_utf8(pool, descriptor_index, "field descriptor_index")?;
    let attributes_count = read_u16(cursor, "field attributes_count")?;
    let mut attributes = Vec::with_capacity(attributes_count as usize);
    for _ in 0..attributes_count {
        attributes.push(read_one_attribute(cursor, pool)?);
    }
    Ok(FieldInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn read_method(
    cursor: &mut Cursor<&[u8]>,
    pool: &[ConstantPoolEntry],
) -> Result<MethodInfo, DecodeError> {
    let access_flags = MethodAccessFlags::from_u16(read_u16(cursor, "method access_flags")?);
    let name_index = read_u16(cursor, "method name_index")?;
    expect_utf8(pool, name_index, "method name_index")?;
    let descriptor_index = read_u16(cursor, "method descriptor_index")?;
    expect_utf8(pool, descriptor_index, "method descriptor_index")?;
    let attributes_count = read_u16(cursor, "method attributes_count")?;
    let mut attributes = Vec::with_capacity(attributes_count as usize);
    for _ in 0..attributes_count {
        attributes.push(read_one_attribute(cursor, pool)?);
    }
    Ok(MethodInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the smallest legal class file: a four-entry constant pool
    /// (this class + java.lang.Object), no fields, no methods, no
    /// class-level attributes.
    fn minimal_class_bytes(this_name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major

        // #1 Utf8(this_name), #2 Class(#1), #3 Utf8("java/lang/Object"), #4 Class(#3)
        let mut pool = Vec::new();
        push_utf8(&mut pool, this_name);
        pool.push(7); // Class
        pool.extend_from_slice(&1u16.to_be_bytes());
        push_utf8(&mut pool, "java/lang/Object");
        pool.push(7);
        pool.extend_from_slice(&3u16.to_be_bytes());

        out.extend_from_slice(&5u16.to_be_bytes()); // constant_pool_count
        out.extend_from_slice(&pool);

        out.extend_from_slice(&(ClassAccessFlags::AccSuper as u16).to_be_bytes());
        out.extend_from_slice(&2u16.to_be_bytes()); // this_class -> #2
        out.extend_from_slice(&4u16.to_be_bytes()); // super_class -> #4
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
        out.extend_from_slice(&0u16.to_be_bytes()); // fields_count
        out.extend_from_slice(&0u16.to_be_bytes()); // methods_count
        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes_count
        out
    }

    fn push_utf8(out: &mut Vec<u8>, s: &str) {
        out.push(1); // Utf8 tag
        out.extend_from_slice(&(s.len() as u16).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0u8, 0, 0, 0];
        assert!(ClassFile::from_bytes(&bytes).is_err());
    }

    #[test]
    fn decodes_minimal_class_with_no_methods() {
        let bytes = minimal_class_bytes("Minimal");
        let class = ClassFile::from_bytes(&bytes).expect("should decode");
        assert_eq!(class.this_class_name().unwrap(), "Minimal");
        assert!(class.methods.is_empty());
        assert!(class.fields.is_empty());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = minimal_class_bytes("Minimal");
        bytes.push(0xFF);
        assert!(matches!(
            ClassFile::from_bytes(&bytes),
            Err(e) if format!("{e}").contains("decode error")
        ));
    }
}

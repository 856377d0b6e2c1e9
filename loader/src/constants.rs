use std::io::{Cursor, Read};
use std::str::from_utf8;

use byteorder::{ReadBytesExt, BE};

use crate::errors::{DecodeCause, DecodeError};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            1 => Tag::Utf8,
            3 => Tag::Integer,
            4 => Tag::Float,
            5 => Tag::Long,
            6 => Tag::Double,
            7 => Tag::Class,
            8 => Tag::String,
            9 => Tag::Fieldref,
            10 => Tag::Methodref,
            11 => Tag::InterfaceMethodref,
            12 => Tag::NameAndType,
            15 => Tag::MethodHandle,
            16 => Tag::MethodType,
            17 => Tag::Dynamic,
            18 => Tag::InvokeDynamic,
            19 => Tag::Module,
            20 => Tag::Package,
            other => return Err(other),
        })
    }
}

/// [Utf8 Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A636%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C438%2Cnull%5D)
#[derive(Clone)]
pub struct Utf8 {
    /// Raw modified-UTF-8 bytes as stored in the class file.
    pub bytes: Vec<u8>,
}

impl Utf8 {
    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Utf8, DecodeError> {
        let length = cursor
            .read_u16::<BE>()
            .map_err(|_| DecodeError::new(DecodeCause::Utf8Decode, "truncated length"))?;
        let mut bytes = vec![0u8; length as usize];
        cursor
            .read_exact(&mut bytes)
            .map_err(|_| DecodeError::new(DecodeCause::Utf8Decode, "truncated body"))?;
        Ok(Utf8 { bytes })
    }

    /// Text view with `/` package separators rewritten to `.`, as used for
    /// binary class names. Other uses of a Utf8 entry (plain identifiers,
    /// descriptors) read `as_str` instead.
    pub fn as_binary_name(&self) -> std::string::String {
        self.as_str().replace('/', ".")
    }

    pub fn as_str(&self) -> std::string::String {
        from_utf8(&self.bytes)
            .unwrap_or("<invalid modified-utf8>")
            .to_string()
    }

    /// Byte-exact comparison against a plain Rust `&str`, for pool-lookup
    /// paths (attribute name matches, method/field name matches) that the
    /// spec defines on the raw modified-UTF-8 bytes rather than on a
    /// lossily-decoded `String` (`as_str` substitutes a sentinel on invalid
    /// UTF-8, which would make distinct names compare equal).
    pub fn matches(&self, name: &str) -> bool {
        self.bytes == name.as_bytes()
    }
}

impl std::fmt::Debug for Utf8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// [Integer Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A653%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C136.8%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct IntegerConst {
    pub bytes: u32,
}

impl IntegerConst {
    pub fn value(&self) -> i32 {
        self.bytes as i32
    }
}

/// [Float Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A653%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C136.8%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct FloatConst {
    pub bytes: u32,
}

impl FloatConst {
    pub fn value(&self) -> f32 {
        f32::from_bits(self.bytes)
    }
}

/// [Long Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A458%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C564%2Cnull%5D)
///
/// `high_bytes` and `low_bytes` together represent
/// `((long) high_bytes << 32) + low_bytes`.
#[derive(Clone, Debug)]
pub struct LongConst {
    pub high_bytes: u32,
    pub low_bytes: u32,
}

impl LongConst {
    pub fn value(&self) -> i64 {
        (((self.high_bytes as u64) << 32) | self.low_bytes as u64) as i64
    }
}

/// [Double Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A458%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C564%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct DoubleConst {
    pub high_bytes: u32,
    pub low_bytes: u32,
}

impl DoubleConst {
    pub fn value(&self) -> f64 {
        f64::from_bits(((self.high_bytes as u64) << 32) | self.low_bytes as u64)
    }
}

/// [Class Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A646%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C396%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct ClassConst {
    pub name_index: u16,
}

/// [String Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A653%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C388%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct StringConst {
    pub string_index: u16,
}

/// [Fieldref Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A450%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C577%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct Fieldref {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

/// [Methodref Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A450%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C577%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct Methodref {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

/// [InterfaceMethodref Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A450%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C577%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct InterfaceMethodref {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

/// [NameAndType Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A634%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C245%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct NameAndType {
    pub name_index: u16,
    pub descriptor_index: u16,
}

/// [MethodHandle Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A668%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C235.18%2Cnull%5D)
///
/// `reference_kind` must be in the range 1 to 9 (§5.4.3.5).
#[derive(Clone, Debug)]
pub struct MethodHandle {
    pub reference_kind: u8,
    pub reference_index: u16,
}

/// [MethodType Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A668%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C235.18%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct MethodType {
    pub descriptor_index: u16,
}

/// [Dynamic Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A3782%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C370.8%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct Dynamic {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

/// [InvokeDynamic Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A3782%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C370.8%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct InvokeDynamic {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

/// [Module Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A2423%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C117.8%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct Module {
    pub name_index: u16,
}

/// [Package Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A676%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C348.6%2Cnull%5D)
#[derive(Clone, Debug)]
pub struct Package {
    pub name_index: u16,
}

/// One entry of the constant pool table (§4.4). `Gap` is not a real JVMS
/// tag: it fills the unusable slot the spec mandates immediately after a
/// Long or Double entry, so that later indices land where the class file
/// actually put them.
#[derive(Clone, Debug)]
pub enum ConstantPoolEntry {
    Utf8(Utf8),
    Integer(IntegerConst),
    Float(FloatConst),
    Long(LongConst),
    Double(DoubleConst),
    Class(ClassConst),
    String(StringConst),
    Fieldref(Fieldref),
    Methodref(Methodref),
    InterfaceMethodref(InterfaceMethodref),
    NameAndType(NameAndType),
    MethodHandle(MethodHandle),
    MethodType(MethodType),
    Dynamic(Dynamic),
    InvokeDynamic(InvokeDynamic),
    Module(Module),
    Package(Package),
    Gap,
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

fn expect_class(pool: &[ConstantPoolEntry], index: u16, what: &str) -> Result<(), DecodeError> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::Class(_)) => Ok(()),
        _ => Err(DecodeError::new(
            DecodeCause::InvalidIndex(index),
            format!("{what} must point to a Class constant"),
        )),
    }
}

fn expect_name_and_type(pool: &[ConstantPoolEntry], index: u16, what: &str) -> Result<(), DecodeError> {
    match pool.get(index as usize) {
        Some(ConstantPoolEntry::NameAndType(_)) => Ok(()),
        _ => Err(DecodeError::new(
            DecodeCause::InvalidIndex(index),
            format!("{what} must point to a NameAndType constant"),
        )),
    }
}

/// Decode-time cross-reference validation (§3.2 "Invariants", §9
/// "Cross-references within the pool"): every entry that refers to another
/// pool slot by index must have that slot hold the variant the reference
/// requires. Run once right after the pool is parsed so every later lookup
/// (field/method resolution, opcode dispatch) can trust the pool without
/// re-checking.
pub fn validate_references(pool: &[ConstantPoolEntry]) -> Result<(), DecodeError> {
    for entry in pool {
        match entry {
            ConstantPoolEntry::Class(c) => expect_utf8(pool, c.name_index, "Class.name_index")?,
            ConstantPoolEntry::String(s) => expect_utf8(pool, s.string_index, "String.string_index")?,
            ConstantPoolEntry::Fieldref(r) => {
                expect_class(pool, r.class_index, "Fieldref.class_index")?;
                expect_name_and_type(pool, r.name_and_type_index, "Fieldref.name_and_type_index")?;
            }
            ConstantPoolEntry::Methodref(r) => {
                expect_class(pool, r.class_index, "Methodref.class_index")?;
                expect_name_and_type(pool, r.name_and_type_index, "Methodref.name_and_type_index")?;
            }
            ConstantPoolEntry::InterfaceMethodref(r) => {
                expect_class(pool, r.class_index, "InterfaceMethodref.class_index")?;
                expect_name_and_type(
                    pool,
                    r.name_and_type_index,
                    "InterfaceMethodref.name_and_type_index",
                )?;
            }
            ConstantPoolEntry::NameAndType(nat) => {
                expect_utf8(pool, nat.name_index, "NameAndType.name_index")?;
                expect_utf8(pool, nat.descriptor_index, "NameAndType.descriptor_index")?;
            }
            ConstantPoolEntry::MethodType(mt) => {
                expect_utf8(pool, mt.descriptor_index, "MethodType.descriptor_index")?
            }
            ConstantPoolEntry::Dynamic(d) => {
                expect_name_and_type(pool, d.name_and_type_index, "Dynamic.name_and_type_index")?
            }
            ConstantPoolEntry::InvokeDynamic(d) => expect_name_and_type(
                pool,
                d.name_and_type_index,
                "InvokeDynamic.name_and_type_index",
            )?,
            ConstantPoolEntry::Module(m) => expect_utf8(pool, m.name_index, "Module.name_index")?,
            ConstantPoolEntry::Package(p) => expect_utf8(pool, p.name_index, "Package.name_index")?,
            ConstantPoolEntry::MethodHandle(mh) => match mh.reference_kind {
                1..=4 => match pool.get(mh.reference_index as usize) {
                    Some(ConstantPoolEntry::Fieldref(_)) => {}
                    _ => {
                        return Err(DecodeError::new(
                            DecodeCause::InvalidIndex(mh.reference_index),
                            "MethodHandle.reference_index must point to a Fieldref constant",
                        ))
                    }
                },
                5..=9 => match pool.get(mh.reference_index as usize) {
                    Some(ConstantPoolEntry::Methodref(_))
                    | Some(ConstantPoolEntry::InterfaceMethodref(_)) => {}
                    _ => {
                        return Err(DecodeError::new(
                            DecodeCause::InvalidIndex(mh.reference_index),
                            "MethodHandle.reference_index must point to a Methodref/InterfaceMethodref constant",
                        ))
                    }
                },
                other => {
                    return Err(DecodeError::new(
                        DecodeCause::InvalidReferenceKind(other),
                        "MethodHandle.reference_kind must be 1..9",
                    ))
                }
            },
            ConstantPoolEntry::Utf8(_)
            | ConstantPoolEntry::Integer(_)
            | ConstantPoolEntry::Float(_)
            | ConstantPoolEntry::Long(_)
            | ConstantPoolEntry::Double(_)
            | ConstantPoolEntry::Gap => {}
        }
    }
    Ok(())
}

/// Reads `constant_pool_count - 1` entries, pushing a [`ConstantPoolEntry::Gap`]
/// after every Long/Double so that 1-based indexing into the returned vector
/// lines up with the indices used elsewhere in the class file.
pub fn read_constant_pool(
    count: u16,
    cursor: &mut Cursor<&[u8]>,
) -> Result<Vec<ConstantPoolEntry>, DecodeError> {
    let mut pool = Vec::with_capacity(count as usize);
    // Slot 0 is unused; JVMS indices are 1-based.
    pool.push(ConstantPoolEntry::Gap);
    while pool.len() < count as usize {
        let tag_byte = cursor
            .read_u8()
            .map_err(|_| DecodeError::new(DecodeCause::TrailingBytes, "pool entry tag"))?;
        let tag = Tag::try_from(tag_byte)
            .map_err(|t| DecodeError::new(DecodeCause::UnknownConstantTag(t), "pool entry"))?;
        let entry = read_one(tag, cursor)?;
        let is_wide = matches!(entry, ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_));
        pool.push(entry);
        if is_wide {
            pool.push(ConstantPoolEntry::Gap);
        }
    }
    Ok(pool)
}

fn read_one(tag: Tag, cursor: &mut Cursor<&[u8]>) -> Result<ConstantPoolEntry, DecodeError> {
    let io_err = |what: &str| DecodeError::new(DecodeCause::TrailingBytes, what.to_string());
    Ok(match tag {
        Tag::Utf8 => ConstantPoolEntry::Utf8(Utf8::read(cursor)?),
        Tag::Integer => ConstantPoolEntry::Integer(IntegerConst {
            bytes: cursor.read_u32::<BE>().map_err(|_| io_err("Integer"))?,
        }),
        Tag::Float => ConstantPoolEntry::Float(FloatConst {
            bytes: cursor.read_u32::<BE>().map_err(|_| io_err("Float"))?,
        }),
        Tag::Long => ConstantPoolEntry::Long(LongConst {
            high_bytes: cursor.read_u32::<BE>().map_err(|_| io_err("Long"))?,
            low_bytes: cursor.read_u32::<BE>().map_err(|_| io_err("Long"))?,
        }),
        Tag::Double => ConstantPoolEntry::Double(DoubleConst {
            high_bytes: cursor.read_u32::<BE>().map_err(|_| io_err("Double"))?,
            low_bytes: cursor.read_u32::<BE>().map_err(|_| io_err("Double"))?,
        }),
        Tag::Class => ConstantPoolEntry::Class(ClassConst {
            name_index: cursor.read_u16::<BE>().map_err(|_| io_err("Class"))?,
        }),
        Tag::String => ConstantPoolEntry::String(StringConst {
            string_index: cursor.read_u16::<BE>().map_err(|_| io_err("String"))?,
        }),
        Tag::Fieldref => ConstantPoolEntry::Fieldref(Fieldref {
            class_index: cursor.read_u16::<BE>().map_err(|_| io_err("Fieldref"))?,
            name_and_type_index: cursor.read_u16::<BE>().map_err(|_| io_err("Fieldref"))?,
        }),
        Tag::Methodref => ConstantPoolEntry::Methodref(Methodref {
            class_index: cursor.read_u16::<BE>().map_err(|_| io_err("Methodref"))?,
            name_and_type_index: cursor.read_u16::<BE>().map_err(|_| io_err("Methodref"))?,
        }),
        Tag::InterfaceMethodref => ConstantPoolEntry::InterfaceMethodref(InterfaceMethodref {
            class_index: cursor
                .read_u16::<BE>()
                .map_err(|_| io_err("InterfaceMethodref"))?,
            name_and_type_index: cursor
                .read_u16::<BE>()
                .map_err(|_| io_err("InterfaceMethodref"))?,
        }),
        Tag::NameAndType => ConstantPoolEntry::NameAndType(NameAndType {
            name_index: cursor.read_u16::<BE>().map_err(|_| io_err("NameAndType"))?,
            descriptor_index: cursor
                .read_u16::<BE>()
                .map_err(|_| io_err("NameAndType"))?,
        }),
        Tag::MethodHandle => ConstantPoolEntry::MethodHandle(MethodHandle {
            reference_kind: cursor.read_u8().map_err(|_| io_err("MethodHandle"))?,
            reference_index: cursor
                .read_u16::<BE>()
                .map_err(|_| io_err("MethodHandle"))?,
        }),
        Tag::MethodType => ConstantPoolEntry::MethodType(MethodType {
            descriptor_index: cursor.read_u16::<BE>().map_err(|_| io_err("MethodType"))?,
        }),
        Tag::Dynamic => ConstantPoolEntry::Dynamic(Dynamic {
            bootstrap_method_attr_index: cursor.read_u16::<BE>().map_err(|_| io_err("Dynamic"))?,
            name_and_type_index: cursor.read_u16::<BE>().map_err(|_| io_err("Dynamic"))?,
        }),
        Tag::InvokeDynamic => ConstantPoolEntry::InvokeDynamic(InvokeDynamic {
            bootstrap_method_attr_index: cursor
                .read_u16::<BE>()
                .map_err(|_| io_err("InvokeDynamic"))?,
            name_and_type_index: cursor
                .read_u16::<BE>()
                .map_err(|_| io_err("InvokeDynamic"))?,
        }),
        Tag::Module => ConstantPoolEntry::Module(Module {
            name_index: cursor.read_u16::<BE>().map_err(|_| io_err("Module"))?,
        }),
        Tag::Package => ConstantPoolEntry::Package(Package {
            name_index: cursor.read_u16::<BE>().map_err(|_| io_err("Package"))?,
        }),
    })
}

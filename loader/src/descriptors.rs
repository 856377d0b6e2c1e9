//! [FieldDescriptors & MethodDescriptors](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#%5B%7B%22num%22%3A677%2C%22gen%22%3A0%7D%2C%7B%22name%22%3A%22XYZ%22%7D%2C72%2C167%2Cnull%5D)
//!
//! Grammar (§4.3):
//! ```text
//! FieldDescriptor  := FieldType
//! FieldType        := BaseType | ObjectType | ArrayType
//! BaseType         := 'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z'
//! ObjectType       := 'L' ClassName ';'
//! ArrayType        := '[' FieldType
//! MethodDescriptor := '(' FieldType* ')' (FieldType | 'V')
//! ```
//! a recursive-descent reading of the above, one character at a time.

use crate::errors::{DescriptorCause, DescriptorError};

const MAX_ARRAY_DIMENSIONS: u8 = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Binary name with `/` rewritten to `.`.
    Object(String),
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaseType::Byte => write!(f, "byte"),
            BaseType::Char => write!(f, "char"),
            BaseType::Double => write!(f, "double"),
            BaseType::Float => write!(f, "float"),
            BaseType::Int => write!(f, "int"),
            BaseType::Long => write!(f, "long"),
            BaseType::Short => write!(f, "short"),
            BaseType::Boolean => write!(f, "boolean"),
            BaseType::Object(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub base_type: BaseType,
    pub array_dimensions: u8,
}

impl std::fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base_type)?;
        for _ in 0..self.array_dimensions {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

impl FieldDescriptor {
    /// Parses one `FieldType` starting at byte offset 0 of `text`. Returns
    /// the parsed descriptor and the number of bytes consumed, so a caller
    /// walking a method's parameter list can resume from there.
    pub fn parse(text: &str) -> Result<(FieldDescriptor, usize), DescriptorError> {
        let bytes = text.as_bytes();
        let mut pos = 0usize;
        let mut dims: u32 = 0;
        while pos < bytes.len() && bytes[pos] == b'[' {
            dims += 1;
            pos += 1;
            if dims > MAX_ARRAY_DIMENSIONS as u32 {
                return Err(DescriptorError::new(
                    DescriptorCause::TooManyDimensions,
                    text.to_string(),
                ));
            }
        }
        let Some(&marker) = bytes.get(pos) else {
            return Err(DescriptorError::new(
                DescriptorCause::IncompleteDescriptor,
                text.to_string(),
            ));
        };
        let base_type = match marker {
            b'B' => {
                pos += 1;
                BaseType::Byte
            }
            b'C' => {
                pos += 1;
                BaseType::Char
            }
            b'D' => {
                pos += 1;
                BaseType::Double
            }
            b'F' => {
                pos += 1;
                BaseType::Float
            }
            b'I' => {
                pos += 1;
                BaseType::Int
            }
            b'J' => {
                pos += 1;
                BaseType::Long
            }
            b'S' => {
                pos += 1;
                BaseType::Short
            }
            b'Z' => {
                pos += 1;
                BaseType::Boolean
            }
            b'L' => {
                pos += 1;
                let start = pos;
                while bytes.get(pos).is_some_and(|b| *b != b';') {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return Err(DescriptorError::new(
                        DescriptorCause::IncompleteDescriptor,
                        text.to_string(),
                    ));
                }
                let name = std::str::from_utf8(&bytes[start..pos])
                    .unwrap_or("")
                    .replace('/', ".");
                pos += 1; // the ';'
                BaseType::Object(name)
            }
            other => {
                return Err(DescriptorError::new(
                    DescriptorCause::UnknownBaseType(other as char),
                    text.to_string(),
                ))
            }
        };
        Ok((
            FieldDescriptor {
                base_type,
                array_dimensions: dims as u8,
            },
            pos,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldDescriptor>,
    /// `None` is a void return.
    pub return_type: Option<FieldDescriptor>,
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.return_type {
            Some(ret) => write!(f, "{ret}")?,
            None => write!(f, "void")?,
        }
        write!(f, " (")?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

impl MethodDescriptor {
    pub fn parse(text: &str) -> Result<MethodDescriptor, DescriptorError> {
        if !text.starts_with('(') {
            return Err(DescriptorError::new(
                DescriptorCause::BadMethodDescriptor,
                text.to_string(),
            ));
        }
        let mut pos = 1usize;
        let bytes = text.as_bytes();
        let mut parameters = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let (descriptor, consumed) = FieldDescriptor::parse(&text[pos..])?;
                    pos += consumed;
                    parameters.push(descriptor);
                }
                None => {
                    return Err(DescriptorError::new(
                        DescriptorCause::IncompleteDescriptor,
                        text.to_string(),
                    ))
                }
            }
        }
        let return_type = match bytes.get(pos) {
            Some(b'V') => None,
            Some(_) => Some(FieldDescriptor::parse(&text[pos..])?.0),
            None => {
                return Err(DescriptorError::new(
                    DescriptorCause::IncompleteDescriptor,
                    text.to_string(),
                ))
            }
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_field_descriptor() {
        let (fd, consumed) = FieldDescriptor::parse("I").unwrap();
        assert_eq!(fd.base_type, BaseType::Int);
        assert_eq!(fd.array_dimensions, 0);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn parses_object_field_descriptor_with_slash_name() {
        let (fd, consumed) = FieldDescriptor::parse("Ljava/lang/String;").unwrap();
        assert_eq!(fd.base_type, BaseType::Object("java.lang.String".into()));
        assert_eq!(consumed, "Ljava/lang/String;".len());
    }

    #[test]
    fn parses_nested_array_descriptor() {
        let (fd, _) = FieldDescriptor::parse("[[I").unwrap();
        assert_eq!(fd.base_type, BaseType::Int);
        assert_eq!(fd.array_dimensions, 2);
        assert_eq!(fd.to_string(), "int[][]");
    }

    #[test]
    fn rejects_too_many_dimensions() {
        let text = "[".repeat(256) + "I";
        assert!(FieldDescriptor::parse(&text).is_err());
    }

    #[test]
    fn method_descriptor_display_matches_spec_example() {
        let md = MethodDescriptor::parse("(II)V").unwrap();
        assert_eq!(md.to_string(), "void (int, int)");
    }

    #[test]
    fn method_descriptor_with_object_params_and_return() {
        let md = MethodDescriptor::parse("(Ljava/lang/String;I)Ljava/lang/Object;").unwrap();
        assert_eq!(md.parameters.len(), 2);
        assert!(md.return_type.is_some());
        assert_eq!(
            md.to_string(),
            "java.lang.Object (java.lang.String, int)"
        );
    }

    #[test]
    fn rejects_method_descriptor_without_leading_paren() {
        assert!(MethodDescriptor::parse("II)V").is_err());
    }

    #[test]
    fn rejects_incomplete_object_descriptor() {
        assert!(FieldDescriptor::parse("Ljava/lang/String").is_err());
    }
}

//! A small `javap`-style disassembler sharing the opcode table with the
//! interpreter (`classvm::ops`). Renders a class's structure and, with
//! `-c`, a textual disassembly of each method's bytecode annotated with
//! resolved constant-pool comments.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use classvm::ops::{self, Mnemonic};
use loader::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use loader::attributes::{Attribute, Code};
use loader::class_file::{ClassFile, FieldInfo, MethodInfo};
use loader::constants::ConstantPoolEntry;
use loader::descriptors::{FieldDescriptor, MethodDescriptor};
use loader::errors::{DecodeCause, DecodeError};

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(value_name = "CLASSES", required = true)]
    class_file: Vec<PathBuf>,

    /// Print line number and local variable tables (reserved, not yet implemented)
    #[arg(short, long)]
    line: bool,

    /// Show only public classes and members
    #[arg(long)]
    public: bool,

    /// Show protected/public classes and members
    #[arg(long)]
    protected: bool,

    /// Show package/protected/public classes and members (default)
    #[arg(long, default_value_t = true)]
    package: bool,

    /// Show all classes and members
    #[arg(long)]
    private: bool,

    /// Disassemble the code
    #[arg(short = 'c', long)]
    disassemble: bool,

    /// Print internal type signatures (reserved, not yet implemented)
    #[arg(short, long)]
    signatures: bool,

    /// Show system info (reserved, not yet implemented)
    #[arg(long)]
    sysinfo: bool,

    /// Show final constants
    #[arg(long)]
    constants: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    for path in &args.class_file {
        if let Err(err) = disassemble_file(path, &args) {
            eprintln!("{}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

fn disassemble_file(path: &PathBuf, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if path.extension().map(|e| e != "class").unwrap_or(true) {
        return Err("not a .class file".into());
    }
    let mut file = File::open(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    let class = ClassFile::from_bytes(&contents)?;
    print!("{}", output_class(&class, args)?);
    Ok(())
}

fn visible<F: AccessCheck>(flags: &F, args: &Args) -> bool {
    if args.private {
        return true;
    }
    if args.protected {
        return !flags.is_private();
    }
    if args.public {
        return flags.is_public();
    }
    // default (package): everything but private
    !flags.is_private()
}

trait AccessCheck {
    fn is_public(&self) -> bool;
    fn is_private(&self) -> bool;
}

impl AccessCheck for FieldInfo {
    fn is_public(&self) -> bool {
        self.access_flags.contains(&FieldAccessFlags::AccPublic)
    }
    fn is_private(&self) -> bool {
        self.access_flags.contains(&FieldAccessFlags::AccPrivate)
    }
}

impl AccessCheck for MethodInfo {
    fn is_public(&self) -> bool {
        self.access_flags.contains(&MethodAccessFlags::AccPublic)
    }
    fn is_private(&self) -> bool {
        self.access_flags.contains(&MethodAccessFlags::AccPrivate)
    }
}

fn class_access_keyword(flag: ClassAccessFlags) -> &'static str {
    match flag {
        ClassAccessFlags::AccPublic => "public",
        ClassAccessFlags::AccFinal => "final",
        ClassAccessFlags::AccSuper => "",
        ClassAccessFlags::AccInterface => "interface",
        ClassAccessFlags::AccAbstract => "abstract",
        ClassAccessFlags::AccSynthetic => "synthetic",
        ClassAccessFlags::AccAnnotation => "",
        ClassAccessFlags::AccEnum => "enum",
        ClassAccessFlags::AccModule => "module",
    }
}

fn field_access_keyword(flag: FieldAccessFlags) -> &'static str {
    match flag {
        FieldAccessFlags::AccPublic => "public",
        FieldAccessFlags::AccPrivate => "private",
        FieldAccessFlags::AccProtected => "protected",
        FieldAccessFlags::AccStatic => "static",
        FieldAccessFlags::AccFinal => "final",
        FieldAccessFlags::AccVolatile => "volatile",
        FieldAccessFlags::AccTransient => "transient",
        FieldAccessFlags::AccSynthetic => "",
        FieldAccessFlags::AccEnum => "",
    }
}

fn method_access_keyword(flag: MethodAccessFlags) -> &'static str {
    match flag {
        MethodAccessFlags::AccPublic => "public",
        MethodAccessFlags::AccPrivate => "private",
        MethodAccessFlags::AccProtected => "protected",
        MethodAccessFlags::AccStatic => "static",
        MethodAccessFlags::AccFinal => "final",
        MethodAccessFlags::AccSynchronized => "synchronized",
        MethodAccessFlags::AccBridge => "",
        MethodAccessFlags::AccVarArgs => "",
        MethodAccessFlags::AccNative => "native",
        MethodAccessFlags::AccAbstract => "abstract",
        MethodAccessFlags::AccStrict => "strictfp",
        MethodAccessFlags::AccSynthetic => "",
    }
}

fn join_keywords<T: Copy>(flags: &[T], keyword: impl Fn(T) -> &'static str) -> String {
    flags
        .iter()
        .copied()
        .map(keyword)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn output_class(class: &ClassFile, args: &Args) -> Result<String, BoxError> {
    let mut out = String::new();

    for attribute in &class.attributes {
        if let Attribute::SourceFile { sourcefile_index } = attribute {
            let name = class.utf8_at(*sourcefile_index)?.as_str();
            out.push_str(&format!("Compiled from \"{name}\"\n"));
        }
    }

    let this_class_name = class.this_class_name()?;
    let class_flags = join_keywords(&class.access_flags, class_access_keyword);
    let decl = if class_flags.is_empty() {
        format!("class {this_class_name} {{")
    } else {
        format!("{class_flags} class {this_class_name} {{")
    };
    out.push_str(&decl);
    out.push('\n');

    let mut any_field = false;
    for field in &class.fields {
        if !visible(field, args) {
            continue;
        }
        any_field = true;
        let name = class.utf8_at(field.name_index)?.as_str();
        let descriptor_text = class.utf8_at(field.descriptor_index)?.as_str();
        let (descriptor, _) = FieldDescriptor::parse(&descriptor_text)?;
        let flags = join_keywords(&field.access_flags, field_access_keyword);

        let initializer = if args.constants {
            field
                .constant_value()
                .map(|cv| format_constant_value(class, cv.constantvalue_index))
                .transpose()?
                .flatten()
        } else {
            None
        };

        match initializer {
            Some(value) => out.push_str(&format!("\t{flags} {descriptor} {name} = {value};\n")),
            None => out.push_str(&format!("\t{flags} {descriptor} {name};\n")),
        }
    }
    if any_field {
        out.push('\n');
    }

    for method in &class.methods {
        if !visible(method, args) {
            continue;
        }
        let name = class.utf8_at(method.name_index)?.as_str();
        let descriptor_text = class.utf8_at(method.descriptor_index)?.as_str();
        let descriptor = MethodDescriptor::parse(&descriptor_text)?;
        let flags = join_keywords(&method.access_flags, method_access_keyword);

        if name == "<clinit>" {
            out.push_str(&format!("\t{flags} {{}};\n"));
        } else {
            let params = descriptor
                .parameters
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let return_type = descriptor
                .return_type
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "void".to_string());
            out.push_str(&format!("\t{flags} {return_type} {name}({params});\n"));
        }

        if args.disassemble {
            if let Some(code) = method.code() {
                out.push_str(&disassemble_code(class, code)?);
            }
        }
        out.push('\n');
    }

    out.push_str("}\n");
    Ok(out)
}

fn format_constant_value(class: &ClassFile, index: u16) -> Result<Option<String>, BoxError> {
    Ok(Some(match class.constant_pool_at(index)? {
        ConstantPoolEntry::Integer(i) => i.value().to_string(),
        ConstantPoolEntry::Float(f) => format!("{}f", f.value()),
        ConstantPoolEntry::Long(l) => format!("{}L", l.value()),
        ConstantPoolEntry::Double(d) => d.value().to_string(),
        ConstantPoolEntry::String(s) => {
            let text = class.utf8_at(s.string_index)?.as_str();
            format!("\"{text}\"")
        }
        _ => return Ok(None),
    }))
}

fn disassemble_code(class: &ClassFile, code: &Code) -> Result<String, BoxError> {
    let mut out = String::new();
    let mut pc = 0usize;
    while pc < code.code.len() {
        let (instruction, next_pc) = ops::decode(&code.code, pc)?;
        let rendered = render_operands(class, &instruction.mnemonic, &instruction.operands, pc)?;
        out.push_str(&format!("\t\t{pc}: {name}{rendered}\n", name = instruction.mnemonic.name()));
        pc = next_pc;
    }
    Ok(out)
}

fn render_operands(
    class: &ClassFile,
    mnemonic: &Mnemonic,
    operands: &[u8],
    opcode_pc: usize,
) -> Result<String, BoxError> {
    use Mnemonic::*;
    let rendered = match mnemonic {
        Bipush => format!(" {}", operands[0] as i8),
        Sipush => format!(" {}", ops::sign_extend_s16(operands[0], operands[1])),
        Iload | Lload | Fload | Dload | Istore | Lstore | Fstore | Dstore => {
            format!(" {}", operands[0])
        }
        Iinc => format!(" {}, {}", operands[0], operands[1] as i8),
        Ldc => {
            let index = operands[0] as u16;
            format!(" #{index}{}", pool_comment(class, index)?)
        }
        LdcW | Ldc2W | Getstatic | Putstatic | Invokestatic => {
            let index = ops::wide_index(operands[0], operands[1]);
            format!(" #{index}{}", pool_comment(class, index)?)
        }
        Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge
        | IfIcmpgt | IfIcmple | Goto => {
            let offset = ops::sign_extend_s16(operands[0], operands[1]);
            format!(" {}", (opcode_pc as i64 + offset as i64))
        }
        GotoW => {
            let offset = ops::sign_extend_s32([operands[0], operands[1], operands[2], operands[3]]);
            format!(" {}", (opcode_pc as i64 + offset as i64))
        }
        _ => String::new(),
    };
    Ok(rendered)
}

fn pool_comment(class: &ClassFile, index: u16) -> Result<String, BoxError> {
    Ok(match class.constant_pool_at(index) {
        Ok(ConstantPoolEntry::Fieldref(fieldref)) => {
            let (owner, name, descriptor) = field_ref_parts(class, fieldref)?;
            if owner == class.this_class_name()? {
                format!(" // Field {name}:{descriptor}")
            } else {
                format!(" // Field {owner}.{name}:{descriptor}")
            }
        }
        Ok(ConstantPoolEntry::Methodref(methodref)) => {
            let (owner, name, descriptor) = method_ref_parts(class, methodref)?;
            if owner == class.this_class_name()? {
                format!(" // Method {name}:{descriptor}")
            } else {
                format!(" // Method {owner}.{name}:{descriptor}")
            }
        }
        Ok(ConstantPoolEntry::Integer(i)) => format!(" // int {}", i.value()),
        Ok(ConstantPoolEntry::Float(f)) => format!(" // float {}", f.value()),
        Ok(ConstantPoolEntry::Long(l)) => format!(" // long {}", l.value()),
        Ok(ConstantPoolEntry::Double(d)) => format!(" // double {}", d.value()),
        Ok(ConstantPoolEntry::String(s)) => {
            let text = class.utf8_at(s.string_index)?.as_str();
            format!(" // String \"{text}\"")
        }
        Ok(ConstantPoolEntry::Class(c)) => {
            let name = class.utf8_at(c.name_index)?.as_binary_name();
            format!(" // class {name}")
        }
        _ => String::new(),
    })
}

fn field_ref_parts(
    class: &ClassFile,
    fieldref: &loader::constants::Fieldref,
) -> Result<(String, String, String), BoxError> {
    let owner = class.class_name_at(fieldref.class_index)?;
    let ConstantPoolEntry::NameAndType(nat) = class.constant_pool_at(fieldref.name_and_type_index)? else {
        return Err(DecodeError::new(
            DecodeCause::InvalidIndex(fieldref.name_and_type_index),
            "expected a NameAndType constant",
        )
        .into());
    };
    let name = class.utf8_at(nat.name_index)?.as_str();
    let descriptor = class.utf8_at(nat.descriptor_index)?.as_str();
    Ok((owner, name, descriptor))
}

fn method_ref_parts(
    class: &ClassFile,
    methodref: &loader::constants::Methodref,
) -> Result<(String, String, String), BoxError> {
    let owner = class.class_name_at(methodref.class_index)?;
    let ConstantPoolEntry::NameAndType(nat) = class.constant_pool_at(methodref.name_and_type_index)? else {
        return Err(DecodeError::new(
            DecodeCause::InvalidIndex(methodref.name_and_type_index),
            "expected a NameAndType constant",
        )
        .into());
    };
    let name = class.utf8_at(nat.name_index)?.as_str();
    let descriptor = class.utf8_at(nat.descriptor_index)?.as_str();
    Ok((owner, name, descriptor))
}

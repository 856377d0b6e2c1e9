#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// [Class Access Flags](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=85)
pub enum ClassAccessFlags {
    AccPublic = 0x0001,
    /// Declared final; no subclasses allowed.
    AccFinal = 0x0010,
    /// Treat superclass methods specially when invoked by\
    /// the invokespecial instruction.
    AccSuper = 0x0020,
    /// Is an interface, not a class.
    AccInterface = 0x0200,
    /// Declared abstract; must not be instantiated.
    AccAbstract = 0x0400,
    /// Declared synthetic; not present in the source code.
    AccSynthetic = 0x1000,
    /// Declared as an annotation interface.
    AccAnnotation = 0x2000,
    /// Declared as an enum class.
    AccEnum = 0x4000,
    /// Is a module, not a class or interface.
    AccModule = 0x8000,
}

impl ClassAccessFlags {
    const ALL: &'static [ClassAccessFlags] = &[
        ClassAccessFlags::AccPublic,
        ClassAccessFlags::AccFinal,
        ClassAccessFlags::AccSuper,
        ClassAccessFlags::AccInterface,
        ClassAccessFlags::AccAbstract,
        ClassAccessFlags::AccSynthetic,
        ClassAccessFlags::AccAnnotation,
        ClassAccessFlags::AccEnum,
        ClassAccessFlags::AccModule,
    ];

    pub fn from_u16(value: u16) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|flag| value & *flag as u16 == *flag as u16)
            .collect()
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// [Method Access Flags](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=112)
pub enum MethodAccessFlags {
    AccPublic = 0x0001,
    /// Declared private; accessible only within the
    /// defining class and other classes belonging to the same
    /// nest (§5.4.4).
    AccPrivate = 0x0002,
    /// Declared protected; may be accessed within
    /// subclasses.
    AccProtected = 0x0004,
    /// Declared static.
    AccStatic = 0x0008,
    /// Declared final; no subclasses allowed.
    AccFinal = 0x0010,
    /// Declared synchronized; invocation is wrapped
    /// by a monitor use.
    AccSynchronized = 0x0020,
    /// A bridge method, generated by the compiler.
    AccBridge = 0x0040,
    /// Declared with variable number of arguments.
    AccVarArgs = 0x0080,
    /// Declared native; implemented in a language other
    /// than the Java programming language.
    AccNative = 0x0100,
    /// Declared abstract; must not be instantiated.
    AccAbstract = 0x0400,
    /// Declared strictfp in class files whose major version is
    /// at least 46 and at most 60.
    AccStrict = 0x0800,
    /// Declared synthetic; not present in the source code.
    AccSynthetic = 0x1000,
}

impl MethodAccessFlags {
    const ALL: &'static [MethodAccessFlags] = &[
        MethodAccessFlags::AccPublic,
        MethodAccessFlags::AccPrivate,
        MethodAccessFlags::AccProtected,
        MethodAccessFlags::AccStatic,
        MethodAccessFlags::AccFinal,
        MethodAccessFlags::AccSynchronized,
        MethodAccessFlags::AccBridge,
        MethodAccessFlags::AccVarArgs,
        MethodAccessFlags::AccNative,
        MethodAccessFlags::AccAbstract,
        MethodAccessFlags::AccStrict,
        MethodAccessFlags::AccSynthetic,
    ];

    pub fn from_u16(value: u16) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|flag| value & *flag as u16 == *flag as u16)
            .collect()
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessFlags {
    AccPublic = 0x0001,
    /// Declared private; accessible only within the
    /// defining class and other classes belonging to the same
    /// nest (§5.4.4).
    AccPrivate = 0x0002,
    /// Declared protected; may be accessed within
    /// subclasses.
    AccProtected = 0x0004,
    /// Declared static.
    AccStatic = 0x0008,
    /// Declared final; no subclasses allowed.
    AccFinal = 0x0010,
    /// Declared volatile; cannot be cached.
    AccVolatile = 0x0040,
    /// Declared transient; not written or read by a
    /// persistent object manager.
    AccTransient = 0x0080,
    /// Declared synthetic; not present in the source code.
    AccSynthetic = 0x1000,
    /// Declared as an enum class.
    AccEnum = 0x4000,
}

impl FieldAccessFlags {
    const ALL: &'static [FieldAccessFlags] = &[
        FieldAccessFlags::AccPublic,
        FieldAccessFlags::AccPrivate,
        FieldAccessFlags::AccProtected,
        FieldAccessFlags::AccStatic,
        FieldAccessFlags::AccFinal,
        FieldAccessFlags::AccVolatile,
        FieldAccessFlags::AccTransient,
        FieldAccessFlags::AccSynthetic,
        FieldAccessFlags::AccEnum,
    ];

    pub fn from_u16(value: u16) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|flag| value & *flag as u16 == *flag as u16)
            .collect()
    }
}

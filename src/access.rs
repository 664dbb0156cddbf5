//! Access flags shared by class files and dex files. Dex widens the JVM's
//! u2 flags to u4 and adds a few bits of its own.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        /// `ACC_SUPER` on classes, `synchronized` on methods.
        const SYNCHRONIZED = 0x20;
        /// `volatile` on fields, `bridge` on methods.
        const VOLATILE = 0x40;
        /// `transient` on fields, `varargs` on methods.
        const TRANSIENT = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        /// `ACC_MODULE` on classes, `mandated` on parameters.
        const MODULE = 0x8000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

/// Where a set of flags appears; decides how overloaded bits read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Class,
    Field,
    Method,
    InnerClass,
    Parameter,
}

const CLASS_NAMES: &[(AccessFlags, &str)] = &[
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::SYNCHRONIZED, "super"),
    (AccessFlags::INTERFACE, "interface"),
    (AccessFlags::ABSTRACT, "abstract"),
    (AccessFlags::SYNTHETIC, "synthetic"),
    (AccessFlags::ANNOTATION, "annotation"),
    (AccessFlags::ENUM, "enum"),
    (AccessFlags::MODULE, "module"),
];

const FIELD_NAMES: &[(AccessFlags, &str)] = &[
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::PRIVATE, "private"),
    (AccessFlags::PROTECTED, "protected"),
    (AccessFlags::STATIC, "static"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::VOLATILE, "volatile"),
    (AccessFlags::TRANSIENT, "transient"),
    (AccessFlags::SYNTHETIC, "synthetic"),
    (AccessFlags::ENUM, "enum"),
];

const METHOD_NAMES: &[(AccessFlags, &str)] = &[
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::PRIVATE, "private"),
    (AccessFlags::PROTECTED, "protected"),
    (AccessFlags::STATIC, "static"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::SYNCHRONIZED, "synchronized"),
    (AccessFlags::VOLATILE, "bridge"),
    (AccessFlags::TRANSIENT, "varargs"),
    (AccessFlags::NATIVE, "native"),
    (AccessFlags::ABSTRACT, "abstract"),
    (AccessFlags::STRICT, "strict"),
    (AccessFlags::SYNTHETIC, "synthetic"),
    (AccessFlags::CONSTRUCTOR, "constructor"),
    (AccessFlags::DECLARED_SYNCHRONIZED, "declared-synchronized"),
];

const INNER_CLASS_NAMES: &[(AccessFlags, &str)] = &[
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::PRIVATE, "private"),
    (AccessFlags::PROTECTED, "protected"),
    (AccessFlags::STATIC, "static"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::INTERFACE, "interface"),
    (AccessFlags::ABSTRACT, "abstract"),
    (AccessFlags::SYNTHETIC, "synthetic"),
    (AccessFlags::ANNOTATION, "annotation"),
    (AccessFlags::ENUM, "enum"),
];

const PARAMETER_NAMES: &[(AccessFlags, &str)] = &[
    (AccessFlags::FINAL, "final"),
    (AccessFlags::SYNTHETIC, "synthetic"),
    (AccessFlags::MODULE, "mandated"),
];

impl AccessFlags {
    /// Modifier keywords for the bits that are set, in declaration order.
    pub fn modifiers(self, target: FlagTarget) -> Vec<&'static str> {
        let table = match target {
            FlagTarget::Class => CLASS_NAMES,
            FlagTarget::Field => FIELD_NAMES,
            FlagTarget::Method => METHOD_NAMES,
            FlagTarget::InnerClass => INNER_CLASS_NAMES,
            FlagTarget::Parameter => PARAMETER_NAMES,
        };
        table.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect()
    }

    /// `0x0021 [public super]`
    pub fn describe(self, target: FlagTarget) -> String {
        format!("{:#06x} [{}]", self.bits(), self.modifiers(target).join(" "))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_bits_depend_on_target() {
        let flags = AccessFlags::from_bits_retain(0x0041);
        assert_eq!(flags.modifiers(FlagTarget::Field), ["public", "volatile"]);
        assert_eq!(flags.modifiers(FlagTarget::Method), ["public", "bridge"]);
        assert_eq!(AccessFlags::from_bits_retain(0x21).describe(FlagTarget::Class), "0x0021 [public super]");
    }

    #[test]
    fn unknown_bits_are_kept() {
        let flags = AccessFlags::from_bits_retain(0x8000_0001);
        assert_eq!(flags.bits(), 0x8000_0001);
        assert_eq!(flags.modifiers(FlagTarget::Class), ["public"]);
    }
}

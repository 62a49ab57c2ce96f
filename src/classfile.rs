//! Decoder for compiled class units.
//!
//! Reads just enough of the class-file format to recover symbol identity:
//! the class name, its accessibility, the source filename, and the public
//! members with their descriptors and line numbers. Unknown attributes,
//! vendor-specific ones included, are skipped via their length prefix.

use crate::error::Result;
use crate::error::SymdexErr;

const MAGIC: u32 = 0xCAFE_BABE;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;

/// Accessibility of a class or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
    Private,
    Default,
}

impl Access {
    fn from_flags(flags: u16) -> Self {
        if flags & ACC_PUBLIC != 0 {
            Self::Public
        } else if flags & ACC_PROTECTED != 0 {
            Self::Protected
        } else if flags & ACC_PRIVATE != 0 {
            Self::Private
        } else {
            Self::Default
        }
    }
}

/// A method of a parsed class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMethod {
    pub name: String,
    pub descriptor: String,
    pub access: Access,
    /// Smallest `LineNumberTable` entry of the method body, if present.
    pub line: Option<u32>,
}

/// A field of a parsed class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedField {
    pub name: String,
    pub access: Access,
}

/// Structured view of one compiled class unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClass {
    /// Slash-delimited name as stored in the constant pool.
    pub internal_name: String,
    pub access: Access,
    /// Filename from the `SourceFile` attribute.
    pub source_name: Option<String>,
    /// Smallest method line, used as the class source pointer.
    pub source_line: Option<u32>,
    /// Methods in declaration order.
    pub methods: Vec<ParsedMethod>,
    /// Fields in declaration order.
    pub fields: Vec<ParsedField>,
}

impl ParsedClass {
    /// Dotted fully qualified name.
    pub fn fqn(&self) -> String {
        self.internal_name.replace('/', ".")
    }

    /// Package part of the FQN, empty for the default package.
    pub fn package(&self) -> String {
        self.fqn()
            .rsplit_once('.')
            .map(|(pkg, _)| pkg.to_string())
            .unwrap_or_default()
    }

    pub fn is_public(&self) -> bool {
        self.access == Access::Public
    }
}

/// Decode one class unit.
pub fn parse_class(bytes: &[u8]) -> Result<ParsedClass> {
    let mut reader = ClassReader::new(bytes);
    let magic = reader.read_u4()?;
    if magic != MAGIC {
        return Err(malformed("invalid magic header"));
    }
    let _minor = reader.read_u2()?;
    let _major = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let access = Access::from_flags(reader.read_u2()?);
    let this_class = reader.read_u2()?;
    let _super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()?;
    for _ in 0..interfaces_count {
        reader.read_u2()?;
    }

    let mut fields = Vec::new();
    let fields_count = reader.read_u2()?;
    for _ in 0..fields_count {
        let field_access = Access::from_flags(reader.read_u2()?);
        let name_index = reader.read_u2()?;
        let _descriptor_index = reader.read_u2()?;
        let attributes_count = reader.read_u2()?;
        skip_attributes(&mut reader, attributes_count)?;

        fields.push(ParsedField {
            name: pool.utf8(name_index)?.to_string(),
            access: field_access,
        });
    }

    let mut methods = Vec::new();
    let methods_count = reader.read_u2()?;
    for _ in 0..methods_count {
        let method_access = Access::from_flags(reader.read_u2()?);
        let name_index = reader.read_u2()?;
        let descriptor_index = reader.read_u2()?;
        let attributes_count = reader.read_u2()?;
        let line = read_method_line(&mut reader, &pool, attributes_count)?;

        methods.push(ParsedMethod {
            name: pool.utf8(name_index)?.to_string(),
            descriptor: pool.utf8(descriptor_index)?.to_string(),
            access: method_access,
            line,
        });
    }

    let mut source_name = None;
    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        if pool.utf8(name_index)? == "SourceFile" {
            let mut sub = ClassReader::new(reader.read_slice(length)?);
            source_name = Some(pool.utf8(sub.read_u2()?)?.to_string());
        } else {
            reader.skip(length)?;
        }
    }

    let source_line = methods.iter().filter_map(|m| m.line).min();
    let internal_name = pool.class_name(this_class)?;

    Ok(ParsedClass {
        internal_name,
        access,
        source_name,
        source_line,
        methods,
        fields,
    })
}

/// Scan a method's attributes for the smallest line number.
///
/// The `LineNumberTable` lives inside the `Code` attribute; everything else
/// is skipped by length.
fn read_method_line(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    attributes_count: u16,
) -> Result<Option<u32>> {
    let mut line = None;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        if pool.utf8(name_index)? != "Code" {
            reader.skip(length)?;
            continue;
        }

        let mut code = ClassReader::new(reader.read_slice(length)?);
        let _max_stack = code.read_u2()?;
        let _max_locals = code.read_u2()?;
        let code_length = code.read_u4()? as usize;
        code.skip(code_length)?;
        let exception_table_length = code.read_u2()?;
        code.skip(exception_table_length as usize * 8)?;

        let code_attributes = code.read_u2()?;
        for _ in 0..code_attributes {
            let attr_name_index = code.read_u2()?;
            let attr_length = code.read_u4()? as usize;
            if pool.utf8(attr_name_index)? != "LineNumberTable" {
                code.skip(attr_length)?;
                continue;
            }
            let mut table = ClassReader::new(code.read_slice(attr_length)?);
            let entries = table.read_u2()?;
            for _ in 0..entries {
                let _start_pc = table.read_u2()?;
                let entry_line = table.read_u2()? as u32;
                line = Some(line.map_or(entry_line, |l: u32| l.min(entry_line)));
            }
        }
    }
    Ok(line)
}

fn malformed(cause: impl Into<String>) -> SymdexErr {
    SymdexErr::ClassParse {
        cause: cause.into(),
    }
}

enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    let text = String::from_utf8(bytes.to_vec())
                        .map_err(|e| malformed(format!("bad utf8 in constant pool: {e}")))?;
                    Constant::Utf8(text)
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                // Long and Double take two pool slots.
                5 | 6 => {
                    reader.skip(8)?;
                    entries.push(Constant::Unusable);
                    index += 1;
                    Constant::Other
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 | 16 | 19 | 20 => {
                    reader.read_u2()?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(malformed(format!("unsupported constant tag {other}"))),
            };
            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant> {
        self.entries
            .get(index as usize)
            .ok_or_else(|| malformed(format!("constant index {index} out of range")))
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text.as_str()),
            _ => Err(malformed(format!("constant {index} is not utf8"))),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(malformed(format!("constant {index} is not a class"))),
        }
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u1(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(malformed("unexpected end of class file"));
        }
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_u2(&mut self) -> Result<u16> {
        if self.pos + 2 > self.data.len() {
            return Err(malformed("unexpected end of class file"));
        }
        let value = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn read_u4(&mut self) -> Result<u32> {
        if self.pos + 4 > self.data.len() {
            return Err(malformed("unexpected end of class file"));
        }
        let value = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(malformed("unexpected end of class file"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if self.pos + len > self.data.len() {
            return Err(malformed("unexpected end of class file"));
        }
        self.pos += len;
        Ok(())
    }
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<()> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::ClassBytes;
    use super::testing::PRIVATE;
    use super::testing::PUBLIC;
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let err = parse_class(&[0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut builder = ClassBytes::new();
        builder.method("run", "()V", PUBLIC, Some(10));
        let bytes = builder.build("a/B", PUBLIC);
        assert!(parse_class(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn parses_names_members_and_lines() {
        let mut builder = ClassBytes::new();
        builder.field("count", "I", PUBLIC);
        builder.field("secret", "I", PRIVATE);
        builder.method("<init>", "()V", PUBLIC, Some(7));
        builder.method("run", "(I)V", PUBLIC, Some(12));
        builder.source_file("Runner.java");
        let bytes = builder.build("org/example/Runner$Inner", PUBLIC);

        let parsed = parse_class(&bytes).unwrap();
        assert_eq!(parsed.internal_name, "org/example/Runner$Inner");
        assert_eq!(parsed.fqn(), "org.example.Runner$Inner");
        assert_eq!(parsed.package(), "org.example");
        assert!(parsed.is_public());
        assert_eq!(parsed.source_name.as_deref(), Some("Runner.java"));
        assert_eq!(parsed.source_line, Some(7));

        assert_eq!(parsed.fields.len(), 2);
        assert_eq!(parsed.fields[0].name, "count");
        assert_eq!(parsed.fields[0].access, Access::Public);
        assert_eq!(parsed.fields[1].access, Access::Private);

        assert_eq!(parsed.methods.len(), 2);
        assert_eq!(parsed.methods[1].name, "run");
        assert_eq!(parsed.methods[1].descriptor, "(I)V");
        assert_eq!(parsed.methods[1].line, Some(12));
    }

    #[test]
    fn skips_unknown_attributes() {
        let mut builder = ClassBytes::new();
        builder.method("run", "()V", PUBLIC, None);
        // Vendor attribute on the class itself.
        let attr_name = builder.utf8("com.vendor.Widget");
        builder.attrs.extend(attr_name.to_be_bytes());
        builder.attrs.extend(4u32.to_be_bytes());
        builder.attrs.extend([0xDE, 0xAD, 0xBE, 0xEF]);
        builder.attr_count += 1;
        let bytes = builder.build("a/B", PUBLIC);

        let parsed = parse_class(&bytes).unwrap();
        assert_eq!(parsed.fqn(), "a.B");
        assert_eq!(parsed.methods.len(), 1);
    }

    #[test]
    fn default_access_is_not_public() {
        let bytes = ClassBytes::new().build("a/Hidden", 0);
        let parsed = parse_class(&bytes).unwrap();
        assert_eq!(parsed.access, Access::Default);
        assert!(!parsed.is_public());
    }
}

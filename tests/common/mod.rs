//! Shared fixtures: synthesized class-file bytes and jar archives.
//!
//! No JDK is assumed on the test host, so the suites build real class
//! units themselves: magic, constant pool, access flags, members with
//! `LineNumberTable`, and a `SourceFile` attribute.
#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

pub const ACC_PUBLIC: u16 = 0x0001;

const MAGIC: u32 = 0xCAFE_BABE;

/// Builder for one compiled class unit.
pub struct ClassFile {
    pool: Vec<Vec<u8>>,
    fields: Vec<u8>,
    field_count: u16,
    methods: Vec<u8>,
    method_count: u16,
    attrs: Vec<u8>,
    attr_count: u16,
}

impl ClassFile {
    pub fn new() -> Self {
        Self {
            pool: Vec::new(),
            fields: Vec::new(),
            field_count: 0,
            methods: Vec::new(),
            method_count: 0,
            attrs: Vec::new(),
            attr_count: 0,
        }
    }

    fn utf8(&mut self, text: &str) -> u16 {
        let mut entry = vec![1u8];
        entry.extend((text.len() as u16).to_be_bytes());
        entry.extend(text.as_bytes());
        self.pool.push(entry);
        self.pool.len() as u16
    }

    fn class(&mut self, internal: &str) -> u16 {
        let name = self.utf8(internal);
        let mut entry = vec![7u8];
        entry.extend(name.to_be_bytes());
        self.pool.push(entry);
        self.pool.len() as u16
    }

    pub fn field(mut self, name: &str, descriptor: &str, flags: u16) -> Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.extend(flags.to_be_bytes());
        self.fields.extend(name_index.to_be_bytes());
        self.fields.extend(descriptor_index.to_be_bytes());
        self.fields.extend(0u16.to_be_bytes());
        self.field_count += 1;
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str, flags: u16, line: u16) -> Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let code_name = self.utf8("Code");
        let table_name = self.utf8("LineNumberTable");

        self.methods.extend(flags.to_be_bytes());
        self.methods.extend(name_index.to_be_bytes());
        self.methods.extend(descriptor_index.to_be_bytes());

        let mut table = Vec::new();
        table.extend(1u16.to_be_bytes());
        table.extend(0u16.to_be_bytes());
        table.extend(line.to_be_bytes());

        let mut code = Vec::new();
        code.extend(0u16.to_be_bytes()); // max_stack
        code.extend(0u16.to_be_bytes()); // max_locals
        code.extend(1u32.to_be_bytes());
        code.push(0xB1); // return
        code.extend(0u16.to_be_bytes()); // exception table
        code.extend(1u16.to_be_bytes());
        code.extend(table_name.to_be_bytes());
        code.extend((table.len() as u32).to_be_bytes());
        code.extend(table);

        self.methods.extend(1u16.to_be_bytes());
        self.methods.extend(code_name.to_be_bytes());
        self.methods.extend((code.len() as u32).to_be_bytes());
        self.methods.extend(code);
        self.method_count += 1;
        self
    }

    pub fn source_file(mut self, name: &str) -> Self {
        let attr_name = self.utf8("SourceFile");
        let value = self.utf8(name);
        self.attrs.extend(attr_name.to_be_bytes());
        self.attrs.extend(2u32.to_be_bytes());
        self.attrs.extend(value.to_be_bytes());
        self.attr_count += 1;
        self
    }

    pub fn build(mut self, internal: &str, class_flags: u16) -> Vec<u8> {
        let this_class = self.class(internal);
        let super_class = self.class("java/lang/Object");

        let mut bytes = Vec::new();
        bytes.extend(MAGIC.to_be_bytes());
        bytes.extend(0u16.to_be_bytes());
        bytes.extend(52u16.to_be_bytes());
        bytes.extend(((self.pool.len() + 1) as u16).to_be_bytes());
        for entry in &self.pool {
            bytes.extend(entry);
        }
        bytes.extend(class_flags.to_be_bytes());
        bytes.extend(this_class.to_be_bytes());
        bytes.extend(super_class.to_be_bytes());
        bytes.extend(0u16.to_be_bytes());
        bytes.extend(self.field_count.to_be_bytes());
        bytes.extend(&self.fields);
        bytes.extend(self.method_count.to_be_bytes());
        bytes.extend(&self.methods);
        bytes.extend(self.attr_count.to_be_bytes());
        bytes.extend(&self.attrs);
        bytes
    }
}

/// Bytes of a public class with one public method and one public field.
pub fn public_class(internal: &str) -> Vec<u8> {
    let simple = internal.rsplit('/').next().unwrap();
    ClassFile::new()
        .field("count", "I", ACC_PUBLIC)
        .method("<init>", "()V", ACC_PUBLIC, 3)
        .method("run", "()V", ACC_PUBLIC, 5)
        .source_file(&format!("{simple}.java"))
        .build(internal, ACC_PUBLIC)
}

/// Write class bytes under `root` at the internal name's package path.
pub fn write_class(root: &Path, internal: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(format!("{internal}.class"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write a jar archive holding the given entries.
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

/// Sleep long enough for a rewrite to bump the millisecond mtime.
pub fn bump_clock() {
    std::thread::sleep(std::time::Duration::from_millis(20));
}

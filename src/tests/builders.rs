//! Byte image builders for the scenario tests.

/// Constant pool under construction; indices are handed out as entries are added.
pub(crate) struct Pool {
    pub bytes: Vec<u8>,
    next: u16,
}

impl Pool {
    pub fn new() -> Self {
        Pool { bytes: Vec::new(), next: 1 }
    }

    fn entry(&mut self, tag: u8, body: &[u8], slots: u16) -> u16 {
        let index = self.next;
        self.bytes.push(tag);
        self.bytes.extend_from_slice(body);
        self.next += slots;
        index
    }

    pub fn count(&self) -> u16 {
        self.next
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        let mut body = (s.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(s.as_bytes());
        self.entry(1, &body, 1)
    }

    pub fn raw_utf8(&mut self, bytes: &[u8]) -> u16 {
        let mut body = (bytes.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(bytes);
        self.entry(1, &body, 1)
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        self.entry(3, &v.to_be_bytes(), 1)
    }

    pub fn float(&mut self, v: f32) -> u16 {
        self.entry(4, &v.to_be_bytes(), 1)
    }

    pub fn long(&mut self, v: i64) -> u16 {
        self.entry(5, &v.to_be_bytes(), 2)
    }

    pub fn double(&mut self, v: f64) -> u16 {
        self.entry(6, &v.to_be_bytes(), 2)
    }

    /// Any entry made of two u2 indices: member refs, NameAndType, InvokeDynamic.
    pub fn pair(&mut self, tag: u8, first: u16, second: u16) -> u16 {
        let mut body = first.to_be_bytes().to_vec();
        body.extend(second.to_be_bytes());
        self.entry(tag, &body, 1)
    }

    pub fn method_handle(&mut self, kind: u8, reference: u16) -> u16 {
        let mut body = vec![kind];
        body.extend(reference.to_be_bytes());
        self.entry(15, &body, 1)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.entry(7, &name_index.to_be_bytes(), 1)
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let string_index = self.utf8(s);
        self.entry(8, &string_index.to_be_bytes(), 1)
    }
}

pub(crate) fn attribute(name_index: u16, body: &[u8]) -> Vec<u8> {
    let mut v = name_index.to_be_bytes().to_vec();
    v.extend((body.len() as u32).to_be_bytes());
    v.extend_from_slice(body);
    v
}

fn counted(items: &[Vec<u8>]) -> Vec<u8> {
    let mut v = (items.len() as u16).to_be_bytes().to_vec();
    for item in items {
        v.extend_from_slice(item);
    }
    v
}

/// Body of a `Code` attribute without exception table or attributes.
pub(crate) fn code_body(max_stack: u16, max_locals: u16, code: &[u8]) -> Vec<u8> {
    full_code_body(max_stack, max_locals, code, &[], &[])
}

/// Body of a `Code` attribute; handlers are (start, end, handler, catch_type).
pub(crate) fn full_code_body(
    max_stack: u16,
    max_locals: u16,
    code: &[u8],
    handlers: &[[u16; 4]],
    attributes: &[Vec<u8>],
) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend(max_stack.to_be_bytes());
    v.extend(max_locals.to_be_bytes());
    v.extend((code.len() as u32).to_be_bytes());
    v.extend_from_slice(code);
    v.extend(u2s(&[handlers.len() as u16]));
    for handler in handlers {
        v.extend(u2s(handler));
    }
    v.extend(counted(attributes));
    v
}

/// Big-endian u2 sequence, the shape of most attribute bodies.
pub(crate) fn u2s(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub(crate) fn member(flags: u16, name_index: u16, desc_index: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend(flags.to_be_bytes());
    v.extend(name_index.to_be_bytes());
    v.extend(desc_index.to_be_bytes());
    v.extend(counted(attributes));
    v
}

pub(crate) fn class_file(
    pool: &Pool,
    this_class: u16,
    super_class: u16,
    fields: &[Vec<u8>],
    methods: &[Vec<u8>],
    attributes: &[Vec<u8>],
) -> Vec<u8> {
    let mut v = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34];
    v.extend(pool.count().to_be_bytes());
    v.extend_from_slice(&pool.bytes);
    v.extend(0x0021u16.to_be_bytes());
    v.extend(this_class.to_be_bytes());
    v.extend(super_class.to_be_bytes());
    v.extend(0u16.to_be_bytes());
    v.extend(counted(fields));
    v.extend(counted(methods));
    v.extend(counted(attributes));
    v
}

/// A dex image with string, type, proto, field, method and class tables
/// laid out after the header, string data and type lists at the end.
pub(crate) struct Dex {
    pub strings: Vec<&'static str>,
    /// string index per type
    pub types: Vec<u32>,
    /// (shorty, return type, parameter types)
    pub protos: Vec<(u32, u32, Vec<u16>)>,
    /// (class, type, name)
    pub fields: Vec<(u16, u16, u32)>,
    /// (class, proto, name)
    pub methods: Vec<(u16, u16, u32)>,
    /// (class, flags, superclass, source file)
    pub classes: Vec<(u32, u32, u32, u32)>,
}

fn put_u4(v: &mut Vec<u8>, at: usize, value: u32) {
    v[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

impl Dex {
    pub fn build(&self) -> Vec<u8> {
        let mut v = vec![0u8; 0x70];
        v[..8].copy_from_slice(b"dex\n035\0");
        put_u4(&mut v, 0x24, 0x70);
        put_u4(&mut v, 0x28, 0x1234_5678);

        let string_ids_off = v.len();
        v.resize(v.len() + 4 * self.strings.len(), 0);
        let type_ids_off = v.len();
        for t in &self.types {
            v.extend(t.to_le_bytes());
        }
        let proto_ids_off = v.len();
        v.resize(v.len() + 12 * self.protos.len(), 0);
        let field_ids_off = v.len();
        for (class, ty, name) in &self.fields {
            v.extend(class.to_le_bytes());
            v.extend(ty.to_le_bytes());
            v.extend(name.to_le_bytes());
        }
        let method_ids_off = v.len();
        for (class, proto, name) in &self.methods {
            v.extend(class.to_le_bytes());
            v.extend(proto.to_le_bytes());
            v.extend(name.to_le_bytes());
        }
        let class_defs_off = v.len();
        for (class, flags, superclass, source) in &self.classes {
            for value in [*class, *flags, *superclass, 0, *source, 0, 0, 0] {
                v.extend(value.to_le_bytes());
            }
        }

        for (i, s) in self.strings.iter().enumerate() {
            let at = v.len() as u32;
            put_u4(&mut v, string_ids_off + 4 * i, at);
            // short strings only: the utf16 size fits one uleb128 byte
            v.push(s.encode_utf16().count() as u8);
            v.extend_from_slice(s.as_bytes());
            v.push(0);
        }
        for (i, (shorty, ret, params)) in self.protos.iter().enumerate() {
            let base = proto_ids_off + 12 * i;
            put_u4(&mut v, base, *shorty);
            put_u4(&mut v, base + 4, *ret);
            if !params.is_empty() {
                while v.len() % 4 != 0 {
                    v.push(0);
                }
                let at = v.len() as u32;
                put_u4(&mut v, base + 8, at);
                v.extend((params.len() as u32).to_le_bytes());
                for p in params {
                    v.extend(p.to_le_bytes());
                }
            }
        }

        while v.len() % 4 != 0 {
            v.push(0);
        }
        let map_off = v.len();
        let items: [(u16, usize, usize); 2] = [(0x0000, 1, 0), (0x0001, self.strings.len(), string_ids_off)];
        v.extend((items.len() as u32).to_le_bytes());
        for (ty, size, off) in items {
            v.extend(ty.to_le_bytes());
            v.extend(0u16.to_le_bytes());
            v.extend((size as u32).to_le_bytes());
            v.extend((off as u32).to_le_bytes());
        }

        let table = [
            (self.strings.len(), string_ids_off),
            (self.types.len(), type_ids_off),
            (self.protos.len(), proto_ids_off),
            (self.fields.len(), field_ids_off),
            (self.methods.len(), method_ids_off),
            (self.classes.len(), class_defs_off),
        ];
        put_u4(&mut v, 0x34, map_off as u32);
        for (i, (size, off)) in table.iter().enumerate() {
            put_u4(&mut v, 0x38 + 8 * i, *size as u32);
            put_u4(&mut v, 0x3c + 8 * i, *off as u32);
        }
        let file_size = v.len() as u32;
        put_u4(&mut v, 0x20, file_size);
        v
    }
}

/// Little-endian Lua 5.3 chunk writer with the stock 64-bit layout.
pub(crate) struct Luac {
    pub bytes: Vec<u8>,
}

impl Luac {
    pub fn new() -> Self {
        let mut bytes = b"\x1bLua\x53\x00\x19\x93\r\n\x1a\n".to_vec();
        bytes.extend([4, 8, 4, 8, 8]);
        bytes.extend(0x5678i64.to_le_bytes());
        bytes.extend(370.5f64.to_le_bytes());
        Luac { bytes }
    }

    pub fn byte(&mut self, b: u8) -> &mut Self {
        self.bytes.push(b);
        self
    }

    pub fn int(&mut self, v: i32) -> &mut Self {
        self.bytes.extend(v.to_le_bytes());
        self
    }

    pub fn integer(&mut self, v: i64) -> &mut Self {
        self.bytes.extend(v.to_le_bytes());
        self
    }

    pub fn number(&mut self, v: f64) -> &mut Self {
        self.bytes.extend(v.to_le_bytes());
        self
    }

    pub fn string(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            None => self.bytes.push(0),
            Some(s) => {
                self.bytes.push(s.len() as u8 + 1);
                self.bytes.extend_from_slice(s.as_bytes());
            }
        }
        self
    }

    pub fn code(&mut self, code: &[u32]) -> &mut Self {
        self.int(code.len() as i32);
        for c in code {
            self.bytes.extend(c.to_le_bytes());
        }
        self
    }

    /// Function header up to and including `maxstacksize`.
    pub fn function(&mut self, source: Option<&str>, line: i32, last_line: i32) -> &mut Self {
        self.string(source).int(line).int(last_line).byte(0).byte(2).byte(4)
    }
}

pub(crate) fn abc(op: u32, a: u32, b: u32, c: u32) -> u32 {
    op | a << 6 | c << 14 | b << 23
}

pub(crate) fn abx(op: u32, a: u32, bx: u32) -> u32 {
    op | a << 6 | bx << 14
}

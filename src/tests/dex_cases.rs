use crate::dex::dex_file::NO_INDEX;
use crate::tests::builders::Dex;
use crate::{decode, ErrorKind, Format};

/// `public class Foo extends Object { int count; void run(int) }`
fn foo() -> Dex {
    Dex {
        strings: vec!["I", "LFoo;", "Ljava/lang/Object;", "V", "VI", "count", "run", "Foo.java"],
        types: vec![0, 1, 2, 3],
        protos: vec![(4, 3, vec![0])],
        fields: vec![(1, 0, 5)],
        methods: vec![(1, 0, 6)],
        classes: vec![(1, 0x0001, 2, 7)],
    }
}

#[test]
fn ids_resolve_across_tables() {
    let bytes = foo().build();
    let root = decode(Format::Dex, &bytes).unwrap();
    assert_eq!(root.name(), "DexFile");
    assert_eq!(root.byte_range(), (0, bytes.len()));
    assert_eq!(root.path(&["header", "endian_tag"]).unwrap().description(), "0x12345678");

    assert_eq!(root.path(&["string_ids", "[6]"]).unwrap().description(), "run");
    assert_eq!(root.path(&["type_ids", "[1]"]).unwrap().description(), "Foo");
    assert_eq!(root.path(&["type_ids", "[1]", "descriptor_idx"]).unwrap().description(), "#1 -> LFoo;");

    let proto = root.path(&["proto_ids", "[0]"]).unwrap();
    assert_eq!(proto.description(), "(int) void");
    assert_eq!(proto.child("parameters").unwrap().description(), "int");

    assert_eq!(root.path(&["field_ids", "[0]"]).unwrap().description(), "Foo.count: int");
    let method = root.path(&["method_ids", "[0]"]).unwrap();
    assert_eq!(method.description(), "Foo.run(int) void");
    // u2 class, u2 proto, u4 name
    let widths: Vec<usize> = method.children().iter().map(|c| c.byte_range().1).collect();
    assert_eq!(widths, [2, 2, 4]);
    assert_eq!(method.child("proto_idx").unwrap().description(), "#0 -> (int) void");

    let class = root.path(&["class_defs", "[0]"]).unwrap();
    assert_eq!(class.description(), "Foo");
    assert_eq!(class.child("access_flags").unwrap().description(), "0x0001 [public]");
    assert_eq!(class.child("superclass_idx").unwrap().description(), "#2 -> java.lang.Object");
    assert_eq!(class.child("source_file_idx").unwrap().description(), "#7 -> Foo.java");
}

#[test]
fn string_data_is_read_at_its_offset() {
    let bytes = foo().build();
    let root = decode(Format::Dex, &bytes).unwrap();
    let id = root.path(&["string_ids", "[5]"]).unwrap();
    let data = id.child("string_data").unwrap();
    // the data lives after the tables, outside the id record
    assert_eq!(id.byte_range().1, 4);
    assert!(data.byte_range().0 >= id.byte_range().0 + 4);
    assert_eq!(data.child("utf16_size").unwrap().description(), "5");
    assert_eq!(data.child("data").unwrap().description(), "count");
}

#[test]
fn no_index_renders_as_none() {
    let mut dex = foo();
    dex.classes[0].2 = NO_INDEX;
    dex.classes[0].3 = NO_INDEX;
    let root = decode(Format::Dex, &dex.build()).unwrap();
    let class = root.path(&["class_defs", "[0]"]).unwrap();
    assert_eq!(class.child("superclass_idx").unwrap().description(), "none");
    assert_eq!(class.child("source_file_idx").unwrap().description(), "none");
}

#[test]
fn malformed_string_data_fails() {
    let mut bytes = foo().build();
    let at = bytes.windows(6).position(|w| w == b"count\0").unwrap();
    bytes[at + 1] = 0xff;
    let e = decode(Format::Dex, &bytes).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::MalformedString);
    assert_eq!(e.offset(), at);
}

#[test]
fn map_list_names_item_types() {
    let root = decode(Format::Dex, &foo().build()).unwrap();
    let map = root.child("map_list").unwrap();
    assert_eq!(map.child("size").unwrap().description(), "2");
    assert_eq!(map.child("[1]").unwrap().description(), "string_id_item x 8 at 0x70");
}

#[test]
fn dangling_ids_fail() {
    let mut dex = foo();
    dex.fields[0].1 = 9;
    let e = decode(Format::Dex, &dex.build()).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::InvalidConstantReference);
    assert!(e.contexts().iter().any(|c| c == "field_ids"));
}

#[test]
fn rejects_other_magic() {
    let mut bytes = foo().build();
    bytes[..4].copy_from_slice(b"dey\n");
    assert_eq!(decode(Format::Dex, &bytes).unwrap_err().kind(), ErrorKind::BadMagic);
}

#[test]
fn reverse_endian_is_unsupported() {
    let mut bytes = foo().build();
    bytes[0x28..0x2c].copy_from_slice(&0x7856_3412u32.to_le_bytes());
    let e = decode(Format::Dex, &bytes).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::UnsupportedLayout);
    assert_eq!(e.offset(), 0x28);
}

#[test]
fn truncated_dex_fails() {
    let bytes = foo().build();
    let e = decode(Format::Dex, &bytes[..0x90]).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::UnexpectedEndOfBuffer);
    assert_eq!(e.contexts().last().map(String::as_str), Some("dex file"));
}

mod builders;
mod dex_cases;

#[cfg(test)]
mod tests {
    use crate::tests::builders::{class_file, Pool};
    use crate::{decode, Component, DecodeError, ErrorKind, Format};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn trees_and_errors_cross_threads() {
        assert_send_sync::<Component>();
        assert_send_sync::<DecodeError>();
    }

    #[test]
    fn format_is_chosen_by_the_caller() {
        let mut pool = Pool::new();
        let this_class = pool.class("A");
        let bytes = class_file(&pool, this_class, 0, &[], &[], &[]);

        assert!(decode(Format::Class, &bytes).is_ok());
        assert_eq!(decode(Format::Dex, &bytes).unwrap_err().kind(), ErrorKind::BadMagic);
        assert_eq!(decode(Format::Luac, &bytes).unwrap_err().kind(), ErrorKind::BadMagic);
    }

    #[test]
    fn tree_renders_and_walks() {
        let mut pool = Pool::new();
        let this_class = pool.class("A");
        let bytes = class_file(&pool, this_class, 0, &[], &[], &[]);
        let root = decode(Format::Class, &bytes).unwrap();

        let text = root.to_string();
        assert!(text.starts_with("ClassFile: A\n  magic: 0xcafebabe\n"));
        let leaves: usize = root.walk().filter(|c| c.is_leaf()).map(|c| c.byte_range().1).sum();
        // every byte of this file belongs to exactly one leaf
        assert_eq!(leaves, bytes.len());
    }
}

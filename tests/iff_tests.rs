use imgteka::error::ErrorKind;
use imgteka::iff::Directory;
use imgteka::io::{ByteWindow, MemoryReader};
use proptest::prelude::*;
use std::io::Read;

fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0xEE);
    }
    out
}

fn form(sub: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = b"FORM".to_vec();
    out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
    out.extend_from_slice(sub);
    out.extend_from_slice(body);
    out
}

#[test]
fn test_nested_directory() {
    let inner = form(b"PICS", &chunk(b"PNG ", b"abc"));
    let mut body = chunk(b"AUTH", b"someone");
    body.extend(inner);
    body.extend(chunk(b"ANNO", b""));
    let source = MemoryReader::new(form(b"TEST", &body));

    let root = Directory::open_root(ByteWindow::whole(&source)).unwrap();
    assert_eq!(&root.sub_kind(), b"TEST");
    let mut it = root.begin().unwrap();
    assert_eq!(&it.kind(), b"AUTH");
    assert!(!it.is_directory());
    it.advance().unwrap();
    assert!(it.is_directory());
    assert_eq!(it.index(), 1);

    let nested = it.directory().unwrap();
    assert_eq!(&nested.sub_kind(), b"PICS");
    let leaf = nested.begin().unwrap();
    let mut data = Vec::new();
    leaf.file_reader().unwrap().read_to_end(&mut data).unwrap();
    assert_eq!(data, b"abc");

    it.advance().unwrap();
    assert_eq!(&it.kind(), b"ANNO");
    assert!(it.is_empty());
    it.advance().unwrap();
    assert!(it.is_end());
}

#[test]
fn test_unknown_group_tag() {
    let mut data = form(b"TEST", &[]);
    data[..4].copy_from_slice(b"BLOB");
    let source = MemoryReader::new(data);
    let err = Directory::open_root(ByteWindow::whole(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[test]
fn test_negative_length() {
    let mut data = form(b"TEST", &[]);
    data[4..8].copy_from_slice(&(-8i32).to_be_bytes());
    let source = MemoryReader::new(data);
    let err = Directory::open_root(ByteWindow::whole(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}

#[test]
fn test_child_overrunning_directory() {
    let mut body = chunk(b"DATA", &[1, 2, 3, 4]);
    body[4..8].copy_from_slice(&100u32.to_be_bytes());
    let source = MemoryReader::new(form(b"TEST", &body));
    let root = Directory::open_root(ByteWindow::whole(&source)).unwrap();
    assert_eq!(root.begin().unwrap_err().kind(), ErrorKind::MalformedContainer);
}

#[test]
fn test_empty_directory_starts_at_end() {
    let source = MemoryReader::new(form(b"TEST", &[]));
    let root = Directory::open_root(ByteWindow::whole(&source)).unwrap();
    assert!(root.begin().unwrap().is_end());
}

proptest! {
    #[test]
    fn every_sibling_visited_once_in_order(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 0..12)
    ) {
        let mut body = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            let tag = [b'C', b'K', b'0' + (i / 10) as u8, b'0' + (i % 10) as u8];
            body.extend(chunk(&tag, payload));
        }
        let source = MemoryReader::new(form(b"PROP", &body));
        let root = Directory::open_root(ByteWindow::whole(&source)).unwrap();

        let mut it = root.begin().unwrap();
        let mut seen = 0;
        while !it.is_end() {
            prop_assert_eq!(it.index(), seen);
            prop_assert_eq!(it.len(), payloads[seen].len() as u64);
            let mut data = Vec::new();
            it.file_reader().unwrap().read_to_end(&mut data).unwrap();
            prop_assert_eq!(&data, &payloads[seen]);
            it.advance().unwrap();
            seen += 1;
        }
        prop_assert_eq!(seen, payloads.len());
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let source = MemoryReader::new(data);
        if let Ok(root) = Directory::open_root(ByteWindow::whole(&source)) {
            if let Ok(mut it) = root.begin() {
                while !it.is_end() {
                    if it.advance().is_err() {
                        break;
                    }
                }
            }
        }
    }
}

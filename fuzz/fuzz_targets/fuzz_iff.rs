#![no_main]

use imgteka::iff::Directory;
use imgteka::io::{ByteWindow, MemoryReader};
use libfuzzer_sys::fuzz_target;
use std::io::Read;

fn walk(dir: Directory<'_>, depth: usize) {
    let Ok(mut it) = dir.begin() else {
        return;
    };
    while !it.is_end() {
        if it.is_directory() && depth < 8 {
            if let Ok(nested) = it.directory() {
                walk(nested, depth + 1);
            }
        } else if let Ok(mut reader) = it.file_reader() {
            let _ = reader.read_to_end(&mut Vec::new());
        }
        if it.advance().is_err() {
            break;
        }
    }
}

fuzz_target!(|data: &[u8]| {
    let source = MemoryReader::new(data.to_vec());
    if let Ok(root) = Directory::open_root(ByteWindow::whole(&source)) {
        walk(root, 0);
    }
});

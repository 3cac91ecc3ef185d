#![no_main]

use imgteka::io::MemoryReader;
use imgteka::{metadata, registry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let source = MemoryReader::new(data.to_vec());
    for id in registry::all_ids() {
        let file_type = id.file_type();
        if let Ok(record) = file_type.extract_from(&source) {
            let blob = metadata::encode(&record).expect("records always encode");
            assert_eq!(file_type.render(&blob), record.to_pairs());
        }
        if file_type.is_image() {
            if let Ok(picture) = file_type.image_from(&source) {
                let (w, h) = picture.dimensions();
                if u64::from(w) * u64::from(h) <= 1 << 20 {
                    let _ = picture.to_rgba16();
                }
            }
        }
    }
});

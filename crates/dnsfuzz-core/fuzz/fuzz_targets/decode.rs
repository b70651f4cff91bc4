#![no_main]
use libfuzzer_sys::fuzz_target;
extern crate dnsfuzz;
use dnsfuzz::dns::parse;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = parse::PktParser::new(data).get_query() {
        assert_eq!(msg.questions.len(), msg.header.qdcount as usize);
        for q in &msg.questions {
            assert!(q.qdomain.wire_len() <= parse::MAX_NAME_LEN);
        }
    }
    let _ = parse::describe(data);
    let _ = parse::compression_pointers(data);
});

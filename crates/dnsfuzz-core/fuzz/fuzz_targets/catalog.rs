#![no_main]
use libfuzzer_sys::fuzz_target;
extern crate dnsfuzz;
use dnsfuzz::mutate::Strategy;

fuzz_target!(|input: (u8, u64)| {
    let (which, seed) = input;
    let strategy = Strategy::ALL[which as usize % Strategy::ALL.len()];
    let payload = strategy.generate(seed);
    assert_eq!(payload, strategy.generate(seed));
    assert!(payload.len() <= dnsfuzz_net::MAX_UDP_PAYLOAD);
    let _ = dnsfuzz::dns::parse::describe(&payload);
});


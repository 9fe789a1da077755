#![no_main]

use libfuzzer_sys::fuzz_target;
use ovaleval_subst::{Benchmark, PlainText};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let benchmark = Benchmark {
            id: "fuzz".into(),
            plain_texts: vec![PlainText {
                id: "NOTE1".into(),
                text: "Contact admin".into(),
            }],
            ..Default::default()
        };
        if let Some(policy) = benchmark.policy(None) {
            let _ = ovaleval_subst::substitute(text, &policy);
        }
    }
});

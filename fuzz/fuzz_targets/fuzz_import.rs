#![no_main]

use libfuzzer_sys::fuzz_target;
use ovaleval_domain::ResultsModel;
use ovaleval_types::DefinitionCatalog;

fuzz_target!(|data: &[u8]| {
    let Ok(mut model) = ResultsModel::new(DefinitionCatalog::default(), []) else {
        return;
    };
    if model.import(data).is_ok() {
        let _ = model.eval();
    }
});

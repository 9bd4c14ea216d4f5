#![no_main]
use dbits::DynamicBitVector;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<u16>| {
    let mut v = DynamicBitVector::new(8192).unwrap();
    let mut model: Vec<bool> = Vec::new();

    for op in ops {
        let bit = op & 1 == 1;
        let is_set = op >> 1 & 1 == 1;
        let pos = (op >> 2) as usize;
        if is_set && !model.is_empty() {
            let at = pos % model.len();
            v.set(at, bit).unwrap();
            model[at] = bit;
        } else {
            if model.len() == 8192 {
                continue;
            }
            let at = pos % (model.len() + 1);
            v.insert(at, bit).unwrap();
            model.insert(at, bit);
        }
    }

    v.validate().unwrap();
    assert_eq!(v.len(), model.len());
    assert_eq!(v.count_ones(), model.iter().filter(|&&b| b).count());
    for (i, &b) in model.iter().enumerate() {
        assert_eq!(v.get(i).unwrap(), b, "bit {i} diverged from the model");
    }
});

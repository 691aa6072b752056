#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Exercise the payload decoder under varying lengths
    let _ = auriga::can::unpack_floats(data);

    // Frame construction must reject oversized payloads, never panic
    if let Ok(frame) = auriga::can::CanFrame::new(0x183, data.to_vec(), 0.0) {
        let _ = frame.validate();
        let _ = auriga::can::unpack_floats(&frame.data);
    }

    // Round-trip whatever fits through the packer
    let floats = auriga::can::unpack_floats(data);
    let packed = auriga::can::pack_floats(&floats);
    assert!(packed.len() <= 8);
});

use super::*;

#[test]
fn unorm_quantization_rounds_and_clamps() {
    assert_eq!(unorm_to_u8(-1.0), 0);
    assert_eq!(unorm_to_u8(0.0), 0);
    assert_eq!(unorm_to_u8(0.5), 128);
    assert_eq!(unorm_to_u8(1.0), 255);
    assert_eq!(unorm_to_u8(2.0), 255);
}

#[test]
fn unorm_quantization_maps_nan_to_zero() {
    assert_eq!(unorm_to_u8(f32::NAN), 0);
}

use super::*;

use std::io::Cursor;

#[test]
fn header_layout_is_three_little_endian_words() {
    let h = FrameHeader {
        render_micros: 1,
        encode_micros: 0x0203,
        image_len: 5,
    };
    let b = h.to_bytes();
    assert_eq!(&b[0..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(&b[8..16], &[3, 2, 0, 0, 0, 0, 0, 0]);
    assert_eq!(&b[16..24], &[5, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(FrameHeader::from_bytes(b), h);
}

#[test]
fn response_is_header_plus_exact_payload() {
    let mut out = Vec::new();
    let h = write_response(
        &mut out,
        Duration::from_micros(1500),
        Duration::from_millis(2),
        b"abc",
    )
    .unwrap();
    assert_eq!(out.len(), HEADER_LEN + 3);
    assert_eq!(h.render_micros, 1500);
    assert_eq!(h.encode_micros, 2000);
    assert_eq!(&out[HEADER_LEN..], b"abc");

    write_response(&mut out, Duration::ZERO, Duration::ZERO, b"").unwrap();
    let mut r = Cursor::new(out);
    let first = read_response(&mut r).unwrap().unwrap();
    assert_eq!(first.image, b"abc");
    assert_eq!(first.header, h);
    let second = read_response(&mut r).unwrap().unwrap();
    assert!(second.image.is_empty());
    assert!(read_response(&mut r).unwrap().is_none());
}

#[test]
fn short_frames_are_truncation_errors() {
    let mut r = Cursor::new(vec![0u8; 10]);
    assert!(matches!(
        read_response(&mut r),
        Err(VolserveError::Truncated(_))
    ));

    let mut bytes = FrameHeader {
        image_len: 8,
        ..Default::default()
    }
    .to_bytes()
    .to_vec();
    bytes.extend_from_slice(b"1234");
    assert!(matches!(
        read_response(&mut Cursor::new(bytes)),
        Err(VolserveError::Truncated(_))
    ));
}

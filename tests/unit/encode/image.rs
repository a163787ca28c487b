use super::*;

use std::io::Cursor;

fn gradient(w: u32, h: u32) -> Vec<u8> {
    let mut px = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            px.extend_from_slice(&[(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 77, 255]);
        }
    }
    px
}

#[test]
fn buffer_doubles_until_the_chunk_fits() {
    let mut b = GrowableBuffer::new();
    assert!(b.capacity() >= MIN_CAPACITY);
    b.write_all(&[1u8; 1000]).unwrap();
    assert_eq!(b.reallocations(), 0);

    b.write_all(&[2u8; 5000]).unwrap();
    assert_eq!(b.reallocations(), 1);
    assert!(b.capacity() >= 8192);
    assert_eq!(b.len(), 6000);
    assert_eq!(b.as_slice()[999], 1);
    assert_eq!(b.as_slice()[1000], 2);

    let cap = b.capacity();
    b.clear();
    assert!(b.is_empty());
    assert_eq!(b.capacity(), cap);
}

#[test]
fn png_round_trips_exactly() {
    let mut enc = ImageEncoder::new(ImageFormat::Png);
    let px = gradient(13, 7);
    let n = enc.encode(&px, 13, 7).unwrap();
    assert_eq!(n, enc.bytes().len());

    let img = image::load_from_memory(enc.bytes()).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (13, 7));
    assert_eq!(img.as_raw(), &px);
}

#[test]
fn growing_frames_reallocate_without_corruption() {
    let mut enc = ImageEncoder::new(ImageFormat::default());
    for size in [4u32, 32, 128, 256] {
        let n = enc.encode(&gradient(size, size), size, size).unwrap();
        let bytes = enc.bytes().to_vec();
        assert_eq!(bytes.len(), n);
        let decoded = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (size, size));
    }
    assert!(enc.buffer().reallocations() >= 1);
}

#[test]
fn wrong_buffer_size_is_an_encode_error() {
    let mut enc = ImageEncoder::new(ImageFormat::Png);
    let err = enc.encode(&[0u8; 15], 2, 2).unwrap_err();
    assert!(matches!(err, VolserveError::Encode(_)));
}

#[test]
fn jpeg_quality_is_validated() {
    assert!(ImageFormat::jpeg(0).is_err());
    assert_eq!(ImageFormat::jpeg(80).unwrap(), ImageFormat::Jpeg { quality: 80 });
}

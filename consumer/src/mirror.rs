use hand_relay_common::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::imageops;
use image::ImageReader;
use std::io::Cursor;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read frame: {0}")]
    Read(#[from] std::io::Error),
}

/// Flip a frame horizontally so the preview behaves like a mirror and the
/// classifier's left/right refer to the viewer's own hands.
pub fn mirror_frame(frame: Frame) -> Result<Frame, MirrorError> {
    let img = ImageReader::new(Cursor::new(frame.jpeg_data()))
        .with_guessed_format()?
        .decode()?;

    let flipped = imageops::flip_horizontal(&img.to_rgb8());

    let mut out = Vec::with_capacity(frame.payload_size());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&flipped)?;
    Ok(frame.with_jpeg(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn jpeg_with_bright_left_half() -> Vec<u8> {
        let img = RgbImage::from_fn(32, 16, |x, _| {
            if x < 16 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .unwrap();
        out
    }

    fn luma_at(jpeg: &[u8], x: u32, y: u32) -> u8 {
        image::load_from_memory(jpeg).unwrap().to_luma8().get_pixel(x, y).0[0]
    }

    #[test]
    fn flips_left_and_right() {
        let frame = Frame::new(jpeg_with_bright_left_half(), 1708300000000, 5);
        assert!(luma_at(frame.jpeg_data(), 2, 8) > 200);

        let mirrored = mirror_frame(frame).unwrap();
        assert_eq!(mirrored.seq, 5);
        assert_eq!(mirrored.captured_at_ms, 1708300000000);
        assert!(luma_at(mirrored.jpeg_data(), 2, 8) < 50);
        assert!(luma_at(mirrored.jpeg_data(), 29, 8) > 200);
    }

    #[test]
    fn garbage_is_rejected() {
        let frame = Frame::new(vec![0x00, 0x01, 0x02], 0, 0);
        assert!(mirror_frame(frame).is_err());
    }
}

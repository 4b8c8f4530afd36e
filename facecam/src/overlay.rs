//! Draw detections onto frames.
//!
//! The painter mirrors what the browser pages draw onto their overlay canvas: boxes with
//! scores, landmark contours, expression labels at the bottom-left corner of each box and an
//! age/gender text field at its bottom-right corner.
use std::{io::Cursor, path::Path};

use anyhow::{Context, Result};
use bytes::Bytes;
use common::detection::{FaceDetection, Point};
use image::{codecs::jpeg::JpegEncoder, ColorType, Rgb, RgbImage};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut,
        draw_line_segment_mut, draw_text_mut,
    },
    rect::Rect,
};
use lazy_static::lazy_static;
use rusttype::{Font, Scale};

/// Expressions at or below this probability are not drawn.
pub const MIN_EXPRESSION_PROBABILITY: f32 = 0.1;

const FONT_CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\consola.ttf",
];

lazy_static! {
    static ref SYSTEM_FONT: Option<Font<'static>> = {
        let font = FONT_CANDIDATES
            .iter()
            .find_map(|path| load_font(Path::new(path)).ok());
        if font.is_none() {
            log::warn!("No system font found, overlays are drawn without text");
        }
        font
    };
}

/// Load a TrueType font from disk.
pub fn load_font(path: &Path) -> Result<Font<'static>> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Font::try_from_vec(data).with_context(|| format!("invalid font file {}", path.display()))
}

#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub box_color: Rgb<u8>,
    pub landmark_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub text_background: Rgb<u8>,
    pub font_size: f32,
    pub line_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: Rgb([0, 0, 255]),
            landmark_color: Rgb([0, 255, 0]),
            text_color: Rgb([255, 255, 255]),
            text_background: Rgb([32, 32, 32]),
            font_size: 16.0,
            line_width: 2,
        }
    }
}

pub struct Painter {
    font: Option<Font<'static>>,
    style: OverlayStyle,
}

impl Painter {
    pub fn new(font: Option<Font<'static>>, style: OverlayStyle) -> Self {
        Self { font, style }
    }

    /// Painter with the configured font, or the first system font found.
    pub fn from_font_path(path: Option<&Path>) -> Result<Self> {
        let font = match path {
            Some(path) => Some(load_font(path)?),
            None => SYSTEM_FONT.clone(),
        };
        Ok(Self::new(font, OverlayStyle::default()))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw everything known about the faces.
    pub fn draw_all(&self, frame: &mut RgbImage, faces: &[FaceDetection]) {
        self.draw_detections(frame, faces);
        self.draw_face_landmarks(frame, faces);
        self.draw_face_expressions(frame, faces, MIN_EXPRESSION_PROBABILITY);
        self.draw_age_and_gender(frame, faces);
    }

    /// Draw bounding boxes with confidence scores.
    pub fn draw_detections(&self, frame: &mut RgbImage, faces: &[FaceDetection]) {
        for face in faces {
            let bbox = &face.bbox;
            for offset in 0..self.style.line_width {
                let offset = offset as f32;
                let width = (bbox.width - 2.0 * offset).max(1.0);
                let height = (bbox.height - 2.0 * offset).max(1.0);
                let rect = Rect::at((bbox.x + offset) as i32, (bbox.y + offset) as i32)
                    .of_size(width as u32, height as u32);
                draw_hollow_rect_mut(frame, rect, self.style.box_color);
            }

            let label_anchor = Point::new(bbox.x, bbox.y - self.line_height());
            self.draw_text_field(frame, &[face.score_label()], label_anchor, self.style.box_color);
        }
    }

    /// Draw the landmark contours and points.
    pub fn draw_face_landmarks(&self, frame: &mut RgbImage, faces: &[FaceDetection]) {
        let color = self.style.landmark_color;
        for landmarks in faces.iter().filter_map(|face| face.landmarks.as_ref()) {
            for (contour, closed) in landmarks.contours() {
                for segment in contour.windows(2) {
                    draw_line_segment_mut(
                        frame,
                        (segment[0].x, segment[0].y),
                        (segment[1].x, segment[1].y),
                        color,
                    );
                }
                if let (true, Some(first), Some(last)) = (closed, contour.first(), contour.last()) {
                    draw_line_segment_mut(frame, (last.x, last.y), (first.x, first.y), color);
                }
            }

            for point in landmarks.points.iter() {
                draw_filled_circle_mut(frame, (point.x as i32, point.y as i32), 1, color);
            }
        }
    }

    /// Draw expression labels below the box, most probable first.
    pub fn draw_face_expressions(
        &self,
        frame: &mut RgbImage,
        faces: &[FaceDetection],
        min_probability: f32,
    ) {
        for face in faces {
            let labels = face.expression_labels(min_probability);
            if !labels.is_empty() {
                self.draw_text_field(
                    frame,
                    &labels,
                    face.bbox.bottom_left(),
                    self.style.text_background,
                );
            }
        }
    }

    /// Draw the age and gender text field at the bottom-right corner of the box.
    pub fn draw_age_and_gender(&self, frame: &mut RgbImage, faces: &[FaceDetection]) {
        for face in faces {
            if let Some(label) = face.age_gender_label() {
                self.draw_text_field(
                    frame,
                    &[label],
                    face.bbox.bottom_right(),
                    self.style.text_background,
                );
            }
        }
    }

    fn line_height(&self) -> f32 {
        self.style.font_size + 4.0
    }

    /// Draw lines of text on a filled background with the top-left corner at `anchor`.
    fn draw_text_field(
        &self,
        frame: &mut RgbImage,
        lines: &[String],
        anchor: Point,
        background: Rgb<u8>,
    ) {
        let font = match &self.font {
            Some(font) => font,
            None => return,
        };
        let scale = Scale::uniform(self.style.font_size);
        let padding = 2.0;

        let width = lines
            .iter()
            .map(|line| text_width(font, scale, line))
            .fold(0.0, f32::max)
            + 2.0 * padding;
        let height = lines.len() as f32 * self.line_height();

        // Keep the field inside the frame where possible
        let x = anchor.x.min(frame.width() as f32 - width).max(0.0);
        let y = anchor.y.min(frame.height() as f32 - height).max(0.0);

        draw_filled_rect_mut(
            frame,
            Rect::at(x as i32, y as i32).of_size(width.max(1.0) as u32, height.max(1.0) as u32),
            background,
        );

        for (index, line) in lines.iter().enumerate() {
            draw_text_mut(
                frame,
                self.style.text_color,
                (x + padding) as i32,
                (y + padding + index as f32 * self.line_height()) as i32,
                scale,
                font,
                line,
            );
        }
    }
}

fn text_width(font: &Font<'_>, scale: Scale, text: &str) -> f32 {
    font.layout(text, scale, rusttype::point(0.0, 0.0))
        .last()
        .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        frame,
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;

    Ok(buf.into_inner())
}

/// Wrap a JPEG image into one part of a `multipart/x-mixed-replace; boundary=frame` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use common::detection::{FaceBox, FaceLandmarks, Gender};

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn painter_without_font() -> Painter {
        Painter::new(None, OverlayStyle::default())
    }

    #[test]
    fn test_draw_box() {
        let painter = painter_without_font();
        let mut frame = RgbImage::new(64, 64);
        let faces = vec![FaceDetection::new(0.9, FaceBox::new(10.0, 10.0, 20.0, 20.0))];

        painter.draw_detections(&mut frame, &faces);

        let style = OverlayStyle::default();
        assert_eq!(frame.get_pixel(10, 15), &style.box_color);
        assert_eq!(frame.get_pixel(11, 15), &style.box_color);
        assert_eq!(frame.get_pixel(29, 20), &style.box_color);
        assert_eq!(frame.get_pixel(20, 20), &BLACK);
        assert_eq!(frame.get_pixel(5, 5), &BLACK);
    }

    #[test]
    fn test_draw_landmarks() {
        let painter = painter_without_font();
        let mut frame = RgbImage::new(64, 64);
        let mut face = FaceDetection::new(0.9, FaceBox::new(0.0, 0.0, 60.0, 60.0));
        face.landmarks = Some(FaceLandmarks::new(
            (0..FaceLandmarks::NUM_POINTS)
                .map(|i| Point::new(5.0 + (i % 10) as f32 * 5.0, 5.0 + (i / 10) as f32 * 5.0))
                .collect(),
        ));

        painter.draw_face_landmarks(&mut frame, &[face]);

        let color = OverlayStyle::default().landmark_color;
        assert_eq!(frame.get_pixel(5, 5), &color);
        assert_eq!(frame.get_pixel(40, 35), &color);
        assert_eq!(frame.get_pixel(62, 62), &BLACK);
    }

    #[test]
    fn test_text_is_skipped_without_font() {
        let painter = painter_without_font();
        let mut frame = RgbImage::new(64, 64);
        let mut face = FaceDetection::new(0.9, FaceBox::new(10.0, 10.0, 20.0, 20.0));
        face.age = Some(40.0);
        face.gender = Some(Gender::Female);
        face.gender_probability = Some(0.9);

        painter.draw_age_and_gender(&mut frame, &[face]);

        assert!(!painter.has_font());
        assert!(frame.pixels().all(|pixel| *pixel == BLACK));
    }

    #[test]
    fn test_text_with_system_font_if_available() {
        let painter = match Painter::from_font_path(None) {
            Ok(painter) if painter.has_font() => painter,
            _ => {
                println!("No system font available, skipping");
                return;
            }
        };
        let mut frame = RgbImage::new(400, 120);
        let mut face = FaceDetection::new(0.9, FaceBox::new(10.0, 10.0, 40.0, 40.0));
        face.age = Some(40.0);
        face.gender = Some(Gender::Female);
        face.gender_probability = Some(0.9);

        painter.draw_age_and_gender(&mut frame, &[face]);

        // The text field starts at the bottom-right corner of the box
        let background = OverlayStyle::default().text_background;
        assert_eq!(frame.get_pixel(51, 51), &background);
        assert_eq!(frame.get_pixel(5, 5), &BLACK);
    }

    #[test]
    fn test_encode_jpeg_and_stream_item() -> Result<()> {
        let frame = RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&frame, 80)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let item = as_jpeg_stream_item(&jpeg);
        assert!(item.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(item.ends_with(b"\r\n\r\n"));
        assert_eq!(item.len(), jpeg.len() + 41);
        Ok(())
    }
}

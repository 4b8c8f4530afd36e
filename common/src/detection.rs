//! Face detection results.
//!
//! Geometry is expressed in pixels of the image the detection was computed on. Use
//! [`FaceDetection::resized`] to map results onto a display surface of another size.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Point in pixel coordinates, origin at the top left corner.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, scale_x: f32, scale_y: f32) -> Self {
        Self::new(self.x * scale_x, self.y * scale_y)
    }
}

/// Width and height of an image or display surface.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scale factors mapping coordinates of `self` onto `target`.
    pub fn scale_to(&self, target: Dimensions) -> (f32, f32) {
        (
            target.width as f32 / self.width.max(1) as f32,
            target.height as f32 / self.height.max(1) as f32,
        )
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned bounding box of a face.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a box from its top-left and bottom-right corners.
    ///
    /// Swapped corners are reordered, so the resulting width and height are never negative.
    pub fn from_corners(x_tl: f32, y_tl: f32, x_br: f32, y_br: f32) -> Self {
        let (left, right) = (x_tl.min(x_br), x_tl.max(x_br));
        let (top, bottom) = (y_tl.min(y_br), y_tl.max(y_br));
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.x, self.bottom())
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.right(), self.bottom())
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        // Without overlap the extents become negative and the area is zero.
        let overlap_width = self.right().min(other.right()) - self.x.max(other.x);
        let overlap_height = self.bottom().min(other.bottom()) - self.y.max(other.y);
        let overlap_area = overlap_width.max(0.0) * overlap_height.max(0.0);

        overlap_area / (self.area() + other.area() - overlap_area + EPS)
    }

    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self::new(
            self.x * scale_x,
            self.y * scale_y,
            self.width * scale_x,
            self.height * scale_y,
        )
    }

    /// Restrict the box to the image area. Returns `None` if nothing of the box is left.
    pub fn clamped(&self, dimensions: Dimensions) -> Option<FaceBox> {
        let (max_x, max_y) = (dimensions.width as f32, dimensions.height as f32);
        let left = self.x.clamp(0.0, max_x);
        let top = self.y.clamp(0.0, max_y);
        let right = self.right().clamp(0.0, max_x);
        let bottom = self.bottom().clamp(0.0, max_y);

        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }

        Some(FaceBox::new(left, top, right - left, bottom - top))
    }
}

/// 68-point facial landmarks.
///
/// Point layout:
/// - 0-16: jaw outline
/// - 17-21, 22-26: eyebrows
/// - 27-35: nose bridge and lower nose
/// - 36-41, 42-47: eyes
/// - 48-59: outer lip, 60-67: inner lip
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FaceLandmarks {
    pub points: Vec<Point>,
}

impl FaceLandmarks {
    pub const NUM_POINTS: usize = 68;

    /// Point index ranges `(start, end)` of the drawn contours and whether they are closed.
    pub const CONTOURS: [(usize, usize, bool); 9] = [
        (0, 17, false),
        (17, 22, false),
        (22, 27, false),
        (27, 31, false),
        (30, 36, false),
        (36, 42, true),
        (42, 48, true),
        (48, 60, true),
        (60, 68, true),
    ];

    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn is_complete(&self) -> bool {
        self.points.len() == Self::NUM_POINTS
    }

    /// Iterate over the contour polylines, yielding the points and the closed flag.
    pub fn contours(&self) -> impl Iterator<Item = (&[Point], bool)> + '_ {
        Self::CONTOURS
            .iter()
            .filter(|(_, end, _)| *end <= self.points.len())
            .map(|(start, end, closed)| (&self.points[*start..*end], *closed))
    }

    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self::new(
            self.points
                .iter()
                .map(|point| point.scaled(scale_x, scale_y))
                .collect(),
        )
    }
}

/// Facial expression classes, in the output order of the FER+ classifier.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
    Disgusted,
    Fearful,
    Contempt,
}

impl Expression {
    pub const ALL: [Expression; 8] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Surprised,
        Expression::Sad,
        Expression::Angry,
        Expression::Disgusted,
        Expression::Fearful,
        Expression::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Surprised => "surprised",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Contempt => "contempt",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probabilities of each expression class. They sum up to one.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FaceExpressions {
    pub neutral: f32,
    pub happy: f32,
    pub surprised: f32,
    pub sad: f32,
    pub angry: f32,
    pub disgusted: f32,
    pub fearful: f32,
    pub contempt: f32,
}

impl FaceExpressions {
    /// Build from probabilities ordered like [`Expression::ALL`].
    pub fn from_probabilities(probabilities: [f32; 8]) -> Self {
        let [neutral, happy, surprised, sad, angry, disgusted, fearful, contempt] = probabilities;
        Self {
            neutral,
            happy,
            surprised,
            sad,
            angry,
            disgusted,
            fearful,
            contempt,
        }
    }

    pub fn get(&self, expression: Expression) -> f32 {
        match expression {
            Expression::Neutral => self.neutral,
            Expression::Happy => self.happy,
            Expression::Surprised => self.surprised,
            Expression::Sad => self.sad,
            Expression::Angry => self.angry,
            Expression::Disgusted => self.disgusted,
            Expression::Fearful => self.fearful,
            Expression::Contempt => self.contempt,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL
            .iter()
            .map(move |expression| (*expression, self.get(*expression)))
    }

    /// Expressions with a probability above `min_probability`, most probable first.
    pub fn above(&self, min_probability: f32) -> Vec<(Expression, f32)> {
        let mut selected: Vec<_> = self
            .iter()
            .filter(|(_, probability)| *probability > min_probability)
            .collect();
        selected.sort_by(|a, b| b.1.total_cmp(&a.1));
        selected
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
        }
    }
}

/// A detected face with everything the enabled pipeline stages found out about it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FaceDetection {
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: FaceBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressions: Option<FaceExpressions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender_probability: Option<f32>,
}

impl FaceDetection {
    pub fn new(score: f32, bbox: FaceBox) -> Self {
        Self {
            score,
            bbox,
            landmarks: None,
            expressions: None,
            age: None,
            gender: None,
            gender_probability: None,
        }
    }

    /// Map all geometry from an image of size `from` onto a surface of size `to`.
    pub fn resized(&self, from: Dimensions, to: Dimensions) -> Self {
        let (scale_x, scale_y) = from.scale_to(to);
        Self {
            bbox: self.bbox.scaled(scale_x, scale_y),
            landmarks: self
                .landmarks
                .as_ref()
                .map(|landmarks| landmarks.scaled(scale_x, scale_y)),
            ..self.clone()
        }
    }

    pub fn score_label(&self) -> String {
        format!("{:.2}", self.score)
    }

    /// Label like `"31 years old female (97%)"`, if age and gender are known.
    pub fn age_gender_label(&self) -> Option<String> {
        match (self.age, self.gender, self.gender_probability) {
            (Some(age), Some(gender), Some(probability)) => Some(format!(
                "{} years old {} ({}%)",
                age.round(),
                gender,
                (probability * 100.0).round()
            )),
            _ => None,
        }
    }

    /// Labels like `"happy (0.98)"` for all expressions above `min_probability`.
    pub fn expression_labels(&self, min_probability: f32) -> Vec<String> {
        self.expressions
            .map(|expressions| {
                expressions
                    .above(min_probability)
                    .into_iter()
                    .map(|(expression, probability)| format!("{expression} ({probability:.2})"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// All faces found in one image.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DetectionResponse {
    /// Size of the surface the face geometry refers to.
    pub dimensions: Dimensions,
    pub faces: Vec<FaceDetection>,
}

impl DetectionResponse {
    pub fn new(dimensions: Dimensions, faces: Vec<FaceDetection>) -> Self {
        Self { dimensions, faces }
    }

    /// Resize all detections to a display surface.
    pub fn resized(&self, to: Dimensions) -> Self {
        Self {
            dimensions: to,
            faces: self
                .faces
                .iter()
                .map(|face| face.resized(self.dimensions, to))
                .collect(),
        }
    }
}

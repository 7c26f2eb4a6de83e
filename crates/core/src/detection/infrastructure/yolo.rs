//! Shared pieces of the YOLO-family ONNX backends: letterbox
//! preprocessing, output decoding and non-maximum suppression.

use crate::shared::frame::Frame;

/// Fallback input resolution when the model declares a dynamic shape.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

pub const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox padding value (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Square input side read from an NCHW model input, or
/// [`DEFAULT_INPUT_SIZE`] when the shape is dynamic.
pub fn input_size(session: &ort::session::Session) -> u32 {
    session
        .inputs()
        .first()
        .and_then(|input| match input.dtype() {
            ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                Some(shape[2] as u32)
            }
            _ => None,
        })
        .unwrap_or(DEFAULT_INPUT_SIZE)
}

/// Geometry needed to map letterboxed coordinates back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Resizes `frame` into a `target_size` square, preserving aspect ratio, and
/// returns the normalised NCHW tensor. Frames that are not RGB are expanded
/// to three channels first.
pub fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let rgb;
    let frame = if frame.channels() == 3 {
        frame
    } else {
        rgb = frame.to_rgb();
        &rgb
    };
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let size = target_size as usize;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour sampling
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let (ty, tx) = (pad_y as usize + y, pad_x as usize + x);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

/// A candidate box in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
    pub class_id: usize,
}

impl RawDetection {
    fn bbox(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Decodes a `[1, features, N]` (or `[1, N, features]`) output into
/// detections whose best class score reaches `confidence`.
///
/// Each row is `cx, cy, w, h` followed by one score per class. With
/// `num_classes` set, only that many scores are read and any trailing
/// features (such as face keypoints) are ignored; otherwise every feature
/// after the box is a class score.
pub fn decode_output(
    data: &[f32],
    shape: &[usize],
    geometry: &Letterbox,
    confidence: f64,
    num_classes: Option<usize>,
) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    // Features are the smaller axis; exported YOLOv8 heads are transposed.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Err(format!("YOLO output has too few features: {shape:?}").into());
    }
    if data.len() < num_dets * num_feats {
        return Err("YOLO output is shorter than its shape".into());
    }
    let score_end = match num_classes {
        Some(n) => (4 + n.max(1)).min(num_feats),
        None => num_feats,
    };

    let feature = |det: usize, f: usize| -> f32 {
        if transposed {
            data[f * num_dets + det]
        } else {
            data[det * num_feats + f]
        }
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let (class_id, score) = (4..score_end)
            .map(|f| (f - 4, feature(i, f)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        let score = score as f64;
        if score < confidence {
            continue;
        }

        let (cx, cy) = (feature(i, 0) as f64, feature(i, 1) as f64);
        let (w, h) = (feature(i, 2) as f64, feature(i, 3) as f64);
        let (x1, y1) = geometry.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = geometry.unmap(cx + w / 2.0, cy + h / 2.0);
        dets.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: score,
            class_id,
        });
    }
    Ok(dets)
}

/// Greedy NMS: highest confidence first, suppressing same-class boxes that
/// overlap a kept box by more than `iou_thresh`.
pub fn nms(mut dets: Vec<RawDetection>, iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && bbox_iou(&k.bbox(), &det.bbox()) > iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

/// IoU between two `[x1, y1, x2, y2]` boxes.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// src/geometry.rs

//! Aspect-ratio correction and letterboxing.
//!
//! All scaling goes through `mul_div`, which rounds `a * b / c` to the
//! nearest integer (halves away from zero) using a 64-bit intermediate.
//! No floating point is involved, matching fixed-point video conventions.

use crate::format::Ratio;

/// An axis-aligned rectangle; `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// A `width` x `height` rectangle at the origin.
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// `round(number * numerator / denominator)`; `None` on a zero denominator
/// or when the result does not fit in an `i32`.
pub fn mul_div(number: i32, numerator: i32, denominator: i32) -> Option<i32> {
    if denominator == 0 {
        return None;
    }
    let product = number as i64 * numerator as i64;
    let denominator = denominator as i64;
    let magnitude = (product.abs() + denominator.abs() / 2) / denominator.abs();
    let result = if (product < 0) != (denominator < 0) {
        -magnitude
    } else {
        magnitude
    };
    i32::try_from(result).ok()
}

/// Converts `src` from the source pixel aspect ratio to square pixels.
///
/// The result sits at the origin. Wide pixels (numerator > denominator)
/// stretch the width, tall pixels stretch the height, 1:1 is unchanged.
pub fn correct_aspect_ratio(src: Rect, pixel_aspect: Ratio) -> Rect {
    let mut rect = Rect::from_size(src.width(), src.height());
    let num = pixel_aspect.numerator as i32;
    let den = pixel_aspect.denominator as i32;
    if num <= 0 || den <= 0 || num == den {
        return rect;
    }

    if num > den {
        if let Some(width) = mul_div(rect.right, num, den) {
            rect.right = width;
        }
    } else if let Some(height) = mul_div(rect.bottom, den, num) {
        rect.bottom = height;
    }
    rect
}

/// Largest rectangle with the shape of `src` that fits in `dst`, centered.
///
/// Pixels are assumed to have the same shape in both rectangles; run
/// `correct_aspect_ratio` on `src` first.
pub fn letterbox(src: Rect, dst: Rect) -> Rect {
    let src_width = src.width();
    let src_height = src.height();
    let dst_width = dst.width();
    let dst_height = dst.height();

    if src_width <= 0 || src_height <= 0 || dst_width <= 0 || dst_height <= 0 {
        let cx = dst.left + dst_width.max(0) / 2;
        let cy = dst.top + dst_height.max(0) / 2;
        return Rect::new(cx, cy, cx, cy);
    }

    let pillar = mul_div(src_width, dst_height, src_height).is_some_and(|w| w <= dst_width);
    let (box_width, box_height) = if pillar {
        // Column letterboxing: bars left and right.
        (
            mul_div(dst_height, src_width, src_height).unwrap_or(dst_width),
            dst_height,
        )
    } else {
        // Row letterboxing: bars top and bottom.
        (
            dst_width,
            mul_div(dst_width, src_height, src_width).unwrap_or(dst_height),
        )
    };

    let left = dst.left + (dst_width - box_width) / 2;
    let top = dst.top + (dst_height - box_height) / 2;
    Rect::new(left, top, left + box_width, top + box_height)
}

// src/convert/ycbcr.rs
//! Studio-range YCbCr to RGB (BT.601 integer coefficients).

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Writes B,G,R and a zero X byte.
    #[inline]
    pub fn write_bgrx(self, out: &mut [u8]) {
        out[0] = self.blue;
        out[1] = self.green;
        out[2] = self.red;
        out[3] = 0;
    }
}

#[inline]
fn clip(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Fixed-point conversion; reproduces the reference coefficients bit for bit.
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> Rgb {
    let c = y as i32 - 16;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;

    Rgb {
        red: clip((298 * c + 409 * e + 128) >> 8),
        green: clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        blue: clip((298 * c + 516 * d + 128) >> 8),
    }
}

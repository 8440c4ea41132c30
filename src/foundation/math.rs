pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
    let t = t.clamp(0.0, 1.0);
    (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div255_rounds() {
        assert_eq!(mul_div255_u16(255, 255), 255);
        assert_eq!(mul_div255_u16(255, 128), 128);
        assert_eq!(mul_div255_u16(0, 200), 0);
    }

    #[test]
    fn lerp_clamps() {
        assert_eq!(lerp_u8(0, 200, 0.5), 100);
        assert_eq!(lerp_u8(0, 200, 2.0), 200);
        assert_eq!(lerp_u8(10, 0, -1.0), 10);
    }
}

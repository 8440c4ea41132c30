use std::str::FromStr;

use crate::foundation::error::{ExportError, ExportResult};

/// Frames-per-second represented as a rational `num/den`.
///
/// Serialized as text (`"30"`, `"30000/1001"`); a bare JSON integer is accepted too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "FpsRepr", into = "String")]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ExportResult<Self> {
        if den == 0 {
            return Err(ExportError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ExportError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub(crate) fn validate(self) -> ExportResult<()> {
        Self::new(self.num, self.den).map(|_| ())
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

/// Accepts `30` or `30000/1001`.
impl FromStr for Fps {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| ExportError::validation(format!("invalid fps '{s}': {e}")))
        };
        match s.split_once('/') {
            Some((num, den)) => Self::new(parse(num)?, parse(den)?),
            None => Self::new(parse(s)?, 1),
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum FpsRepr {
    Whole(u32),
    Text(String),
}

impl TryFrom<FpsRepr> for Fps {
    type Error = ExportError;

    fn try_from(value: FpsRepr) -> Result<Self, Self::Error> {
        match value {
            FpsRepr::Whole(num) => Self::new(num, 1),
            FpsRepr::Text(s) => s.parse(),
        }
    }
}

impl From<Fps> for String {
    fn from(fps: Fps) -> Self {
        if fps.den == 1 {
            fps.num.to_string()
        } else {
            format!("{}/{}", fps.num, fps.den)
        }
    }
}

/// Straight-alpha RGBA8 color.
///
/// Serialized as a `#rrggbb` / `#rrggbbaa` hex string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const WHITE: Self = Self::opaque(255, 255, 255);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Rgba8 {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(ExportError::validation(format!(
                "color '{s}' must be #rrggbb or #rrggbbaa"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| ExportError::validation(format!("invalid color '{s}': {e}")))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 255 },
        })
    }
}

impl TryFrom<String> for Rgba8 {
    type Error = ExportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba8> for String {
    fn from(c: Rgba8) -> Self {
        if c.a == 255 {
            format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
        }
    }
}

/// Capture rectangle in target pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Viewport covering the whole target.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Check that the rectangle lies inside a `target_width` x `target_height` target.
    pub fn validate_within(&self, target_width: u32, target_height: u32) -> ExportResult<()> {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        if right > u64::from(target_width) {
            return Err(ExportError::validation(format!(
                "viewport x + width ({right}) exceeds target width {target_width}"
            )));
        }
        if bottom > u64::from(target_height) {
            return Err(ExportError::validation(format!(
                "viewport y + height ({bottom}) exceeds target height {target_height}"
            )));
        }
        Ok(())
    }

    /// Truncate width and height down to even numbers.
    pub fn normalized(&self) -> NormalizedViewport {
        NormalizedViewport(Self {
            x: self.x,
            y: self.y,
            width: self.width & !1,
            height: self.height & !1,
        })
    }
}

/// Accepts `x,y,w,h`.
impl FromStr for Viewport {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<u32>()
                    .map_err(|e| ExportError::validation(format!("invalid viewport '{s}': {e}")))
            })
            .collect::<ExportResult<Vec<_>>>()?;
        let &[x, y, width, height] = parts.as_slice() else {
            return Err(ExportError::validation(format!(
                "viewport '{s}' must have the form x,y,width,height"
            )));
        };
        Ok(Self::new(x, y, width, height))
    }
}

/// Capture rectangle after even-alignment (codec macroblock requirement).
///
/// Only constructible through [`Viewport::normalized`], so width and height are always even.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizedViewport(Viewport);

impl NormalizedViewport {
    pub fn rect(&self) -> Viewport {
        self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn is_empty(&self) -> bool {
        self.0.width == 0 || self.0.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_parses_integer_and_rational() {
        assert_eq!("30".parse::<Fps>().unwrap(), Fps::new(30, 1).unwrap());
        assert_eq!(
            "30000/1001".parse::<Fps>().unwrap(),
            Fps::new(30000, 1001).unwrap()
        );
        assert!("0".parse::<Fps>().is_err());
        assert!("30/0".parse::<Fps>().is_err());
        assert!("abc".parse::<Fps>().is_err());
    }

    #[test]
    fn fps_serde_uses_the_cli_text_form() {
        let fps: Fps = serde_json::from_str("\"30000/1001\"").unwrap();
        assert_eq!(fps, Fps::new(30000, 1001).unwrap());
        assert_eq!(serde_json::to_string(&fps).unwrap(), "\"30000/1001\"");

        let fps: Fps = serde_json::from_str("24").unwrap();
        assert_eq!(fps, Fps::new(24, 1).unwrap());
        assert_eq!(serde_json::to_string(&fps).unwrap(), "\"24\"");

        assert!(serde_json::from_str::<Fps>("\"30/0\"").is_err());
        assert!(serde_json::from_str::<Fps>("0").is_err());
        assert_eq!(Fps::default().as_f64(), 30.0);
    }

    #[test]
    fn color_hex_round_trips_through_serde() {
        let c: Rgba8 = serde_json::from_str("\"#ff8000\"").unwrap();
        assert_eq!(c, Rgba8::opaque(255, 128, 0));
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"#ff8000\"");

        let c: Rgba8 = "#10203040".parse().unwrap();
        assert_eq!(c.to_array(), [0x10, 0x20, 0x30, 0x40]);
        assert!("#12345".parse::<Rgba8>().is_err());
        assert!("#gg0000".parse::<Rgba8>().is_err());
    }

    #[test]
    fn viewport_bounds_are_checked() {
        assert!(Viewport::full(800, 800).validate_within(800, 800).is_ok());
        assert!(
            Viewport::new(0, 0, 801, 800)
                .validate_within(800, 800)
                .is_err()
        );
        assert!(
            Viewport::new(10, 0, 795, 800)
                .validate_within(800, 800)
                .is_err()
        );
        assert!(
            Viewport::new(0, 1, 800, 800)
                .validate_within(800, 800)
                .is_err()
        );
        assert!(
            Viewport::new(u32::MAX, 0, 2, 2)
                .validate_within(800, 800)
                .is_err()
        );
    }

    #[test]
    fn normalization_truncates_to_even() {
        let n = Viewport::new(3, 5, 801, 599).normalized();
        assert_eq!(n.rect(), Viewport::new(3, 5, 800, 598));
        assert!(Viewport::new(0, 0, 1, 10).normalized().is_empty());
    }

    #[test]
    fn viewport_parses_csv() {
        assert_eq!(
            "0, 0,800,600".parse::<Viewport>().unwrap(),
            Viewport::new(0, 0, 800, 600)
        );
        assert!("0,0,800".parse::<Viewport>().is_err());
    }
}

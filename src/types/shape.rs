use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Drawing tool bound to a label. Decides what annotation data is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    BoundingBox,
    Ellipse,
    Line,
    Polygon,
}

impl Tool {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Tool::BoundingBox => "bounding_box",
            Tool::Ellipse => "ellipse",
            Tool::Line => "line",
            Tool::Polygon => "polygon",
        }
    }

    pub fn parse(s: &str) -> Option<Tool> {
        match s {
            "bounding_box" => Some(Tool::BoundingBox),
            "ellipse" => Some(Tool::Ellipse),
            "line" => Some(Tool::Line),
            "polygon" => Some(Tool::Polygon),
            _ => None,
        }
    }

    /// Checks that `data` has the coordinate count and ranges this tool needs.
    /// All coordinates are normalized to `[0, 1]`.
    pub fn validate(self, data: &[f64]) -> Result<()> {
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0) {
            return Err(Error::validation(
                "data",
                format!("coordinate {bad} is outside [0, 1]"),
            ));
        }

        match self {
            Tool::BoundingBox => {
                let [x, y, w, h] = exact::<4>(self, data)?;
                if w <= 0.0 || h <= 0.0 {
                    return Err(Error::validation("data", "box width and height must be positive"));
                }
                if x + w > 1.0 || y + h > 1.0 {
                    return Err(Error::validation("data", "box extends past the asset bounds"));
                }
            }
            Tool::Ellipse => {
                let [_, _, rx, ry] = exact::<4>(self, data)?;
                if rx <= 0.0 || ry <= 0.0 {
                    return Err(Error::validation("data", "ellipse radii must be positive"));
                }
            }
            Tool::Line => points(self, data, 2)?,
            Tool::Polygon => points(self, data, 3)?,
        }

        Ok(())
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn exact<const N: usize>(tool: Tool, data: &[f64]) -> Result<[f64; N]> {
    <[f64; N]>::try_from(data).map_err(|_| {
        Error::validation(
            "data",
            format!("{tool} requires exactly {N} values, got {}", data.len()),
        )
    })
}

fn points(tool: Tool, data: &[f64], min_points: usize) -> Result<()> {
    if data.len() % 2 != 0 {
        return Err(Error::validation(
            "data",
            format!("{tool} requires x/y pairs, got {} values", data.len()),
        ));
    }
    if data.len() / 2 < min_points {
        return Err(Error::validation(
            "data",
            format!("{tool} requires at least {min_points} points"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box() {
        assert!(Tool::BoundingBox.validate(&[0.1, 0.1, 0.5, 0.5]).is_ok());
        assert!(Tool::BoundingBox.validate(&[0.1, 0.1, 0.5]).is_err());
        assert!(Tool::BoundingBox.validate(&[0.6, 0.1, 0.5, 0.5]).is_err());
        assert!(Tool::BoundingBox.validate(&[0.1, 0.1, 0.0, 0.5]).is_err());
    }

    #[test]
    fn test_ellipse() {
        assert!(Tool::Ellipse.validate(&[0.5, 0.5, 0.2, 0.1]).is_ok());
        assert!(Tool::Ellipse.validate(&[0.5, 0.5, 0.0, 0.1]).is_err());
    }

    #[test]
    fn test_line_and_polygon_point_counts() {
        assert!(Tool::Line.validate(&[0.0, 0.0, 1.0, 1.0]).is_ok());
        assert!(Tool::Line.validate(&[0.0, 0.0]).is_err());
        assert!(Tool::Line.validate(&[0.0, 0.0, 1.0]).is_err());
        assert!(Tool::Polygon.validate(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0]).is_ok());
        assert!(Tool::Polygon.validate(&[0.0, 0.0, 1.0, 0.0]).is_err());
    }

    #[test]
    fn test_out_of_range_and_nan() {
        assert!(Tool::Line.validate(&[0.0, 0.0, 1.5, 1.0]).is_err());
        assert!(Tool::Line.validate(&[0.0, f64::NAN, 1.0, 1.0]).is_err());
        assert!(matches!(
            Tool::Polygon.validate(&[-0.1, 0.0, 1.0, 0.0, 1.0, 1.0]),
            Err(Error::Validation { field: "data", .. })
        ));
    }
}

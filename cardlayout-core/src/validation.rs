//! Layout Validation - Rule/Policy Separation
//!
//! Rules produce structured violations per element.
//! Policy decides how a stored layout is repaired.

use serde::{Deserialize, Serialize};

use crate::layout::{
    clamp_font_size, clamp_offset_x, clamp_offset_y, clamp_scale, ElementKey, ElementLayout,
    LayoutConfiguration, MAX_FONT_SIZE, MAX_SCALE, MIN_FONT_SIZE, MIN_SCALE, OFFSET_X_LIMIT,
    OFFSET_Y_LIMIT,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutViolation {
    pub rule: String,
    pub element: ElementKey,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<LayoutViolation>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn elements(&self) -> Vec<ElementKey> {
        let mut keys: Vec<_> = self.violations.iter().map(|v| v.element).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// How out-of-bounds stored values are brought back into range.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepairMode {
    /// Pull each offending value to its nearest bound.
    #[default]
    Clamp,
    /// Replace the whole element with its default.
    Reset,
}

pub trait LayoutRule {
    fn name(&self) -> &'static str;
    fn check(&self, key: ElementKey, layout: &ElementLayout) -> Vec<LayoutViolation>;
}

fn violation(
    rule: &str,
    element: ElementKey,
    severity: ViolationSeverity,
    message: &str,
    expected: String,
    actual: String,
) -> LayoutViolation {
    LayoutViolation {
        rule: rule.to_string(),
        element,
        severity,
        message: message.to_string(),
        expected: Some(expected),
        actual: Some(actual),
    }
}

// --- Concrete Rules ---

pub struct OffsetBoundsRule;

impl LayoutRule for OffsetBoundsRule {
    fn name(&self) -> &'static str { "offset_bounds" }

    fn check(&self, key: ElementKey, layout: &ElementLayout) -> Vec<LayoutViolation> {
        let mut violations = vec![];
        if !(layout.offset_x.is_finite() && layout.offset_x.abs() <= OFFSET_X_LIMIT) {
            violations.push(violation(
                self.name(),
                key,
                ViolationSeverity::Error,
                "Horizontal offset leaves the printable page",
                format!("±{}", OFFSET_X_LIMIT),
                format!("{}", layout.offset_x),
            ));
        }
        if !(layout.offset_y.is_finite() && layout.offset_y.abs() <= OFFSET_Y_LIMIT) {
            violations.push(violation(
                self.name(),
                key,
                ViolationSeverity::Error,
                "Vertical offset leaves the printable page",
                format!("±{}", OFFSET_Y_LIMIT),
                format!("{}", layout.offset_y),
            ));
        }
        violations
    }
}

pub struct ScaleBoundsRule;

impl LayoutRule for ScaleBoundsRule {
    fn name(&self) -> &'static str { "scale_bounds" }

    fn check(&self, key: ElementKey, layout: &ElementLayout) -> Vec<LayoutViolation> {
        if layout.scale.is_finite() && (MIN_SCALE..=MAX_SCALE).contains(&layout.scale) {
            return vec![];
        }
        vec![violation(
            self.name(),
            key,
            ViolationSeverity::Error,
            "Scale out of range",
            format!("{MIN_SCALE}..={MAX_SCALE}"),
            format!("{}", layout.scale),
        )]
    }
}

pub struct FontSizeRule;

impl LayoutRule for FontSizeRule {
    fn name(&self) -> &'static str { "font_size" }

    fn check(&self, key: ElementKey, layout: &ElementLayout) -> Vec<LayoutViolation> {
        match (key.is_text(), layout.font_size) {
            (false, Some(size)) => vec![violation(
                self.name(),
                key,
                ViolationSeverity::Warning,
                "Image element carries a font size",
                "none".to_string(),
                format!("{size}"),
            )],
            (true, None) => vec![violation(
                self.name(),
                key,
                ViolationSeverity::Warning,
                "Text element has no font size",
                format!("{MIN_FONT_SIZE}..={MAX_FONT_SIZE}"),
                "none".to_string(),
            )],
            (true, Some(size))
                if !(size.is_finite() && (MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&size)) =>
            {
                vec![violation(
                    self.name(),
                    key,
                    ViolationSeverity::Error,
                    "Font size out of range",
                    format!("{MIN_FONT_SIZE}..={MAX_FONT_SIZE}"),
                    format!("{size}"),
                )]
            }
            _ => vec![],
        }
    }
}

/// Validator orchestrates rules and applies the repair policy
pub struct Validator {
    rules: Vec<Box<dyn LayoutRule>>,
    mode: RepairMode,
}

impl Validator {
    pub fn new() -> Self {
        Self::with_mode(RepairMode::Clamp)
    }

    pub fn with_mode(mode: RepairMode) -> Self {
        Self {
            rules: vec![
                Box::new(OffsetBoundsRule),
                Box::new(ScaleBoundsRule),
                Box::new(FontSizeRule),
            ],
            mode,
        }
    }

    pub fn validate(&self, layout: &LayoutConfiguration) -> ValidationReport {
        let violations: Vec<_> = layout
            .iter()
            .flat_map(|(key, l)| self.rules.iter().flat_map(move |rule| rule.check(key, l)))
            .collect();
        ValidationReport {
            valid: violations.is_empty(),
            violations,
        }
    }

    /// Validate and repair in place. The returned report describes what was
    /// found before repair.
    pub fn repair(&self, layout: &mut LayoutConfiguration) -> ValidationReport {
        let report = self.validate(layout);
        for key in report.elements() {
            match self.mode {
                RepairMode::Reset => layout.reset_element(key),
                RepairMode::Clamp => clamp_element(key, layout.get_mut(key)),
            }
        }
        report
    }
}

fn clamp_element(key: ElementKey, layout: &mut ElementLayout) {
    let defaults = ElementLayout::default_for(key);
    layout.offset_x = clamp_offset_x(layout.offset_x).unwrap_or(defaults.offset_x);
    layout.offset_y = clamp_offset_y(layout.offset_y).unwrap_or(defaults.offset_y);
    layout.scale = clamp_scale(layout.scale).unwrap_or(defaults.scale);
    layout.font_size = if key.is_text() {
        layout.font_size.and_then(clamp_font_size).or(defaults.font_size)
    } else {
        None
    };
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::default_layout;

    #[test]
    fn test_default_layout_is_valid() {
        let report = Validator::new().validate(&default_layout());
        assert!(report.valid);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_clamp_repair() {
        let mut layout = default_layout();
        layout.get_mut(ElementKey::SchoolName).offset_x = 999.0;
        layout.get_mut(ElementKey::Photo).font_size = Some(12.0);

        let report = Validator::new().repair(&mut layout);
        assert!(!report.valid);
        assert!(report.has_errors());
        assert_eq!(report.elements(), vec![ElementKey::SchoolName, ElementKey::Photo]);
        assert_eq!(layout.get(ElementKey::SchoolName).offset_x, OFFSET_X_LIMIT);
        assert_eq!(layout.get(ElementKey::Photo).font_size, None);
        assert!(Validator::new().validate(&layout).valid);
    }

    #[test]
    fn test_reset_repair() {
        let mut layout = default_layout();
        {
            let name = layout.get_mut(ElementKey::StudentName);
            name.scale = 12.0;
            name.offset_x = 30.0;
        }
        Validator::with_mode(RepairMode::Reset).repair(&mut layout);
        assert_eq!(layout, default_layout());
    }

    #[test]
    fn test_missing_font_size_is_warning() {
        let mut layout = default_layout();
        layout.get_mut(ElementKey::Footer).font_size = None;
        let report = Validator::new().validate(&layout);
        assert!(!report.valid);
        assert!(!report.has_errors());
    }
}

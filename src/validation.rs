use crate::error::{FieldError, StudioError};

/// Collects field violations for one form submission.
#[derive(Debug, Default)]
pub struct Violations {
    errors: Vec<FieldError>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Rejects values outside `[0, 1]`, NaN included.
    pub fn unit(&mut self, field: &str, value: f64) {
        self.range_f64(field, value, 0.0, 1.0);
    }

    pub fn range_f64(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !(min..=max).contains(&value) {
            self.push(field, format!("must be between {} and {}", min, max));
        }
    }

    pub fn range_u32(&mut self, field: &str, value: u32, min: u32, max: u32) {
        if !(min..=max).contains(&value) {
            self.push(field, format!("must be between {} and {}", min, max));
        }
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "is required");
        }
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        let len = value.chars().count();
        if len > max {
            self.push(field, format!("must be at most {} characters (got {})", max, len));
        }
    }

    pub fn extend(&mut self, other: Vec<FieldError>) {
        self.errors.extend(other);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    pub fn into_result(self) -> Result<(), StudioError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(StudioError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_range_rejects_outliers_and_nan() {
        let mut v = Violations::new();
        v.unit("a", 0.0);
        v.unit("b", 1.0);
        assert!(v.is_empty());

        v.unit("c", -0.01);
        v.unit("d", 1.01);
        v.unit("e", f64::NAN);
        let fields: Vec<_> = v.into_errors().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["c", "d", "e"]);
    }

    #[test]
    fn required_trims_whitespace() {
        let mut v = Violations::new();
        v.required("name", "   ");
        assert!(v.into_result().is_err());
    }
}

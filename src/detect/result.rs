/// One object reported by a detector.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Class name as reported by the model (case is not normalised).
    pub label: String,
    /// Score in 0..1.
    pub confidence: f64,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

//! Detection and masking of sensitive columns in read-back results

/// Substrings that mark a column label as sensitive, matched case-insensitively.
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "passwd",
    "contraseña",
    "email",
    "correo",
    "telefono",
    "phone",
    "celular",
    "dni",
    "cedula",
    "ssn",
    "rfc",
    "tarjeta",
    "card",
    "cuenta",
    "account",
];

/// Replacement shown for sensitive values.
pub const MASK: &str = "********";

/// Decides which column labels hold sensitive data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveColumns {
    patterns: Vec<String>,
}

impl Default for SensitiveColumns {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_SENSITIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl SensitiveColumns {
    /// No column is sensitive.
    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into().to_lowercase());
        self
    }

    pub fn is_sensitive(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.patterns.iter().any(|p| label.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns() {
        let sensitive = SensitiveColumns::default();
        assert!(sensitive.is_sensitive("password_hash"));
        assert!(sensitive.is_sensitive("Customer_Email"));
        assert!(sensitive.is_sensitive("CONTRASEÑA"));
        assert!(sensitive.is_sensitive("credit_card_number"));
        assert!(!sensitive.is_sensitive("id"));
        assert!(!sensitive.is_sensitive("created_at"));
    }

    #[test]
    fn test_custom_patterns() {
        let sensitive = SensitiveColumns::none().with_pattern("Salary");
        assert!(sensitive.is_sensitive("base_salary"));
        assert!(!sensitive.is_sensitive("email"));
    }
}

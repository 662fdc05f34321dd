//! Request validation.

/// A request rejected before any backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Search term is empty after trimming.
    EmptyTerm,
    /// Page numbers start at 1.
    ZeroPage,
    /// Page size must be positive.
    ZeroPageSize,
    /// Positions start at 1.
    ZeroPosition,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyTerm => "Search term must not be empty",
            Self::ZeroPage => "Page number must be at least 1",
            Self::ZeroPageSize => "Page size must be at least 1",
            Self::ZeroPosition => "Position must be at least 1",
        }
    }

    /// Get the parameter name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyTerm => "term",
            Self::ZeroPage => "page",
            Self::ZeroPageSize => "page_size",
            Self::ZeroPosition => "position",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_their_field() {
        for error in [
            ValidationError::EmptyTerm,
            ValidationError::ZeroPage,
            ValidationError::ZeroPageSize,
            ValidationError::ZeroPosition,
        ] {
            let field = error.field().replace('_', " ");
            assert!(error.to_string().to_lowercase().contains(&field), "{error}");
        }
    }
}

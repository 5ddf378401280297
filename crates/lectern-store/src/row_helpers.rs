use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::QuestionStatus;

    #[test]
    fn parse_enum_success() {
        let status: QuestionStatus = parse_enum("forwarded", "questions", "status").unwrap();
        assert_eq!(status, QuestionStatus::Forwarded);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<QuestionStatus, _> = parse_enum("INVALID", "questions", "status");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow {
                table: "questions",
                column: "status",
                ..
            })
        ));
    }
}

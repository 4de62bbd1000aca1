//! Question/answer unpivot view generation.
//!
//! Survey data lands in wide format: for every question there is a pair of
//! columns, `<topic>_question` holding the question text and `<topic>`
//! holding the answer. The long-format view emits one row per answered
//! pair, carrying all non-paired columns through unchanged.
//!
//! The view is a pure function of the catalog. It is always regenerated
//! wholesale (drop and recreate) so it can never drift from the columns
//! that actually exist.

use crate::schema::catalog::Catalog;

/// One derived question/answer column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair {
    /// Answer column name upper-cased, used as the topic label
    pub topic: String,
    /// Column holding the question text
    pub question_column: String,
    /// Column holding the answer value
    pub answer_column: String,
}

/// Compute the pair set for the current catalog.
///
/// A pair exists for every column ending in `suffix` whose suffix-stripped
/// counterpart is also in the catalog. Results are sorted by topic so the
/// generated SQL is deterministic for a given catalog.
pub fn compute_pairs(catalog: &Catalog, suffix: &str) -> Vec<QaPair> {
    if suffix.is_empty() {
        return Vec::new();
    }

    let mut pairs: Vec<QaPair> = catalog
        .columns()
        .filter_map(|col| {
            let answer = col.name.strip_suffix(suffix)?;
            if answer.is_empty() || !catalog.contains(answer) {
                return None;
            }
            Some(QaPair {
                topic: answer.to_uppercase(),
                question_column: col.name.clone(),
                answer_column: answer.to_string(),
            })
        })
        .collect();

    pairs.sort_by(|a, b| a.topic.cmp(&b.topic));
    pairs
}

/// Build the view definition SQL.
///
/// One SELECT per pair, UNION ALL'd together: passthrough columns plus
/// `(topic, question, answer)`. Returns None when there are no pairs, in
/// which case the caller drops the view instead.
pub fn build_view_sql(catalog: &Catalog, table: &str, view: &str, suffix: &str) -> Option<String> {
    let pairs = compute_pairs(catalog, suffix);
    if pairs.is_empty() {
        return None;
    }

    // Passthrough = every column that is neither a question nor an answer
    // column of some pair.
    let paired: Vec<&str> = pairs
        .iter()
        .flat_map(|p| [p.question_column.as_str(), p.answer_column.as_str()])
        .collect();
    let passthrough: Vec<&str> = catalog
        .columns()
        .map(|c| c.name.as_str())
        .filter(|name| !paired.contains(name))
        .collect();

    let selects: Vec<String> = pairs
        .iter()
        .map(|pair| {
            let mut cols: Vec<String> = passthrough.iter().map(|c| format!("\"{c}\"")).collect();
            cols.push(format!("'{}' AS topic", pair.topic));
            cols.push(format!("\"{}\" AS question", pair.question_column));
            cols.push(format!(
                "CAST(\"{}\" AS VARCHAR) AS answer",
                pair.answer_column
            ));
            format!("SELECT {} FROM {table}", cols.join(", "))
        })
        .collect();

    Some(format!(
        "CREATE VIEW {view} AS {}",
        selects.join(" UNION ALL ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog::ColumnDef;
    use crate::schema::infer::ColumnType;

    fn catalog(names: &[(&str, ColumnType)]) -> Catalog {
        Catalog::from_columns(
            names
                .iter()
                .map(|(n, t)| ColumnDef::discovered(n, *t))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_pairing_basic() {
        let cat = catalog(&[
            ("a_question", ColumnType::String),
            ("a", ColumnType::String),
            ("b", ColumnType::String),
        ]);
        let pairs = compute_pairs(&cat, "_question");
        assert_eq!(
            pairs,
            vec![QaPair {
                topic: "A".into(),
                question_column: "a_question".into(),
                answer_column: "a".into(),
            }]
        );
    }

    #[test]
    fn test_question_without_answer_not_paired() {
        let cat = catalog(&[("orphan_question", ColumnType::String)]);
        assert!(compute_pairs(&cat, "_question").is_empty());
    }

    #[test]
    fn test_empty_suffix_yields_nothing() {
        let cat = catalog(&[
            ("a_question", ColumnType::String),
            ("a", ColumnType::String),
        ]);
        assert!(compute_pairs(&cat, "").is_empty());
        assert!(build_view_sql(&cat, "contacts", "contacts_long", "").is_none());
    }

    #[test]
    fn test_view_sql_deterministic() {
        let cat = catalog(&[
            ("zeta_question", ColumnType::String),
            ("zeta", ColumnType::Double),
            ("alpha_question", ColumnType::String),
            ("alpha", ColumnType::String),
            ("contactid", ColumnType::String),
        ]);
        let sql1 = build_view_sql(&cat, "contacts", "contacts_long", "_question").unwrap();
        let sql2 = build_view_sql(&cat, "contacts", "contacts_long", "_question").unwrap();
        assert_eq!(sql1, sql2);

        // ALPHA branch comes before ZETA regardless of catalog insertion order
        let alpha_pos = sql1.find("'ALPHA' AS topic").unwrap();
        let zeta_pos = sql1.find("'ZETA' AS topic").unwrap();
        assert!(alpha_pos < zeta_pos);
    }

    #[test]
    fn test_view_sql_shape() {
        let cat = catalog(&[
            ("a_question", ColumnType::String),
            ("a", ColumnType::Double),
            ("contactid", ColumnType::String),
        ]);
        let sql = build_view_sql(&cat, "contacts", "contacts_long", "_question").unwrap();
        assert!(sql.starts_with("CREATE VIEW contacts_long AS SELECT"));
        assert!(sql.contains("\"contactid\""));
        assert!(sql.contains("'A' AS topic"));
        assert!(sql.contains("\"a_question\" AS question"));
        assert!(sql.contains("CAST(\"a\" AS VARCHAR) AS answer"));
        // Answer/question columns are not passthrough
        assert!(!sql.contains("\"a\","));
    }
}

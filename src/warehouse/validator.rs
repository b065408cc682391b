//! Static query validation.
//!
//! Query text is normalized before any pattern runs: comments are removed,
//! quoted literals and identifiers are masked, whitespace is collapsed and
//! the text is upper-cased. Patterns therefore cannot be evaded with
//! comment injection (`DROP/**/TABLE`), and literal text such as
//! `'drop shipping'` never trips them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AdsError;

/// Placeholder replacing every quoted literal or identifier.
const MASK: &str = "'?'";

struct Rule {
    name: &'static str,
    pattern: Regex,
    message: &'static str,
}

fn rule(name: &'static str, pattern: &str, message: &'static str) -> Rule {
    Rule {
        name,
        pattern: Regex::new(pattern).expect("validator pattern should compile"),
        message,
    }
}

static DENYLIST: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule("DROP", r"\bDROP\b", "dropping objects is not allowed"),
        rule("DELETE", r"\bDELETE\b", "deleting rows is not allowed"),
        rule("TRUNCATE", r"\bTRUNCATE\b", "truncating tables is not allowed"),
        rule("CREATE", r"\bCREATE\b", "creating objects is not allowed"),
        rule("ALTER", r"\bALTER\b", "altering schemas is not allowed"),
        rule("GRANT", r"\bGRANT\b", "changing permissions is not allowed"),
        rule("REVOKE", r"\bREVOKE\b", "changing permissions is not allowed"),
        rule("INSERT", r"\bINSERT\b", "inserting rows is not allowed"),
        rule("UPDATE", r"\bUPDATE\b", "updating rows is not allowed"),
        rule("MERGE", r"\bMERGE\b", "merging rows is not allowed"),
        rule(
            "MULTIPLE_STATEMENTS",
            r";\s*\S",
            "only a single statement is allowed",
        ),
    ]
});

static WILDCARD_PROJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bSELECT\s+(?:DISTINCT\s+)?(?:[A-Z_][A-Z0-9_]*\.)?\*")
        .expect("wildcard pattern should compile")
});

static CROSS_JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCROSS\s+JOIN\b").expect("cross join pattern should compile"));

static LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bLIMIT\s+\d+").expect("limit pattern should compile"));

/// One violated rule or heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIssue {
    /// Stable rule name
    pub rule: String,
    /// Human-readable explanation
    pub message: String,
}

impl QueryIssue {
    fn new(rule: &str, message: &str) -> Self {
        Self {
            rule: rule.to_string(),
            message: message.to_string(),
        }
    }
}

/// Validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryValidation {
    /// False when any error was found
    pub allowed: bool,
    /// Denylist violations
    pub errors: Vec<QueryIssue>,
    /// Expensive-pattern heuristics; they never block a query
    pub warnings: Vec<QueryIssue>,
}

impl QueryValidation {
    /// Names of the violated rules.
    pub fn violated_rules(&self) -> Vec<String> {
        self.errors.iter().map(|issue| issue.rule.clone()).collect()
    }

    /// `Ok(self)` if allowed, otherwise [`AdsError::Validation`].
    pub fn into_result(self) -> Result<Self, AdsError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AdsError::Validation {
                rules: self.violated_rules(),
            })
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Normalize query text for pattern matching.
///
/// Returns `None` if a literal or block comment is left open.
///
/// ```rust
/// use ads_insight_client::warehouse::normalize;
///
/// assert_eq!(
///     normalize("select  name -- trailing\nfrom t /* x */ where a = 'drop'").as_deref(),
///     Some("SELECT NAME FROM T WHERE A = '?'")
/// );
/// ```
pub fn normalize(query: &str) -> Option<String> {
    let mut out = String::with_capacity(query.len());
    let mut state = Lex::Code;
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lex::Code => match c {
                '\'' | '"' | '`' => {
                    out.push_str(MASK);
                    state = Lex::Quoted(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = Lex::LineComment;
                }
                '#' => state = Lex::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push(' ');
                    state = Lex::BlockComment;
                }
                _ => out.push(c),
            },
            Lex::Quoted(quote) => {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    state = Lex::Code;
                }
            }
            Lex::LineComment => {
                if c == '\n' {
                    out.push(' ');
                    state = Lex::Code;
                }
            }
            Lex::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Lex::Code;
                }
            }
        }
    }

    if matches!(state, Lex::Quoted(_) | Lex::BlockComment) {
        return None;
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.to_uppercase())
}

/// Validate a query against the denylist and expensive-pattern heuristics.
///
/// ```rust
/// use ads_insight_client::warehouse::validate;
///
/// let verdict = validate("DROP TABLE x");
/// assert!(!verdict.allowed);
/// assert_eq!(verdict.violated_rules(), vec!["DROP".to_string()]);
/// ```
pub fn validate(query: &str) -> QueryValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let normalized = match normalize(query) {
        Some(text) => text,
        None => {
            errors.push(QueryIssue::new(
                "UNTERMINATED_TEXT",
                "a quoted literal or block comment is never closed",
            ));
            return QueryValidation {
                allowed: false,
                errors,
                warnings,
            };
        }
    };

    let statement = normalized.trim_end_matches([';', ' ']);
    if statement.is_empty() {
        errors.push(QueryIssue::new("EMPTY_QUERY", "query is empty"));
    }

    for rule in DENYLIST.iter() {
        if rule.pattern.is_match(statement) {
            errors.push(QueryIssue::new(rule.name, rule.message));
        }
    }

    if WILDCARD_PROJECTION.is_match(statement) {
        warnings.push(QueryIssue::new(
            "WILDCARD_PROJECTION",
            "selecting every column scans the full table width",
        ));
    }
    if CROSS_JOIN.is_match(statement) {
        warnings.push(QueryIssue::new(
            "CROSS_JOIN",
            "cross joins multiply row counts",
        ));
    }
    if !statement.is_empty() && !LIMIT.is_match(statement) {
        warnings.push(QueryIssue::new(
            "MISSING_LIMIT",
            "no LIMIT clause; the row cap will truncate results",
        ));
    }

    if !errors.is_empty() {
        let rules: Vec<&str> = errors.iter().map(|e| e.rule.as_str()).collect();
        tracing::warn!(?rules, "query rejected");
    }

    QueryValidation {
        allowed: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(query: &str) -> Vec<String> {
        validate(query).violated_rules()
    }

    fn warning_rules(query: &str) -> Vec<String> {
        validate(query).warnings.into_iter().map(|w| w.rule).collect()
    }

    #[test]
    fn test_plain_select_is_allowed() {
        let verdict = validate("SELECT campaign_id, SUM(cost) FROM spend GROUP BY 1 LIMIT 100");
        assert!(verdict.allowed);
        assert!(verdict.errors.is_empty());
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn test_destructive_statements_are_rejected() {
        for (query, rule) in [
            ("drop table x", "DROP"),
            ("DELETE FROM x WHERE 1=1", "DELETE"),
            ("truncate table x", "TRUNCATE"),
            ("CREATE TABLE y AS SELECT 1", "CREATE"),
            ("alter table x add column y int64", "ALTER"),
            ("GRANT SELECT ON x TO bob", "GRANT"),
            ("revoke select on x from bob", "REVOKE"),
            ("INSERT INTO x VALUES (1)", "INSERT"),
            ("update x set a = 1", "UPDATE"),
            ("MERGE x USING y ON TRUE WHEN MATCHED THEN DELETE", "MERGE"),
        ] {
            assert!(rules(query).contains(&rule.to_string()), "{query}");
        }
    }

    #[test]
    fn test_comment_injection_is_neutralized() {
        assert_eq!(rules("DROP/**/TABLE x"), vec!["DROP"]);
        assert_eq!(rules("SELECT 1; -- harmless\nDROP TABLE x"), vec!["DROP", "MULTIPLE_STATEMENTS"]);
        assert_eq!(rules("SELECT 1 /* DROP TABLE x */ LIMIT 1"), Vec::<String>::new());
        assert_eq!(rules("SELECT 1 # DROP TABLE x\nLIMIT 1"), Vec::<String>::new());
    }

    #[test]
    fn test_literals_do_not_trip_denylist() {
        let verdict =
            validate("SELECT term FROM search_terms WHERE term = 'drop shipping' LIMIT 10");
        assert!(verdict.allowed);
        let verdict = validate("SELECT `update` FROM t LIMIT 1");
        assert!(verdict.allowed);
    }

    #[test]
    fn test_identifiers_containing_keywords_are_allowed() {
        assert!(validate("SELECT drop_rate, created_at FROM t LIMIT 5").allowed);
    }

    #[test]
    fn test_unterminated_text_is_rejected() {
        assert_eq!(rules("SELECT 'open"), vec!["UNTERMINATED_TEXT"]);
        assert_eq!(rules("SELECT 1 /* open"), vec!["UNTERMINATED_TEXT"]);
    }

    #[test]
    fn test_trailing_semicolon_is_single_statement() {
        assert!(validate("SELECT 1 LIMIT 1;").allowed);
        assert!(validate("SELECT 1 LIMIT 1 ;  ").allowed);
    }

    #[test]
    fn test_empty_query_is_rejected() {
        assert_eq!(rules("  -- nothing\n"), vec!["EMPTY_QUERY"]);
    }

    #[test]
    fn test_expensive_pattern_warnings() {
        assert_eq!(
            warning_rules("select * from a cross join b"),
            vec!["WILDCARD_PROJECTION", "CROSS_JOIN", "MISSING_LIMIT"]
        );
        assert_eq!(warning_rules("SELECT t.* FROM t LIMIT 5"), vec!["WILDCARD_PROJECTION"]);
        assert!(validate("SELECT * FROM t").allowed);
    }

    #[test]
    fn test_into_result() {
        let err = validate("DROP TABLE x").into_result().unwrap_err();
        assert_eq!(err.code(), "QUERY_REJECTED");
        assert!(validate("SELECT 1 LIMIT 1").into_result().is_ok());
    }
}
